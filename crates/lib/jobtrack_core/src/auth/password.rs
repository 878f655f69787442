//! Password hashing via bcrypt.

use rand::RngCore;

use crate::error::SessionError;

/// Default bcrypt cost factor.
pub const DEFAULT_BCRYPT_COST: u32 = 10;

/// Work factors bcrypt accepts.
pub const BCRYPT_COST_RANGE: std::ops::RangeInclusive<u32> = 4..=31;

/// Minimum password length.
pub const PASSWORD_MIN_LENGTH: usize = 8;

/// Hash a password with bcrypt.
pub fn hash_password(password: &str, cost: u32) -> Result<String, SessionError> {
    bcrypt::hash(password, cost).map_err(|e| SessionError::Internal(format!("bcrypt hash: {e}")))
}

/// Verify a password against a bcrypt hash.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, SessionError> {
    bcrypt::verify(password, hash).map_err(|e| SessionError::Internal(format!("bcrypt verify: {e}")))
}

/// Hash of a random secret nobody knows. Placeholder credential for accounts
/// created through an external provider.
pub fn random_password_hash(cost: u32) -> Result<String, SessionError> {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    let secret: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
    hash_password(&secret, cost)
}

/// Reject passwords shorter than [`PASSWORD_MIN_LENGTH`] or missing an
/// upper-case letter, a lower-case letter or a digit.
pub fn validate_password(password: &str) -> Result<(), SessionError> {
    if password.chars().count() < PASSWORD_MIN_LENGTH {
        return Err(SessionError::Validation(format!(
            "Password must be at least {PASSWORD_MIN_LENGTH} characters long"
        )));
    }
    let upper = password.chars().any(|c| c.is_uppercase());
    let lower = password.chars().any(|c| c.is_lowercase());
    let digit = password.chars().any(|c| c.is_ascii_digit());
    if !(upper && lower && digit) {
        return Err(SessionError::Validation(
            "Password must contain at least one uppercase letter, one lowercase letter, and one number"
                .into(),
        ));
    }
    Ok(())
}

/// Minimal shape check for an email address.
pub fn validate_email(email: &str) -> Result<(), SessionError> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.contains('@'),
        None => false,
    };
    if !valid {
        return Err(SessionError::Validation("Invalid email address".into()));
    }
    Ok(())
}
