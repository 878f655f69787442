//! JWT token generation and verification.
//!
//! Access and refresh tokens are HS256 JWTs signed with separate secrets.

use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use uuid::Uuid;

use crate::error::SessionError;
use crate::models::auth::{AccessClaims, RefreshClaims};

/// Access token lifetime: 15 minutes.
pub const ACCESS_TOKEN_EXPIRY_SECS: i64 = 15 * 60;

/// Refresh token lifetime: 7 days.
pub const REFRESH_TOKEN_EXPIRY_DAYS: i64 = 7;

fn require_secret(secret: &[u8]) -> Result<(), SessionError> {
    if secret.is_empty() {
        return Err(SessionError::Configuration("JWT secret is not configured".into()));
    }
    Ok(())
}

fn validation(validate_exp: bool) -> Validation {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = validate_exp;
    validation.leeway = 0;
    if !validate_exp {
        validation.required_spec_claims.clear();
    }
    validation
}

/// Generate a signed access token asserting `sub = account_id`.
pub fn generate_access_token(
    account_id: &str,
    secret: &[u8],
    lifetime: Duration,
) -> Result<String, SessionError> {
    require_secret(secret)?;
    let now = Utc::now();
    let claims = AccessClaims {
        sub: Some(account_id.to_string()),
        exp: (now + lifetime).timestamp(),
        iat: now.timestamp(),
        jti: Uuid::new_v4().to_string(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret),
    )
    .map_err(|e| SessionError::Configuration(format!("jwt encode: {e}")))
}

/// Generate a signed refresh token. Carries no subject.
pub fn generate_refresh_token(secret: &[u8], lifetime: Duration) -> Result<String, SessionError> {
    require_secret(secret)?;
    let now = Utc::now();
    let claims = RefreshClaims {
        exp: (now + lifetime).timestamp(),
        iat: now.timestamp(),
        jti: Uuid::new_v4().to_string(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret),
    )
    .map_err(|e| SessionError::Configuration(format!("jwt encode: {e}")))
}

/// Verify an access token's signature and expiry, returning the claims on success.
pub fn verify_access_token(token: &str, secret: &[u8]) -> Option<AccessClaims> {
    if secret.is_empty() {
        return None;
    }
    decode::<AccessClaims>(token, &DecodingKey::from_secret(secret), &validation(true))
        .ok()
        .map(|data| data.claims)
}

/// Decode an access token checking only its signature.
///
/// Used on logout to learn the token's expiry even when it already lapsed.
pub fn decode_access_token_ignoring_expiry(
    token: &str,
    secret: &[u8],
) -> Result<AccessClaims, jsonwebtoken::errors::Error> {
    decode::<AccessClaims>(token, &DecodingKey::from_secret(secret), &validation(false))
        .map(|data| data.claims)
}

/// Check a refresh token's signature. Expiry is enforced by its stored record.
pub fn verify_refresh_signature(token: &str, secret: &[u8]) -> bool {
    if secret.is_empty() {
        return false;
    }
    decode::<RefreshClaims>(token, &DecodingKey::from_secret(secret), &validation(false)).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"access-secret";

    #[test]
    fn access_token_roundtrip_carries_subject() {
        let token = generate_access_token("acc-1", SECRET, Duration::minutes(15)).unwrap();
        let claims = verify_access_token(&token, SECRET).expect("valid token");
        assert_eq!(claims.sub.as_deref(), Some("acc-1"));
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn access_token_rejects_wrong_secret() {
        let token = generate_access_token("acc-1", SECRET, Duration::minutes(15)).unwrap();
        assert!(verify_access_token(&token, b"other").is_none());
    }

    #[test]
    fn expired_access_token_is_rejected_but_decodable() {
        let token = generate_access_token("acc-1", SECRET, Duration::seconds(-30)).unwrap();
        assert!(verify_access_token(&token, SECRET).is_none());
        let claims = decode_access_token_ignoring_expiry(&token, SECRET).unwrap();
        assert!(claims.exp < Utc::now().timestamp());
    }

    #[test]
    fn missing_secret_is_a_configuration_error() {
        let err = generate_access_token("acc-1", b"", Duration::minutes(15)).unwrap_err();
        assert!(matches!(err, SessionError::Configuration(_)));
        let err = generate_refresh_token(b"", Duration::days(7)).unwrap_err();
        assert!(matches!(err, SessionError::Configuration(_)));
    }

    #[test]
    fn refresh_tokens_are_unique_and_signed() {
        let a = generate_refresh_token(b"refresh", Duration::days(7)).unwrap();
        let b = generate_refresh_token(b"refresh", Duration::days(7)).unwrap();
        assert_ne!(a, b);
        assert!(verify_refresh_signature(&a, b"refresh"));
        assert!(!verify_refresh_signature(&a, b"access"));
        assert!(!verify_refresh_signature("not-a-jwt", b"refresh"));
    }

    #[test]
    fn token_without_subject_decodes_with_none() {
        let now = Utc::now();
        let claims = AccessClaims {
            sub: None,
            exp: (now + Duration::minutes(5)).timestamp(),
            iat: now.timestamp(),
            jti: "x".into(),
        };
        let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET)).unwrap();
        let decoded = verify_access_token(&token, SECRET).unwrap();
        assert!(decoded.sub.is_none());
    }
}
