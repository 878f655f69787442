//! Authentication primitives.
//!
//! Password hashing, JWT issuance/verification and refresh-token digests.
//! Everything here is synchronous and storage-free; the stateful flows live in
//! [`crate::session`].

pub mod jwt;
pub mod password;

use sha2::{Digest, Sha256};

/// SHA-256 hash a refresh token for storage and lock keys.
pub fn hash_refresh_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Trim and lower-case an email address.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
