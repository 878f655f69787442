//! Session-level error taxonomy.

use thiserror::Error;

use crate::cache::TokenStoreError;
use crate::store::{ACCOUNT_EMAIL_CONSTRAINT, IDENTITY_PROVIDER_CONSTRAINT, StoreError};
use crate::sync::LockError;

/// Errors surfaced by [`crate::SessionService`].
///
/// `Authentication` messages are deliberately uniform so callers cannot tell
/// which part of a credential check failed.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("{0}")]
    Authentication(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Upstream provider or unexpected reconciliation failure. `detail` is
    /// only populated when the service is configured to expose diagnostics.
    #[error("{message}")]
    OAuth {
        message: String,
        detail: Option<String>,
    },

    #[error("{0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SessionError {
    /// Generic credential failure.
    pub fn invalid_credentials() -> Self {
        SessionError::Authentication("Invalid credentials".into())
    }

    /// Generic refresh-token failure.
    pub fn invalid_refresh_token() -> Self {
        SessionError::Authentication("Invalid refresh token".into())
    }
}

impl From<StoreError> for SessionError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::UniqueViolation { constraint } => {
                let message = match constraint.as_str() {
                    ACCOUNT_EMAIL_CONSTRAINT => "Email already in use",
                    IDENTITY_PROVIDER_CONSTRAINT => "OAuth account is already linked",
                    _ => "Record already exists",
                };
                SessionError::Conflict(message.into())
            }
            StoreError::NotFound(what) => SessionError::NotFound(what),
            other => SessionError::Internal(other.to_string()),
        }
    }
}

impl From<TokenStoreError> for SessionError {
    fn from(e: TokenStoreError) -> Self {
        SessionError::Unavailable(e.to_string())
    }
}

impl From<LockError> for SessionError {
    fn from(e: LockError) -> Self {
        SessionError::Unavailable(e.to_string())
    }
}
