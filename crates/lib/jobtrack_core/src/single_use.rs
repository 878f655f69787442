//! Single-use tokens (password reset, email change).
//!
//! Tokens live in the shared token store under `token:<kind>:<token>` with a
//! JSON payload and expire on their own. Each account holds at most one live
//! token per kind; a per-account index key (`token:<kind>:account:<id>`)
//! points at it so issuing a new one can delete the previous one without
//! scanning the keyspace.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::cache::{TokenStore, keys};
use crate::error::SessionError;

/// Default lifetime of single-use tokens: 10 minutes.
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(10 * 60);

/// Attempts at finding an unused verification code.
const CODE_ATTEMPTS: usize = 5;

/// Purpose of a single-use token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    PasswordReset,
    EmailChange,
}

impl TokenKind {
    /// Wire name stored in the payload.
    pub fn as_str(self) -> &'static str {
        match self {
            TokenKind::PasswordReset => "PASSWORD_RESET",
            TokenKind::EmailChange => "EMAIL_CHANGE",
        }
    }

    fn key_prefix(self) -> String {
        format!("{}{}:", keys::SINGLE_USE_PREFIX, self.as_str().to_lowercase())
    }

    fn token_key(self, token: &str) -> String {
        format!("{}{token}", self.key_prefix())
    }

    fn index_key(self, account_id: &str) -> String {
        format!("{}account:{account_id}", self.key_prefix())
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenPayload {
    user_id: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    metadata: serde_json::Value,
    created_at: i64,
}

/// A freshly issued token.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    /// Lifetime in seconds.
    pub expires_in: u64,
}

/// Outcome of [`TokenService::validate_token`].
#[derive(Debug, Clone, Default)]
pub struct TokenValidation {
    pub valid: bool,
    pub reason: Option<String>,
    pub account_id: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

impl TokenValidation {
    fn invalid(reason: &str) -> Self {
        Self {
            valid: false,
            reason: Some(reason.to_string()),
            ..Default::default()
        }
    }
}

/// Issues, validates and consumes single-use tokens.
#[derive(Clone)]
pub struct TokenService {
    store: Arc<dyn TokenStore>,
    password_reset_ttl: Duration,
    email_change_ttl: Duration,
}

impl TokenService {
    pub fn new(store: Arc<dyn TokenStore>) -> Self {
        Self {
            store,
            password_reset_ttl: DEFAULT_TOKEN_TTL,
            email_change_ttl: DEFAULT_TOKEN_TTL,
        }
    }

    /// Override per-kind lifetimes.
    pub fn with_ttls(mut self, password_reset: Duration, email_change: Duration) -> Self {
        self.password_reset_ttl = password_reset;
        self.email_change_ttl = email_change;
        self
    }

    fn ttl(&self, kind: TokenKind) -> Duration {
        match kind {
            TokenKind::PasswordReset => self.password_reset_ttl,
            TokenKind::EmailChange => self.email_change_ttl,
        }
    }

    /// Lifetime of `kind` tokens in whole minutes.
    pub fn expiration_minutes(&self, kind: TokenKind) -> u64 {
        self.ttl(kind).as_secs() / 60
    }

    /// Issue a token (64 hex chars) or a 6-digit code for `account_id`,
    /// replacing any earlier token of the same kind.
    pub async fn create_token(
        &self,
        account_id: &str,
        kind: TokenKind,
        metadata: serde_json::Value,
        use_verification_code: bool,
    ) -> Result<IssuedToken, SessionError> {
        let ttl = self.ttl(kind);
        let payload = serde_json::to_string(&TokenPayload {
            user_id: account_id.to_string(),
            kind: kind.as_str().to_string(),
            metadata,
            created_at: Utc::now().timestamp_millis(),
        })
        .map_err(|e| SessionError::Internal(format!("token payload: {e}")))?;

        self.remove_previous(account_id, kind).await;

        let attempts = if use_verification_code { CODE_ATTEMPTS } else { 1 };
        let mut issued = None;
        for _ in 0..attempts {
            let token = if use_verification_code {
                generate_verification_code()
            } else {
                generate_token()
            };
            if self
                .store
                .set_if_absent(&kind.token_key(&token), &payload, ttl)
                .await?
            {
                issued = Some(token);
                break;
            }
        }
        let token = issued
            .ok_or_else(|| SessionError::Internal("could not allocate a unique token".into()))?;

        if let Err(e) = self
            .store
            .set_with_ttl(&kind.index_key(account_id), &token, ttl)
            .await
        {
            warn!(error = %e, "failed to index single-use token");
        }

        Ok(IssuedToken {
            token,
            expires_in: ttl.as_secs(),
        })
    }

    /// Check a token without consuming it. Never fails; problems are
    /// reported through [`TokenValidation::reason`].
    pub async fn validate_token(&self, token: &str, kind: TokenKind) -> TokenValidation {
        let raw = match self.store.get(&kind.token_key(token)).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return TokenValidation::invalid("Token not found or expired"),
            Err(e) => {
                error!(error = %e, "token validation error");
                return TokenValidation::invalid("Validation error");
            }
        };
        let payload: TokenPayload = match serde_json::from_str(&raw) {
            Ok(payload) => payload,
            Err(e) => {
                error!(error = %e, "malformed single-use token payload");
                return TokenValidation::invalid("Validation error");
            }
        };
        if payload.kind != kind.as_str() {
            return TokenValidation::invalid("Invalid token type");
        }
        TokenValidation {
            valid: true,
            reason: None,
            account_id: Some(payload.user_id),
            metadata: Some(payload.metadata),
        }
    }

    /// Consume a token. Errors are logged, not raised.
    pub async fn delete_token(&self, token: &str, kind: TokenKind) {
        let key = kind.token_key(token);
        let owner = match self.store.get(&key).await {
            Ok(raw) => raw
                .and_then(|raw| serde_json::from_str::<TokenPayload>(&raw).ok())
                .map(|p| p.user_id),
            Err(_) => None,
        };
        if let Err(e) = self.store.delete(&key).await {
            error!(error = %e, "failed to delete single-use token");
        }
        if let Some(account_id) = owner {
            let index = kind.index_key(&account_id);
            if let Err(e) = self.store.compare_and_delete(&index, token).await {
                warn!(error = %e, "failed to clear single-use token index");
            }
        }
    }

    async fn remove_previous(&self, account_id: &str, kind: TokenKind) {
        let index = kind.index_key(account_id);
        match self.store.get(&index).await {
            Ok(Some(previous)) => {
                if let Err(e) = self.store.delete(&kind.token_key(&previous)).await {
                    error!(error = %e, "failed to clean up existing tokens");
                }
            }
            Ok(None) => {}
            Err(e) => error!(error = %e, "failed to clean up existing tokens"),
        }
    }
}

/// 32 random bytes, hex encoded.
fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Six-digit numeric code.
fn generate_verification_code() -> String {
    rand::rng().random_range(100_000..1_000_000u32).to_string()
}
