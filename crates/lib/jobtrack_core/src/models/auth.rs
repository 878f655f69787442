//! Authentication domain models.
//!
//! These are internal domain models, distinct from the transport DTOs in
//! `jobtrack_api` (which carry `#[serde(rename_all = "camelCase")]` etc.).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Local account.
///
/// An account created through an external provider stores an unusable
/// random hash and has `password_set == false` until the holder chooses a
/// password. Such an account must keep at least one [`ExternalIdentity`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    /// Always stored lower-case.
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: Option<String>,
    /// Whether the holder has chosen a password.
    #[serde(default)]
    pub password_set: bool,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Hash to check a login against, if the holder ever set a password.
    pub fn usable_password_hash(&self) -> Option<&str> {
        self.password_hash.as_deref().filter(|_| self.password_set)
    }

    /// Name used to greet the account holder in notifications.
    pub fn display_name(&self) -> String {
        match (&self.first_name, &self.last_name) {
            (Some(first), Some(last)) => format!("{first} {last}"),
            (Some(first), None) => first.clone(),
            (None, Some(last)) => last.clone(),
            (None, None) => self.email.clone(),
        }
    }
}

/// Fields required to create an account.
#[derive(Debug, Clone, Default)]
pub struct NewAccount {
    pub email: String,
    pub password_hash: Option<String>,
    /// `false` when `password_hash` is a placeholder.
    pub password_set: bool,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// Partial account update. `None` leaves the column unchanged; a new
/// `password_hash` also marks the password as set.
#[derive(Debug, Clone, Default)]
pub struct AccountUpdate {
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// Optional profile supplied at registration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Profile {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// One active session grant.
///
/// Keyed by the SHA-256 of the refresh token; the plaintext token only ever
/// lives with the client. Records are inserted and deleted, never updated.
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshTokenRecord {
    pub token_hash: String,
    pub account_id: String,
    /// Client fingerprint (user agent) of the device holding the session.
    pub user_agent: String,
    pub expires_at: DateTime<Utc>,
}

/// Link between an account and a third-party provider subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalIdentity {
    pub id: String,
    pub account_id: String,
    pub provider: String,
    pub provider_subject_id: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    /// Opaque provider payload; never interpreted by the session layer.
    #[serde(skip_serializing, default)]
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Fields required to link an external identity.
#[derive(Debug, Clone)]
pub struct NewExternalIdentity {
    pub account_id: String,
    pub provider: String,
    pub provider_subject_id: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub metadata: serde_json::Value,
}

/// Profile as resolved from an external provider.
#[derive(Debug, Clone, Default)]
pub struct ExternalProfile {
    pub provider: String,
    pub subject_id: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub raw: serde_json::Value,
}

/// Access + refresh token pair handed to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
}

/// Result of a successful sign-in.
#[derive(Debug, Clone, Serialize)]
pub struct AuthPayload {
    pub tokens: TokenPair,
    pub account: Account,
}

/// Claims embedded in access tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject: the account ID. Optional on decode so a token without it is
    /// rejected as anonymous instead of failing to parse.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    /// Expiry (unix timestamp).
    pub exp: i64,
    /// Issued at (unix timestamp).
    pub iat: i64,
    /// Unique token id.
    pub jti: String,
}

/// Claims embedded in refresh tokens. The owning account lives in the
/// [`RefreshTokenRecord`], not in the token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub exp: i64,
    pub iat: i64,
    pub jti: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(first: Option<&str>, last: Option<&str>) -> Account {
        Account {
            id: "a1".into(),
            email: "jane@example.com".into(),
            password_hash: Some("hash".into()),
            password_set: true,
            first_name: first.map(Into::into),
            last_name: last.map(Into::into),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn display_name_prefers_full_name() {
        assert_eq!(account(Some("Jane"), Some("Doe")).display_name(), "Jane Doe");
        assert_eq!(account(Some("Jane"), None).display_name(), "Jane");
        assert_eq!(account(None, None).display_name(), "jane@example.com");
    }

    #[test]
    fn placeholder_hash_is_not_usable() {
        let mut oauth_only = account(None, None);
        oauth_only.password_set = false;
        assert_eq!(oauth_only.usable_password_hash(), None);
        assert_eq!(account(None, None).usable_password_hash(), Some("hash"));
    }

    #[test]
    fn password_hash_is_never_serialized() {
        let json = serde_json::to_value(account(None, None)).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["email"], "jane@example.com");
    }
}
