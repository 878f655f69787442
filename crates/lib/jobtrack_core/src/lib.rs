//! # jobtrack_core
//!
//! Credential and session core for Jobtrack.
//!
//! Issues and validates signed access tokens, rotates and revokes refresh
//! tokens, blacklists access tokens on logout and reconciles external (OAuth)
//! identities with local accounts. Storage is reached through the
//! [`store::CredentialStore`] and [`cache::TokenStore`] traits so the same
//! session logic runs over Postgres/Redis in production and in-memory
//! backends in tests.

pub mod auth;
pub mod cache;
pub mod error;
pub mod migrate;
pub mod models;
pub mod notify;
pub mod oauth;
pub mod session;
pub mod single_use;
pub mod store;
pub mod sync;

pub use error::SessionError;
pub use session::{SessionConfig, SessionService};

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_not_empty() {
        assert!(!version().is_empty());
    }
}
