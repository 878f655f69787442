//! External identity providers.
//!
//! A provider turns an authorization code into an [`ExternalProfile`]; the
//! session layer then reconciles that profile with local accounts.

pub mod google;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::auth::ExternalProfile;

pub use google::{GoogleConfig, GoogleProvider};

/// Provider-side failures.
#[derive(Debug, Error)]
pub enum OAuthProviderError {
    #[error("token exchange failed: {0}")]
    Exchange(String),

    #[error("profile fetch failed: {0}")]
    Profile(String),

    #[error("provider profile has no email address")]
    MissingEmail,
}

/// An OAuth 2.0 identity provider.
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    /// Stable provider name stored on identity links (e.g. `"google"`).
    fn name(&self) -> &str;

    /// Exchange an authorization code for the signed-in user's profile.
    async fn exchange_code(&self, code: &str) -> Result<ExternalProfile, OAuthProviderError>;
}
