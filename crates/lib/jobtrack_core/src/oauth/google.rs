//! Google sign-in.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use super::{OAuthProvider, OAuthProviderError};
use crate::models::auth::ExternalProfile;

pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const GOOGLE_USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";

const SCOPES: &str = "openid email profile";

/// Google OAuth client settings.
#[derive(Debug, Clone)]
pub struct GoogleConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub token_url: String,
    pub userinfo_url: String,
}

impl GoogleConfig {
    pub fn new(client_id: String, client_secret: String, redirect_uri: String) -> Self {
        Self {
            client_id,
            client_secret,
            redirect_uri,
            token_url: GOOGLE_TOKEN_URL.to_string(),
            userinfo_url: GOOGLE_USERINFO_URL.to_string(),
        }
    }

    /// Read `GOOGLE_CLIENT_ID`, `GOOGLE_CLIENT_SECRET` and
    /// `GOOGLE_CALLBACK_URL`. `None` unless all three are set.
    pub fn from_env() -> Option<Self> {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        Some(Self::new(
            var("GOOGLE_CLIENT_ID")?,
            var("GOOGLE_CLIENT_SECRET")?,
            var("GOOGLE_CALLBACK_URL")?,
        ))
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Google OAuth provider: authorization-code exchange followed by a
/// userinfo fetch.
#[derive(Debug, Clone)]
pub struct GoogleProvider {
    config: GoogleConfig,
    client: reqwest::Client,
}

impl GoogleProvider {
    pub fn new(config: GoogleConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    /// Consent screen URL carrying `state`.
    pub fn authorization_url(&self, state: &str) -> Result<Url, url::ParseError> {
        Url::parse_with_params(
            GOOGLE_AUTH_URL,
            &[
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", SCOPES),
                ("state", state),
            ],
        )
    }

    async fn exchange_authorization_code(&self, code: &str) -> Result<String, OAuthProviderError> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("redirect_uri", self.config.redirect_uri.as_str()),
        ];

        let resp = self
            .client
            .post(&self.config.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| OAuthProviderError::Exchange(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(OAuthProviderError::Exchange(format!("HTTP {status}: {body}")));
        }

        let token: TokenResponse = resp
            .json()
            .await
            .map_err(|e| OAuthProviderError::Exchange(format!("response parse error: {e}")))?;
        Ok(token.access_token)
    }

    async fn fetch_userinfo(&self, access_token: &str) -> Result<serde_json::Value, OAuthProviderError> {
        let resp = self
            .client
            .get(&self.config.userinfo_url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| OAuthProviderError::Profile(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(OAuthProviderError::Profile(format!("HTTP {}", resp.status())));
        }

        resp.json()
            .await
            .map_err(|e| OAuthProviderError::Profile(format!("response parse error: {e}")))
    }
}

#[async_trait]
impl OAuthProvider for GoogleProvider {
    fn name(&self) -> &str {
        "google"
    }

    async fn exchange_code(&self, code: &str) -> Result<ExternalProfile, OAuthProviderError> {
        let access_token = self.exchange_authorization_code(code).await?;
        let userinfo = self.fetch_userinfo(&access_token).await?;
        let profile = profile_from_userinfo(self.name(), userinfo)?;
        debug!(provider = %profile.provider, "resolved google profile");
        Ok(profile)
    }
}

/// Map an OpenID Connect userinfo document to an [`ExternalProfile`].
pub fn profile_from_userinfo(
    provider: &str,
    userinfo: serde_json::Value,
) -> Result<ExternalProfile, OAuthProviderError> {
    let field = |name: &str| {
        userinfo
            .get(name)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let subject_id = field("sub")
        .ok_or_else(|| OAuthProviderError::Profile("userinfo has no subject".into()))?;
    let email = field("email").ok_or(OAuthProviderError::MissingEmail)?;

    Ok(ExternalProfile {
        provider: provider.to_string(),
        subject_id,
        email,
        first_name: field("given_name"),
        last_name: field("family_name"),
        display_name: field("name"),
        avatar_url: field("picture"),
        raw: userinfo,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn userinfo_maps_to_profile() {
        let profile = profile_from_userinfo(
            "google",
            serde_json::json!({
                "sub": "1234",
                "email": "Jane@Example.com",
                "given_name": "Jane",
                "family_name": "Doe",
                "name": "Jane Doe",
                "picture": "https://img/jane.png"
            }),
        )
        .unwrap();

        assert_eq!(profile.provider, "google");
        assert_eq!(profile.subject_id, "1234");
        assert_eq!(profile.email, "Jane@Example.com");
        assert_eq!(profile.first_name.as_deref(), Some("Jane"));
        assert_eq!(profile.avatar_url.as_deref(), Some("https://img/jane.png"));
        assert_eq!(profile.raw["sub"], "1234");
    }

    #[test]
    fn userinfo_without_email_is_rejected() {
        let err = profile_from_userinfo("google", serde_json::json!({"sub": "1"})).unwrap_err();
        assert!(matches!(err, OAuthProviderError::MissingEmail));

        let err = profile_from_userinfo("google", serde_json::json!({"sub": "1", "email": ""}))
            .unwrap_err();
        assert!(matches!(err, OAuthProviderError::MissingEmail));
    }

    #[test]
    fn authorization_url_carries_client_and_state() {
        let provider = GoogleProvider::new(GoogleConfig::new(
            "client".into(),
            "secret".into(),
            "http://localhost/cb".into(),
        ));
        let url = provider.authorization_url("xyz").unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();

        assert!(pairs.contains(&("client_id".into(), "client".into())));
        assert!(pairs.contains(&("state".into(), "xyz".into())));
        assert!(pairs.contains(&("redirect_uri".into(), "http://localhost/cb".into())));
        assert!(!url.as_str().contains("secret"));
    }
}
