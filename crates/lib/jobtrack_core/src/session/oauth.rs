//! External identity reconciliation and OAuth sign-in.

use tracing::{error, info};

use super::SessionService;
use crate::auth::normalize_email;
use crate::auth::password::random_password_hash;
use crate::error::SessionError;
use crate::models::auth::{
    Account, AuthPayload, ExternalIdentity, ExternalProfile, NewAccount, NewExternalIdentity,
};
use crate::oauth::OAuthProviderError;

/// What an OAuth sign-in starts from.
#[derive(Debug, Clone)]
pub enum OAuthLogin {
    /// Raw authorization code, to be exchanged with `provider`.
    AuthorizationCode { provider: String, code: String },
    /// Profile already resolved by the provider.
    Profile(ExternalProfile),
    /// Local account already reconciled upstream.
    Account(Account),
}

impl SessionService {
    /// Sign in through an external provider, creating and linking accounts
    /// as needed.
    pub async fn oauth_login(
        &self,
        input: OAuthLogin,
        fingerprint: &str,
    ) -> Result<AuthPayload, SessionError> {
        let account = match input {
            OAuthLogin::AuthorizationCode { provider, code } => {
                let client = self.providers.get(&provider).ok_or_else(|| SessionError::OAuth {
                    message: format!("Unsupported OAuth provider: {provider}"),
                    detail: None,
                })?;
                let profile = client.exchange_code(&code).await.map_err(|e| match e {
                    OAuthProviderError::MissingEmail => SessionError::OAuth {
                        message: "Email not provided by OAuth provider".into(),
                        detail: None,
                    },
                    other => self.oauth_failure(other.to_string()),
                })?;
                self.resolve_external_identity(&profile).await?
            }
            OAuthLogin::Profile(profile) => self.resolve_external_identity(&profile).await?,
            OAuthLogin::Account(account) => account,
        };

        info!(account_id = %account.id, "account signed in via oauth");
        self.issue_session(account, &fingerprint_or_default(fingerprint)).await
    }

    /// Map a provider identity to a local account.
    ///
    /// An existing link wins. Otherwise the account with the same email is
    /// linked, or a new account is created and linked in one transaction.
    /// Uniqueness conflicts surface as [`SessionError::Conflict`]; every
    /// other failure becomes a redacted [`SessionError::OAuth`].
    pub async fn resolve_external_identity(
        &self,
        profile: &ExternalProfile,
    ) -> Result<Account, SessionError> {
        match self.reconcile(profile).await {
            Ok(account) => Ok(account),
            Err(e @ (SessionError::Conflict(_) | SessionError::OAuth { .. })) => Err(e),
            Err(other) => Err(self.oauth_failure(other.to_string())),
        }
    }

    async fn reconcile(&self, profile: &ExternalProfile) -> Result<Account, SessionError> {
        if let Some(identity) = self
            .store
            .find_external_identity(&profile.provider, &profile.subject_id)
            .await?
        {
            return self
                .store
                .find_account_by_id(&identity.account_id)
                .await?
                .ok_or_else(|| SessionError::NotFound(format!("account {}", identity.account_id)));
        }

        let email = normalize_email(&profile.email);
        if email.is_empty() {
            return Err(SessionError::OAuth {
                message: "Email not provided by OAuth provider".into(),
                detail: None,
            });
        }

        let existing = self.store.find_account_by_email(&email).await?;
        // Hash outside the transaction; bcrypt is slow.
        let placeholder = match existing {
            Some(_) => None,
            None => Some(random_password_hash(self.config.bcrypt_cost)?),
        };

        let mut tx = self.store.begin().await?;
        let account = match existing {
            Some(account) => account,
            None => {
                tx.create_account(&NewAccount {
                    email,
                    password_hash: placeholder,
                    password_set: false,
                    first_name: profile.first_name.clone(),
                    last_name: profile.last_name.clone(),
                })
                .await?
            }
        };
        tx.create_external_identity(&NewExternalIdentity {
            account_id: account.id.clone(),
            provider: profile.provider.clone(),
            provider_subject_id: profile.subject_id.clone(),
            display_name: profile.display_name.clone(),
            avatar_url: profile.avatar_url.clone(),
            metadata: profile.raw.clone(),
        })
        .await?;
        tx.commit().await?;

        info!(account_id = %account.id, provider = %profile.provider, "external identity linked");
        Ok(account)
    }

    fn oauth_failure(&self, detail: String) -> SessionError {
        error!(error = %detail, "oauth authentication failed");
        SessionError::OAuth {
            message: "OAuth authentication failed".into(),
            detail: self.config.expose_error_detail.then_some(detail),
        }
    }

    /// External identities linked to `account_id`.
    pub async fn list_external_identities(
        &self,
        account_id: &str,
    ) -> Result<Vec<ExternalIdentity>, SessionError> {
        Ok(self.store.list_external_identities(account_id).await?)
    }

    /// Unlink an identity. The last identity of an account whose holder
    /// never set a password cannot be removed.
    pub async fn remove_external_identity(
        &self,
        account_id: &str,
        identity_id: &str,
    ) -> Result<bool, SessionError> {
        let identities = self.store.list_external_identities(account_id).await?;
        if !identities.iter().any(|i| i.id == identity_id) {
            return Err(SessionError::Authentication("OAuth connection not found".into()));
        }

        let account = self
            .store
            .find_account_by_id(account_id)
            .await?
            .ok_or_else(|| SessionError::NotFound("Account not found".into()))?;
        if identities.len() == 1 && !account.password_set {
            return Err(SessionError::Authentication(
                "Cannot remove the last OAuth connection without setting a password".into(),
            ));
        }

        let removed = self
            .store
            .delete_external_identity(account_id, identity_id)
            .await?;
        if removed {
            info!(account_id, identity_id, "external identity unlinked");
        }
        Ok(removed)
    }
}

fn fingerprint_or_default(fingerprint: &str) -> String {
    if fingerprint.trim().is_empty() {
        "unknown".to_string()
    } else {
        fingerprint.to_string()
    }
}
