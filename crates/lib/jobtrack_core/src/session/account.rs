//! Password and email self-service.

use serde_json::json;
use tracing::{error, info, warn};

use super::SessionService;
use crate::auth::normalize_email;
use crate::auth::password::{hash_password, validate_email, validate_password, verify_password};
use crate::error::SessionError;
use crate::models::auth::{Account, AccountUpdate};
use crate::notify::TemplateKind;
use crate::single_use::TokenKind;

impl SessionService {
    async fn require_account(&self, account_id: &str) -> Result<Account, SessionError> {
        self.store
            .find_account_by_id(account_id)
            .await?
            .ok_or_else(|| SessionError::NotFound("Account not found".into()))
    }

    /// Send a password-reset link if `email` belongs to an account.
    ///
    /// Always `true` so callers cannot learn which emails exist.
    pub async fn request_password_reset(&self, email: &str) -> Result<bool, SessionError> {
        let email = normalize_email(email);
        let account = match self.store.find_account_by_email(&email).await {
            Ok(Some(account)) => account,
            Ok(None) => return Ok(true),
            Err(e) => {
                error!(error = %e, "account lookup failed during password reset request");
                return Ok(true);
            }
        };

        let issued = match self
            .single_use
            .create_token(&account.id, TokenKind::PasswordReset, json!({}), false)
            .await
        {
            Ok(issued) => issued,
            Err(e) => {
                error!(account_id = %account.id, error = %e, "failed to create password reset token");
                return Ok(true);
            }
        };

        let data = json!({
            "name": account.display_name(),
            "resetUrl": format!("{}?token={}", self.config.reset_url_base, issued.token),
            "expiresInMinutes": self.single_use.expiration_minutes(TokenKind::PasswordReset),
        });
        if let Err(e) = self
            .notifier
            .send(&account.email, TemplateKind::PasswordReset, data)
            .await
        {
            error!(account_id = %account.id, error = %e, "failed to send password reset email");
        }
        Ok(true)
    }

    /// Set a new password using a reset token. The token is consumed.
    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<bool, SessionError> {
        let validation = self
            .single_use
            .validate_token(token, TokenKind::PasswordReset)
            .await;
        let Some(account_id) = validation.account_id.filter(|_| validation.valid) else {
            return Err(SessionError::Authentication(
                "Invalid or expired reset token".into(),
            ));
        };

        validate_password(new_password)?;
        let password_hash = hash_password(new_password, self.config.bcrypt_cost)?;
        self.store
            .update_account(
                &account_id,
                &AccountUpdate {
                    password_hash: Some(password_hash),
                    ..Default::default()
                },
            )
            .await?;
        self.single_use
            .delete_token(token, TokenKind::PasswordReset)
            .await;

        info!(account_id = %account_id, "password reset");
        Ok(true)
    }

    /// Change the password of a signed-in account.
    ///
    /// Accounts whose holder never chose a password set their first one
    /// without `old_password`.
    /// Returns `false` if the new hash could not be stored.
    pub async fn change_password(
        &self,
        account_id: &str,
        old_password: Option<&str>,
        new_password: &str,
    ) -> Result<bool, SessionError> {
        let account = self.require_account(account_id).await?;

        if let Some(hash) = account.usable_password_hash() {
            let matches = verify_password(old_password.unwrap_or_default(), hash).unwrap_or(false);
            if !matches {
                return Err(SessionError::Validation("Old password is incorrect".into()));
            }
        }
        validate_password(new_password)?;

        let password_hash = hash_password(new_password, self.config.bcrypt_cost)?;
        match self
            .store
            .update_account(
                account_id,
                &AccountUpdate {
                    password_hash: Some(password_hash),
                    ..Default::default()
                },
            )
            .await
        {
            Ok(_) => {
                info!(account_id, "password changed");
                Ok(true)
            }
            Err(e) => {
                error!(account_id, error = %e, "failed to store new password");
                Ok(false)
            }
        }
    }

    /// Send a verification code to `new_email`.
    pub async fn request_email_change(
        &self,
        account_id: &str,
        new_email: &str,
    ) -> Result<bool, SessionError> {
        let new_email = normalize_email(new_email);
        validate_email(&new_email)?;
        let account = self.require_account(account_id).await?;

        if account.email == new_email {
            return Err(SessionError::Validation(
                "New email must differ from the current one".into(),
            ));
        }
        if self.store.find_account_by_email(&new_email).await?.is_some() {
            return Err(SessionError::Conflict("Email already in use".into()));
        }

        let issued = self
            .single_use
            .create_token(
                account_id,
                TokenKind::EmailChange,
                json!({ "newEmail": new_email }),
                true,
            )
            .await?;

        let data = json!({
            "name": account.display_name(),
            "code": issued.token,
            "expiresInMinutes": self.single_use.expiration_minutes(TokenKind::EmailChange),
        });
        if let Err(e) = self
            .notifier
            .send(&new_email, TemplateKind::EmailChange, data)
            .await
        {
            warn!(account_id, error = %e, "failed to send email change code");
        }
        Ok(true)
    }

    /// Apply a pending email change once the code is confirmed.
    pub async fn confirm_email_change(
        &self,
        account_id: &str,
        code: &str,
    ) -> Result<Account, SessionError> {
        let invalid = || SessionError::Validation("Invalid or expired verification code".into());

        let validation = self
            .single_use
            .validate_token(code, TokenKind::EmailChange)
            .await;
        if !validation.valid || validation.account_id.as_deref() != Some(account_id) {
            return Err(invalid());
        }
        let new_email = validation
            .metadata
            .as_ref()
            .and_then(|m| m.get("newEmail"))
            .and_then(|v| v.as_str())
            .map(normalize_email)
            .ok_or_else(invalid)?;

        if let Some(holder) = self.store.find_account_by_email(&new_email).await?
            && holder.id != account_id
        {
            return Err(SessionError::Conflict("Email already in use".into()));
        }

        let account = self
            .store
            .update_account(
                account_id,
                &AccountUpdate {
                    email: Some(new_email),
                    ..Default::default()
                },
            )
            .await?;
        self.single_use
            .delete_token(code, TokenKind::EmailChange)
            .await;

        info!(account_id, "email changed");
        Ok(account)
    }

    /// Update names. `None` leaves a name unchanged; blanks are ignored.
    pub async fn update_profile(
        &self,
        account_id: &str,
        first_name: Option<String>,
        last_name: Option<String>,
    ) -> Result<Account, SessionError> {
        let clean = |name: Option<String>| {
            name.map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty())
        };
        let account = self
            .store
            .update_account(
                account_id,
                &AccountUpdate {
                    first_name: clean(first_name),
                    last_name: clean(last_name),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| match SessionError::from(e) {
                SessionError::NotFound(_) => SessionError::NotFound("Account not found".into()),
                other => other,
            })?;
        Ok(account)
    }
}

#[cfg(test)]
mod tests {
    use crate::error::SessionError;
    use crate::models::auth::ExternalProfile;
    use crate::notify::TemplateKind;
    use crate::session::testing::*;
    use crate::store::CredentialStore;

    fn token_from_url(url: &str) -> String {
        url.rsplit_once("token=").unwrap().1.to_string()
    }

    #[tokio::test]
    async fn password_reset_round_trip() {
        let h = harness();
        h.register("jane@example.com").await;

        assert!(h.service.request_password_reset("JANE@example.com").await.unwrap());
        let sent = h.notifier.last(TemplateKind::PasswordReset).unwrap();
        assert_eq!(sent.recipient, "jane@example.com");
        assert_eq!(sent.data["expiresInMinutes"], 10);
        let token = token_from_url(sent.data["resetUrl"].as_str().unwrap());

        assert!(h.service.reset_password(&token, "N3wPassword").await.unwrap());
        assert!(h.service.login("jane@example.com", "N3wPassword", UA).await.is_ok());
        assert!(h.service.login("jane@example.com", PASSWORD, UA).await.is_err());

        // Consumed.
        let err = h.service.reset_password(&token, "An0therOne").await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid or expired reset token");
    }

    #[tokio::test]
    async fn password_reset_does_not_reveal_unknown_emails() {
        let h = harness();
        assert!(h.service.request_password_reset("ghost@example.com").await.unwrap());
        assert!(h.notifier.sent().is_empty());
        assert!(h.tokens.is_empty());
    }

    #[tokio::test]
    async fn reset_enforces_password_policy() {
        let h = harness();
        h.register("jane@example.com").await;
        h.service.request_password_reset("jane@example.com").await.unwrap();
        let sent = h.notifier.last(TemplateKind::PasswordReset).unwrap();
        let token = token_from_url(sent.data["resetUrl"].as_str().unwrap());

        let err = h.service.reset_password(&token, "alllowercase1").await.unwrap_err();
        assert!(matches!(err, SessionError::Validation(_)));
        // A rejected attempt does not burn the token.
        assert!(h.service.reset_password(&token, "Val1dPassword").await.unwrap());
    }

    #[tokio::test]
    async fn change_password_checks_the_old_one() {
        let h = harness();
        let session = h.register("jane@example.com").await;
        let id = &session.account.id;

        let err = h
            .service
            .change_password(id, Some("Wr0ngPassword"), "N3wPassword")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Old password is incorrect");

        assert!(
            h.service
                .change_password(id, Some(PASSWORD), "N3wPassword")
                .await
                .unwrap()
        );
        assert!(h.service.login("jane@example.com", "N3wPassword", UA).await.is_ok());
    }

    #[tokio::test]
    async fn oauth_only_account_sets_first_password() {
        let h = harness();
        let account = h
            .service
            .resolve_external_identity(&ExternalProfile {
                provider: "google".into(),
                subject_id: "g-1".into(),
                email: "nopass@example.com".into(),
                ..Default::default()
            })
            .await
            .unwrap();

        assert!(
            h.service
                .change_password(&account.id, None, "F1rstPassword")
                .await
                .unwrap()
        );
        let account = h.store.find_account_by_id(&account.id).await.unwrap().unwrap();
        assert!(account.password_set);
        assert!(h.service.login("nopass@example.com", "F1rstPassword", UA).await.is_ok());

        // From now on the old password is required.
        let err = h
            .service
            .change_password(&account.id, None, "S3condPassword")
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Validation(_)));
    }

    #[tokio::test]
    async fn email_change_with_code() {
        let h = harness();
        let session = h.register("jane@example.com").await;
        let id = &session.account.id;

        assert!(h.service.request_email_change(id, "New@Example.com").await.unwrap());
        let sent = h.notifier.last(TemplateKind::EmailChange).unwrap();
        assert_eq!(sent.recipient, "new@example.com");
        let code = sent.data["code"].as_str().unwrap().to_string();
        assert_eq!(code.len(), 6);

        let updated = h.service.confirm_email_change(id, &code).await.unwrap();
        assert_eq!(updated.email, "new@example.com");
        assert!(h.service.login("new@example.com", PASSWORD, UA).await.is_ok());
        assert!(h.service.confirm_email_change(id, &code).await.is_err());
    }

    #[tokio::test]
    async fn email_change_rejects_taken_addresses() {
        let h = harness();
        let jane = h.register("jane@example.com").await;
        h.register("john@example.com").await;

        let err = h
            .service
            .request_email_change(&jane.account.id, "john@example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Conflict(_)));
    }

    #[tokio::test]
    async fn email_change_code_is_bound_to_its_account() {
        let h = harness();
        let jane = h.register("jane@example.com").await;
        let john = h.register("john@example.com").await;

        h.service
            .request_email_change(&jane.account.id, "jane.new@example.com")
            .await
            .unwrap();
        let code = h.notifier.last(TemplateKind::EmailChange).unwrap().data["code"]
            .as_str()
            .unwrap()
            .to_string();

        assert!(h.service.confirm_email_change(&john.account.id, &code).await.is_err());
        assert!(h.service.confirm_email_change(&jane.account.id, &code).await.is_ok());
    }

    #[tokio::test]
    async fn email_taken_between_request_and_confirm_is_a_conflict() {
        let h = harness();
        let jane = h.register("jane@example.com").await;
        h.service
            .request_email_change(&jane.account.id, "wanted@example.com")
            .await
            .unwrap();
        let code = h.notifier.last(TemplateKind::EmailChange).unwrap().data["code"]
            .as_str()
            .unwrap()
            .to_string();
        h.register("wanted@example.com").await;

        let err = h
            .service
            .confirm_email_change(&jane.account.id, &code)
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Conflict(_)));
    }

    #[tokio::test]
    async fn profile_update_keeps_unset_fields() {
        let h = harness();
        let session = h.register("jane@example.com").await;
        let id = &session.account.id;

        let updated = h
            .service
            .update_profile(id, Some(" Jane ".into()), Some("Doe".into()))
            .await
            .unwrap();
        assert_eq!(updated.first_name.as_deref(), Some("Jane"));

        let updated = h
            .service
            .update_profile(id, None, Some("Smith".into()))
            .await
            .unwrap();
        assert_eq!(updated.first_name.as_deref(), Some("Jane"));
        assert_eq!(updated.last_name.as_deref(), Some("Smith"));

        assert!(matches!(
            h.service.update_profile("missing", None, None).await,
            Err(SessionError::NotFound(_))
        ));
    }
}
