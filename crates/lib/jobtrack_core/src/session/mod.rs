//! Session lifecycle: registration, login, refresh rotation, logout and
//! access-token validation.
//!
//! Rotation of one refresh token is serialized through [`KeyedMutex`] keyed
//! on the token hash, optionally nested with a [`DistributedLock`] so several
//! processes sharing the same stores serialize as well. Records are only
//! inserted or deleted, so a logout racing a rotation leaves at most one of
//! them standing.

mod account;
mod config;
mod oauth;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::auth::jwt::{
    decode_access_token_ignoring_expiry, generate_access_token, generate_refresh_token,
    verify_access_token, verify_refresh_signature,
};
use crate::auth::password::{hash_password, validate_email, validate_password, verify_password};
use crate::auth::{hash_refresh_token, normalize_email};
use crate::cache::{TokenStore, keys};
use crate::error::SessionError;
use crate::models::auth::{Account, AuthPayload, NewAccount, Profile, RefreshTokenRecord, TokenPair};
use crate::notify::Notifier;
use crate::oauth::OAuthProvider;
use crate::single_use::TokenService;
use crate::store::CredentialStore;
use crate::sync::{DistributedLock, KeyedMutex, distributed::DEFAULT_LOCK_TTL};

pub use config::SessionConfig;
pub use oauth::OAuthLogin;

/// Credential and session service.
pub struct SessionService {
    config: SessionConfig,
    store: Arc<dyn CredentialStore>,
    tokens: Arc<dyn TokenStore>,
    notifier: Arc<dyn Notifier>,
    single_use: TokenService,
    rotation_locks: KeyedMutex,
    distributed_lock: Option<DistributedLock>,
    providers: HashMap<String, Arc<dyn OAuthProvider>>,
}

impl SessionService {
    pub fn new(
        config: SessionConfig,
        store: Arc<dyn CredentialStore>,
        tokens: Arc<dyn TokenStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let single_use = TokenService::new(Arc::clone(&tokens))
            .with_ttls(config.password_reset_ttl, config.email_change_ttl);
        Self {
            config,
            store,
            tokens,
            notifier,
            single_use,
            rotation_locks: KeyedMutex::new(),
            distributed_lock: None,
            providers: HashMap::new(),
        }
    }

    /// Also serialize refresh rotation across processes.
    pub fn with_distributed_lock(mut self, lock: DistributedLock) -> Self {
        self.distributed_lock = Some(lock);
        self
    }

    /// Register an OAuth provider under its [`OAuthProvider::name`].
    pub fn with_oauth_provider(mut self, provider: Arc<dyn OAuthProvider>) -> Self {
        self.providers.insert(provider.name().to_string(), provider);
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Whether an OAuth provider named `name` is configured.
    pub fn has_provider(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }

    /// Single-use token service sharing this service's token store.
    pub fn single_use_tokens(&self) -> &TokenService {
        &self.single_use
    }

    // -------------------------------------------------------------------
    // Token issuance
    // -------------------------------------------------------------------

    /// Signed access token for `account_id`.
    pub fn issue_access_token(&self, account_id: &str) -> Result<String, SessionError> {
        generate_access_token(
            account_id,
            self.config.access_secret.as_bytes(),
            self.config.access_token_lifetime,
        )
    }

    /// Signed refresh token. Carries no subject.
    pub fn issue_refresh_token(&self) -> Result<String, SessionError> {
        generate_refresh_token(
            self.config.refresh_secret.as_bytes(),
            self.config.refresh_token_lifetime,
        )
    }

    fn issue_token_pair(&self, account_id: &str) -> Result<TokenPair, SessionError> {
        Ok(TokenPair {
            access_token: self.issue_access_token(account_id)?,
            refresh_token: self.issue_refresh_token()?,
            expires_in: self.config.access_token_lifetime.num_seconds(),
        })
    }

    /// Issue a token pair and persist its refresh record.
    pub(crate) async fn issue_session(
        &self,
        account: Account,
        fingerprint: &str,
    ) -> Result<AuthPayload, SessionError> {
        let tokens = self.issue_token_pair(&account.id)?;
        self.store
            .create_refresh_record(&self.refresh_record(&tokens.refresh_token, &account.id, fingerprint))
            .await?;
        Ok(AuthPayload { tokens, account })
    }

    fn refresh_record(&self, refresh_token: &str, account_id: &str, fingerprint: &str) -> RefreshTokenRecord {
        RefreshTokenRecord {
            token_hash: hash_refresh_token(refresh_token),
            account_id: account_id.to_string(),
            user_agent: fingerprint.to_string(),
            expires_at: Utc::now() + self.config.refresh_token_lifetime,
        }
    }

    // -------------------------------------------------------------------
    // Register / login
    // -------------------------------------------------------------------

    /// Create a password account and sign it in.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        profile: Profile,
        fingerprint: &str,
    ) -> Result<AuthPayload, SessionError> {
        let email = normalize_email(email);
        validate_email(&email)?;
        validate_password(password)?;

        if self.store.find_account_by_email(&email).await?.is_some() {
            return Err(SessionError::Conflict("Email already in use".into()));
        }

        let password_hash = hash_password(password, self.config.bcrypt_cost)?;
        let account = self
            .store
            .create_account(&NewAccount {
                email,
                password_hash: Some(password_hash),
                password_set: true,
                first_name: profile.first_name,
                last_name: profile.last_name,
            })
            .await?;

        info!(account_id = %account.id, "account registered");
        self.issue_session(account, fingerprint).await
    }

    /// Password sign-in. Every failure is the same "Invalid credentials".
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        fingerprint: &str,
    ) -> Result<AuthPayload, SessionError> {
        let email = normalize_email(email);
        let account = self
            .store
            .find_account_by_email(&email)
            .await?
            .ok_or_else(SessionError::invalid_credentials)?;

        let Some(hash) = account.usable_password_hash() else {
            return Err(SessionError::invalid_credentials());
        };
        match verify_password(password, hash) {
            Ok(true) => {}
            Ok(false) => return Err(SessionError::invalid_credentials()),
            Err(e) => {
                warn!(account_id = %account.id, error = %e, "stored password hash is unusable");
                return Err(SessionError::invalid_credentials());
            }
        }

        info!(account_id = %account.id, "account signed in");
        self.issue_session(account, fingerprint).await
    }

    // -------------------------------------------------------------------
    // Refresh rotation
    // -------------------------------------------------------------------

    /// Exchange a refresh token for a new pair, invalidating the old one.
    ///
    /// Concurrent calls with the same token are serialized; exactly one of
    /// them succeeds.
    pub async fn refresh(
        &self,
        refresh_token: &str,
        fingerprint: &str,
    ) -> Result<TokenPair, SessionError> {
        let token_hash = hash_refresh_token(refresh_token);
        self.rotation_locks
            .with_lock(&token_hash, || async {
                match &self.distributed_lock {
                    Some(lock) => {
                        lock.with_lock(&format!("refresh:{token_hash}"), DEFAULT_LOCK_TTL, || {
                            self.rotate(refresh_token, &token_hash, fingerprint)
                        })
                        .await
                        .map_err(SessionError::from)
                        .and_then(std::convert::identity)
                    }
                    None => self.rotate(refresh_token, &token_hash, fingerprint).await,
                }
            })
            .await
    }

    async fn rotate(
        &self,
        refresh_token: &str,
        token_hash: &str,
        fingerprint: &str,
    ) -> Result<TokenPair, SessionError> {
        let record = self
            .store
            .find_refresh_record(token_hash)
            .await?
            .ok_or_else(SessionError::invalid_refresh_token)?;

        if Utc::now() >= record.expires_at {
            if let Err(e) = self.store.delete_refresh_record(token_hash).await {
                warn!(account_id = %record.account_id, error = %e, "failed to purge expired refresh token");
            }
            return Err(SessionError::Authentication("Refresh token expired".into()));
        }

        if !verify_refresh_signature(refresh_token, self.config.refresh_secret.as_bytes()) {
            return Err(SessionError::invalid_refresh_token());
        }

        let tokens = self.issue_token_pair(&record.account_id)?;

        // Gone already: a logout won the race.
        if !self.store.delete_refresh_record(token_hash).await? {
            return Err(SessionError::invalid_refresh_token());
        }
        self.store
            .create_refresh_record(&self.refresh_record(
                &tokens.refresh_token,
                &record.account_id,
                fingerprint,
            ))
            .await?;

        debug!(account_id = %record.account_id, "refresh token rotated");
        Ok(tokens)
    }

    // -------------------------------------------------------------------
    // Logout / validation
    // -------------------------------------------------------------------

    /// Revoke `refresh_token` for `account_id` and, when given, blacklist the
    /// access token for its remaining lifetime.
    ///
    /// Returns `false` if this call did not delete the record, either because
    /// the delete failed or because a concurrent rotation got there first.
    pub async fn logout(
        &self,
        refresh_token: &str,
        account_id: &str,
        access_token: Option<&str>,
    ) -> Result<bool, SessionError> {
        let token_hash = hash_refresh_token(refresh_token);
        match self.store.find_refresh_record(&token_hash).await? {
            Some(record) if record.account_id == account_id => {}
            _ => return Err(SessionError::invalid_refresh_token()),
        }

        let deleted = match self.store.delete_refresh_record(&token_hash).await {
            Ok(true) => true,
            Ok(false) => {
                warn!(account_id, "refresh token vanished before logout could delete it");
                false
            }
            Err(e) => {
                error!(account_id, error = %e, "failed to delete refresh token on logout");
                false
            }
        };

        if let Some(access_token) = access_token {
            self.blacklist_access_token(access_token).await;
        }

        info!(account_id, "account signed out");
        Ok(deleted)
    }

    async fn blacklist_access_token(&self, access_token: &str) {
        let claims = match decode_access_token_ignoring_expiry(
            access_token,
            self.config.access_secret.as_bytes(),
        ) {
            Ok(claims) => claims,
            Err(e) => {
                warn!(error = %e, "access token not blacklisted: undecodable");
                return;
            }
        };

        let remaining = claims.exp - Utc::now().timestamp();
        if remaining <= 0 {
            debug!("access token already expired; not blacklisted");
            return;
        }

        let ttl = Duration::from_secs(remaining.unsigned_abs());
        match self
            .tokens
            .set_with_ttl(&keys::blacklist(access_token), "1", ttl)
            .await
        {
            Ok(()) => debug!(ttl_secs = remaining, "access token blacklisted"),
            Err(e) => error!(error = %e, "failed to blacklist access token"),
        }
    }

    /// Resolve the account an access token speaks for.
    ///
    /// `None` for blacklisted, expired, malformed or forged tokens, tokens
    /// without a subject and subjects that no longer exist. If the token
    /// store is unreachable the blacklist check is skipped.
    pub async fn validate_access_token(&self, access_token: &str) -> Option<Account> {
        match self.tokens.exists(&keys::blacklist(access_token)).await {
            Ok(true) => {
                debug!("rejected blacklisted access token");
                return None;
            }
            Ok(false) => {}
            Err(e) => error!(error = %e, "blacklist check failed; continuing without it"),
        }

        let claims = verify_access_token(access_token, self.config.access_secret.as_bytes())?;
        let account_id = claims.sub?;
        match self.store.find_account_by_id(&account_id).await {
            Ok(account) => account,
            Err(e) => {
                warn!(account_id = %account_id, error = %e, "account lookup failed during token validation");
                None
            }
        }
    }
}
