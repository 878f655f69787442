//! Credential store.
//!
//! Persistent accounts, refresh-token records and external identities.
//! [`postgres::PgCredentialStore`] backs production; [`memory::MemoryCredentialStore`]
//! backs tests and single-process development.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::auth::{
    Account, AccountUpdate, ExternalIdentity, NewAccount, NewExternalIdentity, RefreshTokenRecord,
};

/// Unique constraint on `accounts.email`.
pub const ACCOUNT_EMAIL_CONSTRAINT: &str = "accounts_email_key";

/// Unique constraint on `(external_identities.provider, provider_subject_id)`.
pub const IDENTITY_PROVIDER_CONSTRAINT: &str = "external_identities_provider_subject_key";

/// Storage errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write.
    #[error("unique constraint violated: {constraint}")]
    UniqueViolation { constraint: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(sqlx::Error),

    #[error("store error: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &e
            && db.is_unique_violation()
        {
            return StoreError::UniqueViolation {
                constraint: db.constraint().unwrap_or("unknown").to_string(),
            };
        }
        StoreError::Database(e)
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Persistent credential storage.
///
/// Refresh records are only ever inserted or deleted.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Look up an account by its (already normalized) email.
    async fn find_account_by_email(&self, email: &str) -> StoreResult<Option<Account>>;

    async fn find_account_by_id(&self, id: &str) -> StoreResult<Option<Account>>;

    async fn create_account(&self, account: &NewAccount) -> StoreResult<Account>;

    /// Apply a partial update. `StoreError::NotFound` if the account is gone.
    async fn update_account(&self, id: &str, update: &AccountUpdate) -> StoreResult<Account>;

    async fn find_refresh_record(&self, token_hash: &str)
    -> StoreResult<Option<RefreshTokenRecord>>;

    async fn create_refresh_record(&self, record: &RefreshTokenRecord) -> StoreResult<()>;

    /// Delete a refresh record. Returns whether a row was removed.
    async fn delete_refresh_record(&self, token_hash: &str) -> StoreResult<bool>;

    async fn find_external_identity(
        &self,
        provider: &str,
        provider_subject_id: &str,
    ) -> StoreResult<Option<ExternalIdentity>>;

    async fn list_external_identities(&self, account_id: &str)
    -> StoreResult<Vec<ExternalIdentity>>;

    /// Delete an identity owned by `account_id`. Returns whether a row was removed.
    async fn delete_external_identity(
        &self,
        account_id: &str,
        identity_id: &str,
    ) -> StoreResult<bool>;

    /// Open a transaction. Dropping it without [`CredentialTx::commit`] rolls back.
    async fn begin(&self) -> StoreResult<Box<dyn CredentialTx>>;
}

/// Writes performed atomically inside a transaction.
#[async_trait]
pub trait CredentialTx: Send {
    async fn create_account(&mut self, account: &NewAccount) -> StoreResult<Account>;

    async fn create_external_identity(
        &mut self,
        identity: &NewExternalIdentity,
    ) -> StoreResult<ExternalIdentity>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;
}
