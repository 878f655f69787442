//! PostgreSQL credential store.
//!
//! Schema lives in `jobtrack_core/migrations/`. Account and identity IDs are
//! UUIDs in the database and `String`s in the domain; malformed IDs simply
//! match nothing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{CredentialStore, CredentialTx, StoreError, StoreResult};
use crate::models::auth::{
    Account, AccountUpdate, ExternalIdentity, NewAccount, NewExternalIdentity, RefreshTokenRecord,
};

const ACCOUNT_COLUMNS: &str =
    "id::text, email, password_hash, password_set, first_name, last_name, created_at, updated_at";

const IDENTITY_COLUMNS: &str = "id::text, account_id::text, provider, provider_subject_id, \
     display_name, avatar_url, metadata, created_at";

type AccountRow = (
    String,
    String,
    Option<String>,
    bool,
    Option<String>,
    Option<String>,
    DateTime<Utc>,
    DateTime<Utc>,
);

type IdentityRow = (
    String,
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    serde_json::Value,
    DateTime<Utc>,
);

fn account_from_row(row: AccountRow) -> Account {
    let (id, email, password_hash, password_set, first_name, last_name, created_at, updated_at) =
        row;
    Account {
        id,
        email,
        password_hash,
        password_set,
        first_name,
        last_name,
        created_at,
        updated_at,
    }
}

fn identity_from_row(row: IdentityRow) -> ExternalIdentity {
    let (id, account_id, provider, provider_subject_id, display_name, avatar_url, metadata, created_at) =
        row;
    ExternalIdentity {
        id,
        account_id,
        provider,
        provider_subject_id,
        display_name,
        avatar_url,
        metadata,
        created_at,
    }
}

fn parse_id(id: &str) -> Option<Uuid> {
    Uuid::parse_str(id).ok()
}

fn require_id(id: &str) -> StoreResult<Uuid> {
    parse_id(id).ok_or_else(|| StoreError::NotFound(format!("account {id}")))
}

/// Credential store backed by a Postgres pool.
#[derive(Debug, Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn find_account_by_email(&self, email: &str) -> StoreResult<Option<Account>> {
        let row = sqlx::query_as::<_, AccountRow>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(account_from_row))
    }

    async fn find_account_by_id(&self, id: &str) -> StoreResult<Option<Account>> {
        let Some(id) = parse_id(id) else {
            return Ok(None);
        };
        let row = sqlx::query_as::<_, AccountRow>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(account_from_row))
    }

    async fn create_account(&self, account: &NewAccount) -> StoreResult<Account> {
        insert_account(&self.pool, account).await
    }

    async fn update_account(&self, id: &str, update: &AccountUpdate) -> StoreResult<Account> {
        let uuid = require_id(id)?;
        let row = sqlx::query_as::<_, AccountRow>(&format!(
            "UPDATE accounts SET \
               email = COALESCE($2, email), \
               password_hash = COALESCE($3, password_hash), \
               password_set = password_set OR $3 IS NOT NULL, \
               first_name = COALESCE($4, first_name), \
               last_name = COALESCE($5, last_name), \
               updated_at = now() \
             WHERE id = $1 \
             RETURNING {ACCOUNT_COLUMNS}"
        ))
        .bind(uuid)
        .bind(update.email.as_deref())
        .bind(update.password_hash.as_deref())
        .bind(update.first_name.as_deref())
        .bind(update.last_name.as_deref())
        .fetch_optional(&self.pool)
        .await?;
        row.map(account_from_row)
            .ok_or_else(|| StoreError::NotFound(format!("account {id}")))
    }

    async fn find_refresh_record(
        &self,
        token_hash: &str,
    ) -> StoreResult<Option<RefreshTokenRecord>> {
        let row = sqlx::query_as::<_, (String, String, String, DateTime<Utc>)>(
            "SELECT token_hash, account_id::text, user_agent, expires_at \
             FROM refresh_tokens WHERE token_hash = $1",
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(
            |(token_hash, account_id, user_agent, expires_at)| RefreshTokenRecord {
                token_hash,
                account_id,
                user_agent,
                expires_at,
            },
        ))
    }

    async fn create_refresh_record(&self, record: &RefreshTokenRecord) -> StoreResult<()> {
        let account_id = require_id(&record.account_id)?;
        sqlx::query(
            "INSERT INTO refresh_tokens (token_hash, account_id, user_agent, expires_at) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(&record.token_hash)
        .bind(account_id)
        .bind(&record.user_agent)
        .bind(record.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_refresh_record(&self, token_hash: &str) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE token_hash = $1")
            .bind(token_hash)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_external_identity(
        &self,
        provider: &str,
        provider_subject_id: &str,
    ) -> StoreResult<Option<ExternalIdentity>> {
        let row = sqlx::query_as::<_, IdentityRow>(&format!(
            "SELECT {IDENTITY_COLUMNS} FROM external_identities \
             WHERE provider = $1 AND provider_subject_id = $2"
        ))
        .bind(provider)
        .bind(provider_subject_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(identity_from_row))
    }

    async fn list_external_identities(
        &self,
        account_id: &str,
    ) -> StoreResult<Vec<ExternalIdentity>> {
        let Some(account_id) = parse_id(account_id) else {
            return Ok(Vec::new());
        };
        let rows = sqlx::query_as::<_, IdentityRow>(&format!(
            "SELECT {IDENTITY_COLUMNS} FROM external_identities \
             WHERE account_id = $1 ORDER BY created_at"
        ))
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(identity_from_row).collect())
    }

    async fn delete_external_identity(
        &self,
        account_id: &str,
        identity_id: &str,
    ) -> StoreResult<bool> {
        let (Some(account_id), Some(identity_id)) = (parse_id(account_id), parse_id(identity_id))
        else {
            return Ok(false);
        };
        let result =
            sqlx::query("DELETE FROM external_identities WHERE id = $1 AND account_id = $2")
                .bind(identity_id)
                .bind(account_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn begin(&self) -> StoreResult<Box<dyn CredentialTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgCredentialTx { tx }))
    }
}

async fn insert_account<'e, E>(executor: E, account: &NewAccount) -> StoreResult<Account>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    let row = sqlx::query_as::<_, AccountRow>(&format!(
        "INSERT INTO accounts (email, password_hash, password_set, first_name, last_name) \
         VALUES ($1, $2, $3, $4, $5) \
         RETURNING {ACCOUNT_COLUMNS}"
    ))
    .bind(&account.email)
    .bind(account.password_hash.as_deref())
    .bind(account.password_set)
    .bind(account.first_name.as_deref())
    .bind(account.last_name.as_deref())
    .fetch_one(executor)
    .await?;
    Ok(account_from_row(row))
}

/// Open Postgres transaction; rolled back by sqlx when dropped uncommitted.
struct PgCredentialTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl CredentialTx for PgCredentialTx {
    async fn create_account(&mut self, account: &NewAccount) -> StoreResult<Account> {
        insert_account(&mut *self.tx, account).await
    }

    async fn create_external_identity(
        &mut self,
        identity: &NewExternalIdentity,
    ) -> StoreResult<ExternalIdentity> {
        let account_id = require_id(&identity.account_id)?;
        let row = sqlx::query_as::<_, IdentityRow>(&format!(
            "INSERT INTO external_identities \
               (id, account_id, provider, provider_subject_id, display_name, avatar_url, metadata) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {IDENTITY_COLUMNS}"
        ))
        .bind(Uuid::now_v7())
        .bind(account_id)
        .bind(&identity.provider)
        .bind(&identity.provider_subject_id)
        .bind(identity.display_name.as_deref())
        .bind(identity.avatar_url.as_deref())
        .bind(&identity.metadata)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(identity_from_row(row))
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
