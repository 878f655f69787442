//! In-memory credential store.
//!
//! Enforces the same uniqueness constraints as the Postgres schema. A
//! transaction holds the store lock until it commits or is dropped, so
//! transactions are fully serialized.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{
    ACCOUNT_EMAIL_CONSTRAINT, CredentialStore, CredentialTx, IDENTITY_PROVIDER_CONSTRAINT,
    StoreError, StoreResult,
};
use crate::models::auth::{
    Account, AccountUpdate, ExternalIdentity, NewAccount, NewExternalIdentity, RefreshTokenRecord,
};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    accounts: HashMap<String, Account>,
    refresh_tokens: HashMap<String, RefreshTokenRecord>,
    identities: Vec<ExternalIdentity>,
}

impl MemoryState {
    fn insert_account(&mut self, new: &NewAccount) -> StoreResult<Account> {
        if self.accounts.values().any(|a| a.email == new.email) {
            return Err(StoreError::UniqueViolation {
                constraint: ACCOUNT_EMAIL_CONSTRAINT.into(),
            });
        }
        let now = Utc::now();
        let account = Account {
            id: Uuid::new_v4().to_string(),
            email: new.email.clone(),
            password_hash: new.password_hash.clone(),
            password_set: new.password_set,
            first_name: new.first_name.clone(),
            last_name: new.last_name.clone(),
            created_at: now,
            updated_at: now,
        };
        self.accounts.insert(account.id.clone(), account.clone());
        Ok(account)
    }

    fn insert_identity(&mut self, new: &NewExternalIdentity) -> StoreResult<ExternalIdentity> {
        if self
            .identities
            .iter()
            .any(|i| i.provider == new.provider && i.provider_subject_id == new.provider_subject_id)
        {
            return Err(StoreError::UniqueViolation {
                constraint: IDENTITY_PROVIDER_CONSTRAINT.into(),
            });
        }
        if !self.accounts.contains_key(&new.account_id) {
            return Err(StoreError::NotFound(format!("account {}", new.account_id)));
        }
        let identity = ExternalIdentity {
            id: Uuid::now_v7().to_string(),
            account_id: new.account_id.clone(),
            provider: new.provider.clone(),
            provider_subject_id: new.provider_subject_id.clone(),
            display_name: new.display_name.clone(),
            avatar_url: new.avatar_url.clone(),
            metadata: new.metadata.clone(),
            created_at: Utc::now(),
        };
        self.identities.push(identity.clone());
        Ok(identity)
    }
}

/// Credential store kept entirely in process memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryCredentialStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored accounts.
    pub async fn account_count(&self) -> usize {
        self.state.lock().await.accounts.len()
    }

    /// Number of live refresh records.
    pub async fn refresh_record_count(&self) -> usize {
        self.state.lock().await.refresh_tokens.len()
    }

    /// Number of linked external identities.
    pub async fn identity_count(&self) -> usize {
        self.state.lock().await.identities.len()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn find_account_by_email(&self, email: &str) -> StoreResult<Option<Account>> {
        let state = self.state.lock().await;
        Ok(state.accounts.values().find(|a| a.email == email).cloned())
    }

    async fn find_account_by_id(&self, id: &str) -> StoreResult<Option<Account>> {
        Ok(self.state.lock().await.accounts.get(id).cloned())
    }

    async fn create_account(&self, account: &NewAccount) -> StoreResult<Account> {
        self.state.lock().await.insert_account(account)
    }

    async fn update_account(&self, id: &str, update: &AccountUpdate) -> StoreResult<Account> {
        let mut state = self.state.lock().await;
        if let Some(email) = &update.email
            && state.accounts.values().any(|a| a.id != id && &a.email == email)
        {
            return Err(StoreError::UniqueViolation {
                constraint: ACCOUNT_EMAIL_CONSTRAINT.into(),
            });
        }
        let account = state
            .accounts
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("account {id}")))?;
        if let Some(email) = &update.email {
            account.email = email.clone();
        }
        if let Some(hash) = &update.password_hash {
            account.password_hash = Some(hash.clone());
            account.password_set = true;
        }
        if let Some(first) = &update.first_name {
            account.first_name = Some(first.clone());
        }
        if let Some(last) = &update.last_name {
            account.last_name = Some(last.clone());
        }
        account.updated_at = Utc::now();
        Ok(account.clone())
    }

    async fn find_refresh_record(
        &self,
        token_hash: &str,
    ) -> StoreResult<Option<RefreshTokenRecord>> {
        Ok(self.state.lock().await.refresh_tokens.get(token_hash).cloned())
    }

    async fn create_refresh_record(&self, record: &RefreshTokenRecord) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        if state.refresh_tokens.contains_key(&record.token_hash) {
            return Err(StoreError::UniqueViolation {
                constraint: "refresh_tokens_pkey".into(),
            });
        }
        state
            .refresh_tokens
            .insert(record.token_hash.clone(), record.clone());
        Ok(())
    }

    async fn delete_refresh_record(&self, token_hash: &str) -> StoreResult<bool> {
        Ok(self
            .state
            .lock()
            .await
            .refresh_tokens
            .remove(token_hash)
            .is_some())
    }

    async fn find_external_identity(
        &self,
        provider: &str,
        provider_subject_id: &str,
    ) -> StoreResult<Option<ExternalIdentity>> {
        let state = self.state.lock().await;
        Ok(state
            .identities
            .iter()
            .find(|i| i.provider == provider && i.provider_subject_id == provider_subject_id)
            .cloned())
    }

    async fn list_external_identities(
        &self,
        account_id: &str,
    ) -> StoreResult<Vec<ExternalIdentity>> {
        let state = self.state.lock().await;
        Ok(state
            .identities
            .iter()
            .filter(|i| i.account_id == account_id)
            .cloned()
            .collect())
    }

    async fn delete_external_identity(
        &self,
        account_id: &str,
        identity_id: &str,
    ) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        let before = state.identities.len();
        state
            .identities
            .retain(|i| !(i.id == identity_id && i.account_id == account_id));
        Ok(state.identities.len() != before)
    }

    async fn begin(&self) -> StoreResult<Box<dyn CredentialTx>> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTx { guard, working }))
    }
}

/// Transaction over [`MemoryCredentialStore`]: writes go to a working copy
/// that replaces the shared state on commit.
struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

#[async_trait]
impl CredentialTx for MemoryTx {
    async fn create_account(&mut self, account: &NewAccount) -> StoreResult<Account> {
        self.working.insert_account(account)
    }

    async fn create_external_identity(
        &mut self,
        identity: &NewExternalIdentity,
    ) -> StoreResult<ExternalIdentity> {
        self.working.insert_identity(identity)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let MemoryTx { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}
