//! Cross-process lock over the shared token store.
//!
//! Acquire is `SET key owner NX EX ttl` with a bounded number of retries;
//! release is an atomic compare-and-delete on the owner token so a holder
//! whose entry already expired cannot remove somebody else's lock. A holder
//! that is cancelled or panics releases from a spawned task; the TTL bounds
//! how long a crashed process can block others.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::cache::{TokenStore, TokenStoreError, keys};

/// Default lock time-to-live.
pub const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(30);

/// Delay between acquisition attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Acquisition attempts before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 50;

/// Distributed lock errors.
#[derive(Debug, Error)]
pub enum LockError {
    #[error("failed to acquire lock for key {key} after {attempts} attempts")]
    NotAcquired { key: String, attempts: u32 },

    #[error("lock store error: {0}")]
    Store(#[from] TokenStoreError),
}

/// Keyed lock shared by every process using the same token store.
#[derive(Clone)]
pub struct DistributedLock {
    store: Arc<dyn TokenStore>,
    retry_delay: Duration,
    max_attempts: u32,
}

impl DistributedLock {
    pub fn new(store: Arc<dyn TokenStore>) -> Self {
        Self {
            store,
            retry_delay: DEFAULT_RETRY_DELAY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Override the retry budget.
    pub fn with_retry(mut self, max_attempts: u32, retry_delay: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.retry_delay = retry_delay;
        self
    }

    /// Run `f` while holding the lock for `key`.
    ///
    /// Fails with [`LockError::NotAcquired`] once the retry budget is spent.
    /// The lock is released even if the returned future is dropped or `f`
    /// panics. Release failures are logged; the entry then expires after
    /// `ttl`.
    pub async fn with_lock<F, Fut, T>(&self, key: &str, ttl: Duration, f: F) -> Result<T, LockError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let lock_key = keys::lock(key);
        let owner = owner_token();

        self.acquire(&lock_key, &owner, ttl).await?;
        debug!(key = %lock_key, "lock acquired");
        let mut held = HeldLock {
            store: Arc::clone(&self.store),
            lock_key,
            owner,
            armed: true,
        };

        let result = f().await;

        held.armed = false;
        release(held.store.as_ref(), &held.lock_key, &held.owner).await;
        Ok(result)
    }

    /// Whether `key` is currently locked by anyone.
    pub async fn is_locked(&self, key: &str) -> Result<bool, LockError> {
        Ok(self.store.exists(&keys::lock(key)).await?)
    }

    async fn acquire(&self, lock_key: &str, owner: &str, ttl: Duration) -> Result<(), LockError> {
        for attempt in 1..=self.max_attempts {
            if self.store.set_if_absent(lock_key, owner, ttl).await? {
                return Ok(());
            }
            if attempt < self.max_attempts {
                tokio::time::sleep(self.retry_delay).await;
            }
        }
        Err(LockError::NotAcquired {
            key: lock_key.to_string(),
            attempts: self.max_attempts,
        })
    }
}

async fn release(store: &dyn TokenStore, lock_key: &str, owner: &str) {
    match store.compare_and_delete(lock_key, owner).await {
        Ok(true) => debug!(key = %lock_key, "lock released"),
        Ok(false) => debug!(key = %lock_key, "lock expired before release"),
        Err(e) => error!(key = %lock_key, error = %e, "failed to release lock"),
    }
}

/// An acquired lock entry. Dropped while still armed, it releases the entry
/// from a background task.
struct HeldLock {
    store: Arc<dyn TokenStore>,
    lock_key: String,
    owner: String,
    armed: bool,
}

impl Drop for HeldLock {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(key = %self.lock_key, "no runtime to release abandoned lock; waiting for expiry");
            return;
        };
        let store = Arc::clone(&self.store);
        let lock_key = std::mem::take(&mut self.lock_key);
        let owner = std::mem::take(&mut self.owner);
        debug!(key = %lock_key, "releasing abandoned lock");
        runtime.spawn(async move {
            release(store.as_ref(), &lock_key, &owner).await;
        });
    }
}

/// Unique owner token for one acquisition.
fn owner_token() -> String {
    format!("{}-{}", std::process::id(), Uuid::new_v4())
}
