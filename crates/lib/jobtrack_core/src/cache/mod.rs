//! Shared key/value token store with per-key TTL.
//!
//! Hosts the access-token blacklist, single-use tokens and distributed lock
//! entries. Every concern prefixes its keys (see [`keys`]) so they never
//! collide in one keyspace.

pub mod memory;
pub mod redis;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Token store errors.
#[derive(Debug, Error)]
pub enum TokenStoreError {
    #[error("redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    #[error("token store unavailable: {0}")]
    Unavailable(String),
}

/// Result type for token store operations.
pub type TokenStoreResult<T> = Result<T, TokenStoreError>;

/// Expiring key/value store.
///
/// TTLs are whole seconds; anything shorter is rounded up to one second.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Set `key` unconditionally, expiring after `ttl`.
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> TokenStoreResult<()>;

    /// Set `key` only if absent. Returns whether the value was written.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration)
    -> TokenStoreResult<bool>;

    async fn get(&self, key: &str) -> TokenStoreResult<Option<String>>;

    /// Returns whether a key was removed.
    async fn delete(&self, key: &str) -> TokenStoreResult<bool>;

    async fn exists(&self, key: &str) -> TokenStoreResult<bool>;

    /// Atomically delete `key` only if it still holds `expected`.
    async fn compare_and_delete(&self, key: &str, expected: &str) -> TokenStoreResult<bool>;
}

/// TTL in whole seconds, never zero.
pub(crate) fn ttl_secs(ttl: Duration) -> u64 {
    let secs = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
    secs.max(1)
}

/// Key naming for everything sharing the token store.
pub mod keys {
    /// Prefix of access-token blacklist entries.
    pub const BLACKLIST_PREFIX: &str = "bl_";
    /// Prefix of distributed lock entries.
    pub const LOCK_PREFIX: &str = "lock:";
    /// Prefix of single-use tokens (`token:<kind>:<token>`).
    pub const SINGLE_USE_PREFIX: &str = "token:";

    pub fn blacklist(access_token: &str) -> String {
        format!("{BLACKLIST_PREFIX}{access_token}")
    }

    pub fn lock(key: &str) -> String {
        format!("{LOCK_PREFIX}{key}")
    }
}
