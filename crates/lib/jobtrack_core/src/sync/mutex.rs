//! In-process keyed mutex.
//!
//! One `tokio::sync::Mutex` per key, created lazily and removed once the
//! last holder or waiter lets go. Tokio mutexes hand the lock out in FIFO
//! order, so waiters on a key are served in arrival order. Keys never block
//! each other.

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

type Slot = Arc<Mutex<()>>;

/// Per-key async mutual exclusion.
#[derive(Debug, Default)]
pub struct KeyedMutex {
    slots: DashMap<String, Slot>,
}

impl KeyedMutex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the lock for `key`.
    ///
    /// The lock is released when `f` completes, returns an error, panics or
    /// is cancelled. There is no timeout: a future that never completes holds
    /// its key forever.
    pub async fn with_lock<F, Fut, T>(&self, key: &str, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _held = self.acquire(key).await;
        f().await
    }

    /// Whether `key` is currently held or awaited.
    pub fn is_locked(&self, key: &str) -> bool {
        self.slots.contains_key(key)
    }

    /// Number of keys currently held or awaited.
    pub fn active_lock_count(&self) -> usize {
        self.slots.len()
    }

    async fn acquire(&self, key: &str) -> HeldKey<'_> {
        // Cloning under the shard lock keeps the strong count in step with
        // the cleanup check in `HeldKey::drop`.
        let slot = Arc::clone(self.slots.entry(key.to_string()).or_default().value());
        let mut held = HeldKey {
            owner: self,
            key: key.to_string(),
            slot,
            guard: None,
        };
        held.guard = Some(Arc::clone(&held.slot).lock_owned().await);
        held
    }
}

/// A held (or awaited) key. Dropping it releases the lock and removes the
/// slot when nobody else references it.
struct HeldKey<'a> {
    owner: &'a KeyedMutex,
    key: String,
    slot: Slot,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for HeldKey<'_> {
    fn drop(&mut self) {
        self.guard.take();
        // One reference in the map, one here.
        self.owner
            .slots
            .remove_if(&self.key, |_, slot| Arc::ptr_eq(slot, &self.slot) && Arc::strong_count(slot) == 2);
    }
}
