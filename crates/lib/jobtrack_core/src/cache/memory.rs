//! In-memory token store.
//!
//! Expiry uses `tokio::time::Instant`, so paused-clock tests can advance time.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::time::Instant;

use super::{TokenStore, TokenStoreResult, ttl_secs};

#[derive(Debug, Clone)]
struct StoredValue {
    value: String,
    expires_at: Instant,
}

impl StoredValue {
    fn new(value: &str, ttl: Duration) -> Self {
        Self {
            value: value.to_string(),
            expires_at: Instant::now() + Duration::from_secs(ttl_secs(ttl)),
        }
    }

    fn is_live(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// Token store kept in a concurrent map. Expired entries are dropped lazily
/// on access and by [`MemoryTokenStore::purge_expired`].
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    entries: DashMap<String, StoredValue>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evict expired entries.
    pub fn purge_expired(&self) {
        self.entries.retain(|_, v| v.is_live());
    }

    /// Remaining lifetime of a live key.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        self.entries
            .get(key)
            .filter(|v| v.is_live())
            .map(|v| v.expires_at.saturating_duration_since(Instant::now()))
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.is_live()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> TokenStoreResult<()> {
        self.entries
            .insert(key.to_string(), StoredValue::new(value, ttl));
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> TokenStoreResult<bool> {
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_live() {
                    return Ok(false);
                }
                occupied.insert(StoredValue::new(value, ttl));
                Ok(true)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(StoredValue::new(value, ttl));
                Ok(true)
            }
        }
    }

    async fn get(&self, key: &str) -> TokenStoreResult<Option<String>> {
        let live = self
            .entries
            .get(key)
            .map(|v| v.is_live().then(|| v.value.clone()));
        match live {
            Some(Some(value)) => Ok(Some(value)),
            Some(None) => {
                self.entries.remove_if(key, |_, v| !v.is_live());
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, key: &str) -> TokenStoreResult<bool> {
        Ok(self
            .entries
            .remove(key)
            .is_some_and(|(_, v)| v.is_live()))
    }

    async fn exists(&self, key: &str) -> TokenStoreResult<bool> {
        Ok(self.get(key).await?.is_some())
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> TokenStoreResult<bool> {
        Ok(self
            .entries
            .remove_if(key, |_, v| v.is_live() && v.value == expected)
            .is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let store = MemoryTokenStore::new();
        store
            .set_with_ttl("k", "v", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));

        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(store.exists("k").await.unwrap());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(!store.exists("k").await.unwrap());
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn set_if_absent_respects_live_entries() {
        let store = MemoryTokenStore::new();
        let ttl = Duration::from_secs(10);
        assert!(store.set_if_absent("lock", "a", ttl).await.unwrap());
        assert!(!store.set_if_absent("lock", "b", ttl).await.unwrap());

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(store.set_if_absent("lock", "b", ttl).await.unwrap());
        assert_eq!(store.get("lock").await.unwrap().as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn compare_and_delete_only_removes_matching_value() {
        let store = MemoryTokenStore::new();
        store
            .set_with_ttl("lock", "owner-a", Duration::from_secs(30))
            .await
            .unwrap();
        assert!(!store.compare_and_delete("lock", "owner-b").await.unwrap());
        assert!(store.exists("lock").await.unwrap());
        assert!(store.compare_and_delete("lock", "owner-a").await.unwrap());
        assert!(!store.exists("lock").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn ttl_reports_remaining_lifetime() {
        let store = MemoryTokenStore::new();
        store
            .set_with_ttl("k", "v", Duration::from_secs(60))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(20)).await;
        assert_eq!(store.ttl("k"), Some(Duration::from_secs(40)));
        assert_eq!(store.ttl("missing"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn purge_drops_expired_entries() {
        let store = MemoryTokenStore::new();
        store
            .set_with_ttl("short", "v", Duration::from_secs(1))
            .await
            .unwrap();
        store
            .set_with_ttl("long", "v", Duration::from_secs(100))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;
        store.purge_expired();
        assert_eq!(store.len(), 1);
        assert!(store.exists("long").await.unwrap());
    }
}
