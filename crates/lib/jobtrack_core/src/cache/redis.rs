//! Redis-backed token store.

use std::time::Duration;

use ::redis::aio::ConnectionManager;
use ::redis::{AsyncCommands, Client, Script};
use async_trait::async_trait;
use tracing::info;

use super::{TokenStore, TokenStoreResult, ttl_secs};

/// Deletes `KEYS[1]` only while it still holds `ARGV[1]`.
const COMPARE_AND_DELETE: &str = r#"
if redis.call("get", KEYS[1]) == ARGV[1] then
    return redis.call("del", KEYS[1])
else
    return 0
end
"#;

/// Token store on a shared Redis instance.
///
/// `ConnectionManager` reconnects transparently; clones share one
/// multiplexed connection.
#[derive(Clone)]
pub struct RedisTokenStore {
    conn: ConnectionManager,
    compare_and_delete: Script,
}

impl RedisTokenStore {
    /// Connect and verify the server answers `PING`.
    ///
    /// Fails if Redis is unreachable so the process refuses to start
    /// without its blacklist.
    pub async fn connect(url: &str) -> TokenStoreResult<Self> {
        let client = Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        let store = Self {
            conn,
            compare_and_delete: Script::new(COMPARE_AND_DELETE),
        };
        store.ping().await?;
        info!("redis connection established");
        Ok(store)
    }

    pub async fn ping(&self) -> TokenStoreResult<()> {
        let mut conn = self.conn.clone();
        let _: String = ::redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

#[async_trait]
impl TokenStore for RedisTokenStore {
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> TokenStoreResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.set_ex(key, value, ttl_secs(ttl)).await?;
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> TokenStoreResult<bool> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = ::redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn get(&self, key: &str) -> TokenStoreResult<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn delete(&self, key: &str) -> TokenStoreResult<bool> {
        let mut conn = self.conn.clone();
        let removed: i64 = conn.del(key).await?;
        Ok(removed > 0)
    }

    async fn exists(&self, key: &str) -> TokenStoreResult<bool> {
        let mut conn = self.conn.clone();
        let exists: bool = conn.exists(key).await?;
        Ok(exists)
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> TokenStoreResult<bool> {
        let mut conn = self.conn.clone();
        let removed: i64 = self
            .compare_and_delete
            .key(key)
            .arg(expected)
            .invoke_async(&mut conn)
            .await?;
        Ok(removed > 0)
    }
}
