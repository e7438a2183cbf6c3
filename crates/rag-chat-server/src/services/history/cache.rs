use anyhow::{Context, Result};
use dashmap::{mapref::entry::Entry, DashMap};
use redis::aio::ConnectionManager;
use std::sync::Arc;
use tracing::{debug, info};

use super::store::HistoryCache;

/// Thread-safe in-process cache tier.
/// Uses DashMap so sessions on different shards never contend.
#[derive(Clone, Default)]
pub struct MemoryHistoryCache {
    storage: Arc<DashMap<String, Vec<String>>>,
}

impl MemoryHistoryCache {
    pub fn new() -> Self {
        info!("Initializing in-memory history cache with DashMap");
        Self::default()
    }

    /// Number of cached sessions
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }
}

#[async_trait::async_trait]
impl HistoryCache for MemoryHistoryCache {
    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.storage.contains_key(key))
    }

    async fn append(&self, key: &str, item: &str) -> Result<()> {
        self.storage
            .entry(key.to_string())
            .or_default()
            .push(item.to_string());
        Ok(())
    }

    async fn hydrate(&self, key: &str, items: &[String]) -> Result<bool> {
        match self.storage.entry(key.to_string()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(items.to_vec());
                Ok(true)
            }
        }
    }

    async fn read_list(&self, key: &str) -> Result<Vec<String>> {
        Ok(self
            .storage
            .get(key)
            .map(|entry| entry.value().clone())
            .unwrap_or_default())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

/// RPUSH the whole list only when the key is absent; returns the new length or 0
const HYDRATE_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 1 then
    return 0
end
return redis.call('RPUSH', KEYS[1], unpack(ARGV))
"#;

/// Redis list-backed cache tier (`EXISTS` / `RPUSH` / `LRANGE`)
#[derive(Clone)]
pub struct RedisHistoryCache {
    conn: ConnectionManager,
    hydrate_script: Arc<redis::Script>,
}

impl RedisHistoryCache {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).context("Invalid Redis URL")?;
        let conn = ConnectionManager::new(client)
            .await
            .context("Failed to connect to Redis")?;

        Ok(Self {
            conn,
            hydrate_script: Arc::new(redis::Script::new(HYDRATE_SCRIPT)),
        })
    }
}

#[async_trait::async_trait]
impl HistoryCache for RedisHistoryCache {
    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let exists: bool = redis::cmd("EXISTS").arg(key).query_async(&mut conn).await?;
        Ok(exists)
    }

    async fn append(&self, key: &str, item: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let len: i64 = redis::cmd("RPUSH")
            .arg(key)
            .arg(item)
            .query_async(&mut conn)
            .await?;
        debug!("RPUSH {} -> length {}", key, len);
        Ok(())
    }

    async fn hydrate(&self, key: &str, items: &[String]) -> Result<bool> {
        if items.is_empty() {
            return Ok(false);
        }

        let mut conn = self.conn.clone();
        let len: i64 = self
            .hydrate_script
            .key(key)
            .arg(items)
            .invoke_async(&mut conn)
            .await?;
        debug!("Hydrate {} -> length {}", key, len);
        Ok(len > 0)
    }

    async fn read_list(&self, key: &str) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let items: Vec<String> = redis::cmd("LRANGE")
            .arg(key)
            .arg(0)
            .arg(-1)
            .query_async(&mut conn)
            .await?;
        Ok(items)
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}
