use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{debug, info};

use crate::models::chat::{ChatMessage, Role, Turn};

/// Durable, authoritative turn log
#[async_trait::async_trait]
pub trait TurnStore: Send + Sync {
    /// Insert a new turn. Never upserts.
    async fn insert_turn(&self, session_id: &str, turn: &Turn) -> Result<()>;

    /// All turns of a session, oldest first
    async fn find_turns_by_session(&self, session_id: &str) -> Result<Vec<Turn>>;

    async fn ping(&self) -> Result<()>;
}

/// Fast list-backed cache tier keyed by string
#[async_trait::async_trait]
pub trait HistoryCache: Send + Sync {
    async fn exists(&self, key: &str) -> Result<bool>;
    async fn append(&self, key: &str, item: &str) -> Result<()>;

    /// Create `key` holding `items` in one atomic write, only if `key` is
    /// absent. Returns false when another writer got there first.
    async fn hydrate(&self, key: &str, items: &[String]) -> Result<bool>;

    async fn read_list(&self, key: &str) -> Result<Vec<String>>;
    async fn ping(&self) -> Result<()>;
}

/// Two-tier session history: write-through cache over a durable turn log,
/// hydrated lazily on first read.
///
/// Writes go durable first, then cache. This is best-effort consistency, not
/// a transaction: a failed cache push leaves the cache behind the durable
/// log, never ahead of it. Concurrent appends to one session are not
/// serialized, so two interleaved exchanges may land in either order.
#[derive(Clone)]
pub struct SessionHistoryStore {
    durable: Arc<dyn TurnStore>,
    cache: Arc<dyn HistoryCache>,
    key_prefix: String,
}

impl SessionHistoryStore {
    pub fn new(
        durable: Arc<dyn TurnStore>,
        cache: Arc<dyn HistoryCache>,
        key_prefix: impl Into<String>,
    ) -> Self {
        Self {
            durable,
            cache,
            key_prefix: key_prefix.into(),
        }
    }

    fn cache_key(&self, session_id: &str) -> String {
        format!("{}{}", self.key_prefix, session_id)
    }

    /// Ordered history of a session.
    ///
    /// A present cache entry is authoritative: the durable log is not
    /// consulted again for that session, even if it changed out-of-band.
    pub async fn read(&self, session_id: &str) -> Result<Vec<Turn>> {
        let key = self.cache_key(session_id);

        if self.cache.exists(&key).await.context("Cache lookup failed")? {
            let items = self.cache.read_list(&key).await.context("Cache read failed")?;
            debug!("History cache hit for session {} ({} turns)", session_id, items.len());

            return items
                .iter()
                .map(|item| {
                    serde_json::from_str::<ChatMessage>(item)
                        .map(Turn::from)
                        .context("Corrupt cache entry")
                })
                .collect();
        }

        let turns = self
            .durable
            .find_turns_by_session(session_id)
            .await
            .context("Durable history read failed")?;

        if turns.is_empty() {
            return Ok(turns);
        }

        let items = turns
            .iter()
            .map(|turn| serde_json::to_string(&turn.to_message()))
            .collect::<serde_json::Result<Vec<_>>>()?;

        // Single write: the cache holds all of these turns or none
        let created = self
            .cache
            .hydrate(&key, &items)
            .await
            .context("Cache hydration failed")?;

        if created {
            info!("Hydrated history cache for session {} with {} turns", session_id, turns.len());
        } else {
            debug!("History cache for session {} was hydrated concurrently", session_id);
        }
        Ok(turns)
    }

    /// Persist one turn: durable insert, then cache push.
    pub async fn append(&self, session_id: &str, role: Role, content: &str) -> Result<()> {
        let turn = Turn::now(role, content);

        // Cache must never hold a turn the durable log lacks
        self.durable
            .insert_turn(session_id, &turn)
            .await
            .context("Durable write failed")?;

        let item = serde_json::to_string(&turn.to_message())?;
        self.cache
            .append(&self.cache_key(session_id), &item)
            .await
            .context("Cache write failed")?;

        debug!("Appended {} turn to session {}", role, session_id);
        Ok(())
    }

    /// Both tiers reachable
    pub async fn ping(&self) -> Result<()> {
        self.durable.ping().await.context("Durable store unreachable")?;
        self.cache.ping().await.context("Cache tier unreachable")?;
        Ok(())
    }
}
