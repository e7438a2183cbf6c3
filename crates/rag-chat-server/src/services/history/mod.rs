//! Session history: durable turn log fronted by a lazily hydrated cache tier.

mod cache;
mod store;

pub use cache::{MemoryHistoryCache, RedisHistoryCache};
pub use store::{HistoryCache, SessionHistoryStore, TurnStore};

#[cfg(test)]
pub(crate) mod testing {
    use anyhow::Result;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use super::{HistoryCache, MemoryHistoryCache, TurnStore};
    use crate::models::chat::Turn;

    /// In-process durable store with write-failure injection
    #[derive(Default)]
    pub struct FakeTurnStore {
        turns: Mutex<HashMap<String, Vec<Turn>>>,
        fail_inserts: AtomicBool,
        find_calls: AtomicUsize,
    }

    impl FakeTurnStore {
        pub fn seed(&self, session_id: &str, turn: Turn) {
            self.turns
                .lock()
                .entry(session_id.to_string())
                .or_default()
                .push(turn);
        }

        pub fn turns(&self, session_id: &str) -> Vec<Turn> {
            self.turns.lock().get(session_id).cloned().unwrap_or_default()
        }

        pub fn fail_inserts(&self, fail: bool) {
            self.fail_inserts.store(fail, Ordering::SeqCst);
        }

        pub fn find_calls(&self) -> usize {
            self.find_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl TurnStore for FakeTurnStore {
        async fn insert_turn(&self, session_id: &str, turn: &Turn) -> Result<()> {
            if self.fail_inserts.load(Ordering::SeqCst) {
                anyhow::bail!("injected durable write failure");
            }
            self.seed(session_id, turn.clone());
            Ok(())
        }

        async fn find_turns_by_session(&self, session_id: &str) -> Result<Vec<Turn>> {
            self.find_calls.fetch_add(1, Ordering::SeqCst);
            let mut turns = self.turns(session_id);
            turns.sort_by_key(|t| t.timestamp);
            Ok(turns)
        }

        async fn ping(&self) -> Result<()> {
            Ok(())
        }
    }

    /// In-memory cache tier whose writes can be made to fail
    #[derive(Default)]
    pub struct FlakyHistoryCache {
        inner: MemoryHistoryCache,
        fail_writes: AtomicBool,
    }

    impl FlakyHistoryCache {
        pub fn is_empty(&self) -> bool {
            self.inner.is_empty()
        }

        pub fn fail_writes(&self, fail: bool) {
            self.fail_writes.store(fail, Ordering::SeqCst);
        }

        fn check_write(&self) -> Result<()> {
            if self.fail_writes.load(Ordering::SeqCst) {
                anyhow::bail!("injected cache write failure");
            }
            Ok(())
        }
    }

    #[async_trait::async_trait]
    impl HistoryCache for FlakyHistoryCache {
        async fn exists(&self, key: &str) -> Result<bool> {
            self.inner.exists(key).await
        }

        async fn append(&self, key: &str, item: &str) -> Result<()> {
            self.check_write()?;
            self.inner.append(key, item).await
        }

        async fn hydrate(&self, key: &str, items: &[String]) -> Result<bool> {
            self.check_write()?;
            self.inner.hydrate(key, items).await
        }

        async fn read_list(&self, key: &str) -> Result<Vec<String>> {
            self.inner.read_list(key).await
        }

        async fn ping(&self) -> Result<()> {
            Ok(())
        }
    }
}
