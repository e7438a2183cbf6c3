use super::{DbPool, TurnRow};
use anyhow::{Context, Result};
use chrono::Utc;
use tracing::debug;

use crate::models::chat::Turn;
use crate::services::history::TurnStore;

pub struct Repository {
    pub pool: DbPool,
}

impl Repository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Append one turn to the log
    pub async fn insert_chat_turn(&self, session_id: &str, turn: &Turn) -> Result<()> {
        let created_at = turn.timestamp.unwrap_or_else(Utc::now);

        sqlx::query(
            r#"INSERT INTO chat_turns (session_id, role, content, created_at)
               VALUES ($1, $2, $3, $4)"#,
        )
        .bind(session_id)
        .bind(turn.role.as_str())
        .bind(&turn.content)
        .bind(created_at)
        .execute(self.pool.get_pool())
        .await?;

        Ok(())
    }

    /// Turns of a session ordered by timestamp ascending
    pub async fn get_session_turns(&self, session_id: &str) -> Result<Vec<TurnRow>> {
        let rows = sqlx::query_as::<_, TurnRow>(
            r#"SELECT
                role,
                content,
                created_at
               FROM chat_turns
               WHERE session_id = $1
               ORDER BY created_at ASC, id ASC"#,
        )
        .bind(session_id)
        .persistent(false)
        .fetch_all(self.pool.get_pool())
        .await?;

        debug!("Loaded {} turns for session {}", rows.len(), session_id);

        Ok(rows)
    }
}

#[async_trait::async_trait]
impl TurnStore for Repository {
    async fn insert_turn(&self, session_id: &str, turn: &Turn) -> Result<()> {
        self.insert_chat_turn(session_id, turn)
            .await
            .context("Failed to insert chat turn")
    }

    async fn find_turns_by_session(&self, session_id: &str) -> Result<Vec<Turn>> {
        self.get_session_turns(session_id)
            .await
            .context("Failed to load chat turns")?
            .into_iter()
            .map(TurnRow::into_turn)
            .collect()
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(self.pool.get_pool())
            .await?;
        Ok(())
    }
}
