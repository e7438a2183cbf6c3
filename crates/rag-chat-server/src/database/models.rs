use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::FromRow;

use crate::models::chat::Turn;

/// Row of the `chat_turns` table
#[derive(Debug, Clone, FromRow)]
pub struct TurnRow {
    pub role: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl TurnRow {
    /// Unknown role strings are rejected rather than coerced
    pub fn into_turn(self) -> Result<Turn> {
        Ok(Turn {
            role: self.role.parse()?,
            content: self.content,
            timestamp: Some(self.created_at),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chat::Role;

    #[test]
    fn test_row_conversion() {
        let row = TurnRow {
            role: "assistant".to_string(),
            content: "Hello".to_string(),
            created_at: Utc::now(),
        };
        let turn = row.into_turn().unwrap();
        assert_eq!(turn.role, Role::Assistant);
        assert!(turn.timestamp.is_some());
    }

    #[test]
    fn test_row_with_bad_role_rejected() {
        let row = TurnRow {
            role: "bot".to_string(),
            content: "?".to_string(),
            created_at: Utc::now(),
        };
        assert!(row.into_turn().is_err());
    }
}
