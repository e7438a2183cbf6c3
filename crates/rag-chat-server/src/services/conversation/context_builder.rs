use crate::models::chat::ChatMessage;

use super::types::SearchHit;

const REFERENCE_HEADER: &str = "Reference:\n";

/// Turns retrieval hits into the synthetic reference turn.
pub struct ContextBuilder {
    text_field: String,
}

impl ContextBuilder {
    pub fn new(text_field: impl Into<String>) -> Self {
        Self {
            text_field: text_field.into(),
        }
    }

    /// Newline-joined hit texts. Hits without text are skipped.
    pub fn reference_block(&self, hits: &[SearchHit]) -> String {
        hits.iter()
            .filter_map(|hit| hit.text(&self.text_field))
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// System turn carrying the reference block, or None when nothing was found
    pub fn reference_message(&self, hits: &[SearchHit]) -> Option<ChatMessage> {
        let block = self.reference_block(hits);
        if block.is_empty() {
            return None;
        }
        Some(ChatMessage::system(format!("{}{}", REFERENCE_HEADER, block)))
    }
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self::new("text")
    }
}
