use serde_json::{Map, Value};
use std::fmt;

/// Per-request pipeline stage.
///
/// `Failed` and `Done` are terminal; any stage may move to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStage {
    Received,
    HistoryLoaded,
    Retrieving,
    Completing,
    Persisting,
    Done,
    Failed,
}

impl RequestStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestStage::Done | RequestStage::Failed)
    }

    /// Whether `next` is a legal successor of `self`
    pub fn can_advance_to(&self, next: RequestStage) -> bool {
        use RequestStage::*;
        match (self, next) {
            (Done | Failed, _) => false,
            (_, Failed) => true,
            (Received, HistoryLoaded) => true,
            // Stateless requests start without history
            (Received, Retrieving | Completing) => true,
            (HistoryLoaded, Retrieving | Completing) => true,
            (Retrieving, Completing) => true,
            (Completing, Persisting | Done) => true,
            (Persisting, Done) => true,
            _ => false,
        }
    }
}

impl fmt::Display for RequestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RequestStage::Received => "received",
            RequestStage::HistoryLoaded => "history_loaded",
            RequestStage::Retrieving => "retrieving",
            RequestStage::Completing => "completing",
            RequestStage::Persisting => "persisting",
            RequestStage::Done => "done",
            RequestStage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Caller-chosen retrieval options for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievalOptions {
    pub enabled: bool,
    pub collection: String,
    pub top_k: usize,
}

/// Fixed search parameters applied to every vector query
#[derive(Debug, Clone, PartialEq)]
pub struct SearchParams {
    pub metric_type: String,
    pub nprobe: u32,
    pub text_field: String,
}

/// One vector similarity search
#[derive(Debug, Clone, PartialEq)]
pub struct VectorQuery {
    pub collection: String,
    pub metric_type: String,
    pub nprobe: u32,
    pub vectors: Vec<Vec<f32>>,
    pub top_k: usize,
    pub output_fields: Vec<String>,
}

/// Search hit exposing the requested output fields by name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchHit {
    pub fields: Map<String, Value>,
}

impl SearchHit {
    pub fn with_text(field: &str, text: &str) -> Self {
        let mut fields = Map::new();
        fields.insert(field.to_string(), Value::String(text.to_string()));
        Self { fields }
    }

    /// String value of a field, if present and a string
    pub fn text(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }
}
