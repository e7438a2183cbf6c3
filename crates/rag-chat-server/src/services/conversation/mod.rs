//! Conversation orchestration
//!
//! Composes session history, optional retrieved reference text and the new
//! user turn into a completion request, then commits the exchange.

mod context_builder;
pub mod manager;
pub mod types;

pub use context_builder::ContextBuilder;
pub use manager::{ChatError, ConversationManager, EmbeddingProvider, LlmProvider, RetrievalProvider};
pub use types::{RequestStage, RetrievalOptions, SearchHit, SearchParams, VectorQuery};
