/// manager.rs
use anyhow::{Context, Result};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::models::chat::{ChatMessage, Role, Turn};
use crate::services::history::SessionHistoryStore;
use crate::utils::error::CHAT_REQUEST_ERROR;

use super::context_builder::ContextBuilder;
use super::types::{RequestStage, RetrievalOptions, SearchHit, SearchParams, VectorQuery};

/// Trait for embedding service
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// One vector per input text, in input order
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Trait for vector search service
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait RetrievalProvider: Send + Sync {
    /// Ranked hits per query vector.
    /// Infallible by contract: implementations log failures and return empty.
    async fn search(&self, query: &VectorQuery) -> Vec<Vec<SearchHit>>;
}

/// Trait for LLM service
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    /// Generated candidates, best first
    async fn complete(&self, messages: &[ChatMessage]) -> Result<Vec<String>>;
}

/// What callers see when a chat request does not succeed
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ChatError {
    #[error("Invalid chat request: {0}")]
    InvalidRequest(String),

    /// Opaque on purpose; the cause is logged, never returned
    #[error("Chat request failed")]
    RequestFailed,
}

/// Stage bookkeeping for one request
struct RequestTrace<'a> {
    session_id: &'a str,
    stage: RequestStage,
    started: Instant,
}

impl<'a> RequestTrace<'a> {
    fn new(session_id: &'a str) -> Self {
        Self {
            session_id,
            stage: RequestStage::Received,
            started: Instant::now(),
        }
    }

    fn advance(&mut self, next: RequestStage) {
        debug_assert!(
            self.stage.can_advance_to(next),
            "illegal stage transition {} -> {}",
            self.stage,
            next
        );
        debug!("Session {}: {} -> {}", self.session_id, self.stage, next);
        self.stage = next;
    }

    fn fail(&mut self, err: anyhow::Error) -> ChatError {
        debug_assert!(!self.stage.is_terminal(), "request already {}", self.stage);
        error!(
            "{} (session={}, stage={}): {:#}",
            CHAT_REQUEST_ERROR, self.session_id, self.stage, err
        );
        self.stage = RequestStage::Failed;
        ChatError::RequestFailed
    }
}

pub struct ConversationManager {
    history: SessionHistoryStore,
    context_builder: ContextBuilder,
    embedding_provider: Box<dyn EmbeddingProvider>,
    retrieval_provider: Box<dyn RetrievalProvider>,
    llm_provider: Box<dyn LlmProvider>,
    search_params: SearchParams,
}

impl ConversationManager {
    pub fn new(
        history: SessionHistoryStore,
        embedding_provider: Box<dyn EmbeddingProvider>,
        retrieval_provider: Box<dyn RetrievalProvider>,
        llm_provider: Box<dyn LlmProvider>,
        search_params: SearchParams,
    ) -> Self {
        Self {
            history,
            context_builder: ContextBuilder::new(search_params.text_field.clone()),
            embedding_provider,
            retrieval_provider,
            llm_provider,
            search_params,
        }
    }

    pub fn history(&self) -> &SessionHistoryStore {
        &self.history
    }

    /// Session-scoped chat: load history, optionally augment, complete,
    /// then commit the user/assistant pair.
    pub async fn respond(
        &self,
        session_id: &str,
        user_message: &str,
        retrieval: &RetrievalOptions,
    ) -> Result<String, ChatError> {
        if session_id.trim().is_empty() {
            warn!("Rejected chat request without session_id");
            return Err(ChatError::InvalidRequest("session_id must not be empty".to_string()));
        }

        let mut trace = RequestTrace::new(session_id);

        match self.run_session_chat(&mut trace, user_message, retrieval).await {
            Ok(answer) => {
                trace.advance(RequestStage::Done);
                info!(
                    "Chat completed: session={}, rag={}, answer_len={}, elapsed={}ms",
                    session_id,
                    retrieval.enabled,
                    answer.len(),
                    trace.started.elapsed().as_millis()
                );
                Ok(answer)
            }
            Err(e) => Err(trace.fail(e)),
        }
    }

    /// Chat over a caller-supplied conversation. Never touches history.
    pub async fn respond_stateless(
        &self,
        messages: Vec<ChatMessage>,
        retrieval: &RetrievalOptions,
    ) -> Result<String, ChatError> {
        if retrieval.enabled && messages.is_empty() {
            warn!("Rejected stateless retrieval request without messages");
            return Err(ChatError::InvalidRequest(
                "messages must not be empty when retrieval is requested".to_string(),
            ));
        }

        let mut trace = RequestTrace::new("-");

        match self.run_stateless_chat(&mut trace, messages, retrieval).await {
            Ok(answer) => {
                trace.advance(RequestStage::Done);
                info!(
                    "Stateless chat completed: rag={}, answer_len={}, elapsed={}ms",
                    retrieval.enabled,
                    answer.len(),
                    trace.started.elapsed().as_millis()
                );
                Ok(answer)
            }
            Err(e) => Err(trace.fail(e)),
        }
    }

    async fn run_session_chat(
        &self,
        trace: &mut RequestTrace<'_>,
        user_message: &str,
        retrieval: &RetrievalOptions,
    ) -> Result<String> {
        let session_id = trace.session_id;

        let history = self.history.read(session_id).await?;
        trace.advance(RequestStage::HistoryLoaded);

        let mut messages: Vec<ChatMessage> = history.iter().map(Turn::to_message).collect();
        messages.push(ChatMessage::user(user_message));

        if retrieval.enabled {
            trace.advance(RequestStage::Retrieving);
            self.augment(&mut messages, user_message, retrieval).await?;
        }

        trace.advance(RequestStage::Completing);
        let answer = self.complete(&messages).await?;

        trace.advance(RequestStage::Persisting);
        self.history
            .append(session_id, Role::User, user_message)
            .await
            .context("Failed to persist user turn")?;
        self.history
            .append(session_id, Role::Assistant, &answer)
            .await
            .context("Failed to persist assistant turn")?;

        Ok(answer)
    }

    async fn run_stateless_chat(
        &self,
        trace: &mut RequestTrace<'_>,
        mut messages: Vec<ChatMessage>,
        retrieval: &RetrievalOptions,
    ) -> Result<String> {
        if retrieval.enabled {
            if let Some(query) = messages.last().map(|m| m.content.clone()) {
                trace.advance(RequestStage::Retrieving);
                self.augment(&mut messages, &query, retrieval).await?;
            }
        }

        trace.advance(RequestStage::Completing);
        self.complete(&messages).await
    }

    /// Embed the query, search, and append a reference turn if anything matched
    async fn augment(
        &self,
        messages: &mut Vec<ChatMessage>,
        query: &str,
        retrieval: &RetrievalOptions,
    ) -> Result<()> {
        let vectors = self
            .embedding_provider
            .embed_batch(&[query.to_string()])
            .await
            .context("Failed to embed query")?;

        if vectors.is_empty() {
            anyhow::bail!("Embedding service returned no vectors");
        }

        let search = VectorQuery {
            collection: retrieval.collection.clone(),
            metric_type: self.search_params.metric_type.clone(),
            nprobe: self.search_params.nprobe,
            vectors,
            top_k: retrieval.top_k,
            output_fields: vec![self.search_params.text_field.clone()],
        };

        let hits = self
            .retrieval_provider
            .search(&search)
            .await
            .into_iter()
            .next()
            .unwrap_or_default();

        match self.context_builder.reference_message(&hits) {
            Some(reference) => {
                debug!(
                    "Adding reference from {} hits in collection {}",
                    hits.len(),
                    retrieval.collection
                );
                messages.push(reference);
            }
            None => debug!("No reference text found in collection {}", retrieval.collection),
        }

        Ok(())
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let candidates = self
            .llm_provider
            .complete(messages)
            .await
            .context("Completion request failed")?;

        candidates
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("No choices returned from LLM"))
    }
}
