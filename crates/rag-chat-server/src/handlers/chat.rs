use crate::config::ChatConfig;
use crate::models::chat::{ChatRequest, ChatResponse, StatelessChatRequest};
use crate::services::conversation::{ConversationManager, RetrievalOptions};
use crate::utils::error::ApiError;
use axum::{extract::State, Json};
use std::sync::Arc;
use tracing::info;

fn retrieval_options(
    chat: &ChatConfig,
    use_rag: bool,
    collection: Option<String>,
    top_k: Option<usize>,
) -> RetrievalOptions {
    RetrievalOptions {
        enabled: use_rag,
        collection: collection.unwrap_or_else(|| chat.default_collection.clone()),
        top_k: top_k.unwrap_or(chat.default_top_k),
    }
}

/// Session-scoped chat
pub async fn chat_handler(
    State(manager): State<Arc<ConversationManager>>,
    State(chat): State<ChatConfig>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    info!(
        "Chat request: session={}, message_len={}, use_rag={}",
        request.session_id,
        request.message.len(),
        request.use_rag
    );

    let retrieval = retrieval_options(&chat, request.use_rag, request.collection, request.top_k);
    let answer = manager
        .respond(&request.session_id, &request.message, &retrieval)
        .await?;

    Ok(Json(ChatResponse { answer }))
}

/// Stateless chat over a caller-supplied conversation
pub async fn chat_test_handler(
    State(manager): State<Arc<ConversationManager>>,
    State(chat): State<ChatConfig>,
    Json(request): Json<StatelessChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    info!(
        "Stateless chat request: messages={}, use_rag={}",
        request.messages.len(),
        request.use_rag
    );

    let retrieval = retrieval_options(&chat, request.use_rag, request.collection, request.top_k);
    let answer = manager
        .respond_stateless(request.messages, &retrieval)
        .await?;

    Ok(Json(ChatResponse { answer }))
}
