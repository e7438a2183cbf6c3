use axum::extract::FromRef;
use std::sync::Arc;

use crate::config::ChatConfig;
use crate::services::conversation::ConversationManager;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub conversation_manager: Arc<ConversationManager>,
    pub chat: ChatConfig,
}

impl FromRef<AppState> for Arc<ConversationManager> {
    fn from_ref(state: &AppState) -> Self {
        state.conversation_manager.clone()
    }
}

impl FromRef<AppState> for ChatConfig {
    fn from_ref(state: &AppState) -> Self {
        state.chat.clone()
    }
}
