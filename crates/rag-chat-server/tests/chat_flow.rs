use anyhow::Result;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use rag_chat_server::config::{EmbeddingConfig, LlmConfig, VectorConfig};
use rag_chat_server::models::chat::{Role, Turn};
use rag_chat_server::services::conversation::{
    ChatError, ConversationManager, RetrievalOptions, SearchParams,
};
use rag_chat_server::services::history::{
    HistoryCache, MemoryHistoryCache, SessionHistoryStore, TurnStore,
};
use rag_chat_server::services::{EmbeddingService, LlmService, VectorSearchService};

#[derive(Default)]
struct InMemoryTurnLog {
    turns: Mutex<HashMap<String, Vec<Turn>>>,
}

#[async_trait::async_trait]
impl TurnStore for InMemoryTurnLog {
    async fn insert_turn(&self, session_id: &str, turn: &Turn) -> Result<()> {
        self.turns
            .lock()
            .entry(session_id.to_string())
            .or_default()
            .push(turn.clone());
        Ok(())
    }

    async fn find_turns_by_session(&self, session_id: &str) -> Result<Vec<Turn>> {
        Ok(self.turns.lock().get(session_id).cloned().unwrap_or_default())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

struct Harness {
    server: MockServer,
    log: Arc<InMemoryTurnLog>,
    cache: Arc<MemoryHistoryCache>,
    manager: ConversationManager,
}

async fn harness() -> Harness {
    let server = MockServer::start().await;
    let log = Arc::new(InMemoryTurnLog::default());
    let cache = Arc::new(MemoryHistoryCache::new());

    let embedding = EmbeddingService::new(EmbeddingConfig {
        base_url: server.uri(),
        dimension: 2,
        batch_size: 32,
        timeout_seconds: 5,
    })
    .unwrap();
    let vector = VectorSearchService::new(VectorConfig {
        base_url: server.uri(),
        database: "base_model".to_string(),
        token: None,
        metric_type: "COSINE".to_string(),
        nprobe: 10,
        anns_field: "embedding".to_string(),
        text_field: "text".to_string(),
        timeout_seconds: 5,
    })
    .unwrap();
    let llm = LlmService::new(LlmConfig {
        base_url: server.uri(),
        api_key: None,
        model: "gpt-3.5-turbo".to_string(),
        timeout_seconds: 5,
        max_tokens: None,
        temperature: None,
    })
    .unwrap();

    let history = SessionHistoryStore::new(log.clone(), cache.clone(), "history:");
    let manager = ConversationManager::new(
        history,
        Box::new(embedding),
        Box::new(vector),
        Box::new(llm),
        SearchParams {
            metric_type: "COSINE".to_string(),
            nprobe: 10,
            text_field: "text".to_string(),
        },
    );

    Harness {
        server,
        log,
        cache,
        manager,
    }
}

fn rag(enabled: bool) -> RetrievalOptions {
    RetrievalOptions {
        enabled,
        collection: "docs".to_string(),
        top_k: 2,
    }
}

#[tokio::test]
async fn test_two_exchanges_accumulate_history() {
    let h = harness().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({
            "messages": [{"role": "user", "content": "Hi"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "Hello"}}]
        })))
        .up_to_n_times(1)
        .mount(&h.server)
        .await;

    let answer = h.manager.respond("s1", "Hi", &rag(false)).await.unwrap();
    assert_eq!(answer, "Hello");

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({
            "messages": [
                {"role": "user", "content": "Hi"},
                {"role": "assistant", "content": "Hello"},
                {"role": "user", "content": "Again"}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "Hello again"}}]
        })))
        .mount(&h.server)
        .await;

    let answer = h.manager.respond("s1", "Again", &rag(false)).await.unwrap();
    assert_eq!(answer, "Hello again");

    let roles: Vec<Role> = h
        .log
        .find_turns_by_session("s1")
        .await
        .unwrap()
        .iter()
        .map(|t| t.role)
        .collect();
    assert_eq!(roles, vec![Role::User, Role::Assistant, Role::User, Role::Assistant]);
    assert_eq!(h.cache.read_list("history:s1").await.unwrap().len(), 4);
}

#[tokio::test]
async fn test_retrieval_reference_reaches_completion() {
    let h = harness().await;

    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .and(body_partial_json(json!({"input": ["Who knows Rust?"]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"embedding": [0.5, 0.5]}]
        })))
        .expect(1)
        .mount(&h.server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v2/vectordb/entities/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "data": [{"text": "A"}, {"distance": 0.1}, {"text": "B"}]
        })))
        .expect(1)
        .mount(&h.server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({
            "messages": [
                {"role": "user", "content": "Who knows Rust?"},
                {"role": "system", "content": "Reference:\nA\nB"}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "A and B"}}]
        })))
        .expect(1)
        .mount(&h.server)
        .await;

    let answer = h
        .manager
        .respond("s2", "Who knows Rust?", &rag(true))
        .await
        .unwrap();

    assert_eq!(answer, "A and B");
    assert_eq!(h.log.find_turns_by_session("s2").await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_vector_outage_still_answers() {
    let h = harness().await;

    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"embedding": [0.5, 0.5]}]
        })))
        .mount(&h.server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v2/vectordb/entities/search"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&h.server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "no context"}}]
        })))
        .mount(&h.server)
        .await;

    let answer = h.manager.respond("s3", "Hi", &rag(true)).await.unwrap();
    assert_eq!(answer, "no context");
}

#[tokio::test]
async fn test_completion_outage_leaves_no_trace() {
    let h = harness().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal"))
        .mount(&h.server)
        .await;

    let result = h.manager.respond("s4", "Hi", &rag(false)).await;

    assert_eq!(result, Err(ChatError::RequestFailed));
    assert!(h.log.find_turns_by_session("s4").await.unwrap().is_empty());
    assert!(!h.cache.exists("history:s4").await.unwrap());
}
