use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

use rag_chat_server::config::{CacheBackend, Settings};
use rag_chat_server::database::{DbPool, Repository};
use rag_chat_server::handlers::build_router;
use rag_chat_server::services::conversation::{ConversationManager, SearchParams};
use rag_chat_server::services::history::{
    HistoryCache, MemoryHistoryCache, RedisHistoryCache, SessionHistoryStore,
};
use rag_chat_server::services::{EmbeddingService, LlmService, VectorSearchService};
use rag_chat_server::state::AppState;
use rag_chat_server::utils::logger::init_logger;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let settings = Settings::load()?;
    init_logger(&settings.logging)?;

    info!("🚀 Starting RAG Chat Server...");
    info!("✅ Configuration loaded");

    // Durable turn log
    let db_pool = DbPool::new(&settings.database).await?;
    db_pool.migrate().await?;
    info!("✅ Database connection established");
    let repository = Arc::new(Repository::new(db_pool));

    // Cache tier
    let cache: Arc<dyn HistoryCache> = match settings.cache.backend {
        CacheBackend::Redis => {
            let cache = RedisHistoryCache::connect(&settings.cache.redis_url).await?;
            info!("✅ Redis history cache connected");
            Arc::new(cache)
        }
        CacheBackend::Memory => Arc::new(MemoryHistoryCache::new()),
    };

    let history = SessionHistoryStore::new(repository, cache, settings.cache.key_prefix.clone());

    // External collaborators
    let embedding_service = EmbeddingService::new(settings.embedding.clone())?;
    let vector_service = VectorSearchService::new(settings.vector.clone())?;
    let llm_service = LlmService::new(settings.llm.clone())?;

    let conversation_manager = Arc::new(ConversationManager::new(
        history,
        Box::new(embedding_service),
        Box::new(vector_service),
        Box::new(llm_service),
        SearchParams {
            metric_type: settings.vector.metric_type.clone(),
            nprobe: settings.vector.nprobe,
            text_field: settings.vector.text_field.clone(),
        },
    ));

    let app = build_router(AppState {
        conversation_manager,
        chat: settings.chat.clone(),
    });

    let addr = SocketAddr::from((
        settings.server.host.parse::<std::net::IpAddr>()?,
        settings.server.port,
    ));

    info!("🎯 Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
