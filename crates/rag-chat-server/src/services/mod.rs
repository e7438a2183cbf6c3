pub mod conversation;
pub mod embedding_service;
pub mod history;
pub mod llm_service;
pub mod vector_service;

pub use embedding_service::EmbeddingService;
pub use llm_service::LlmService;
pub use vector_service::VectorSearchService;
