use std::sync::Arc;

use redis::Client as RedisClient;
use sqlx::PgPool;

use crate::config::Config;
use crate::llm_client::LlmClient;
use crate::settings::secrets::SecretBox;
use crate::storage::DocumentStore;
use crate::vectors::VectorIndex;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    /// Backs the login rate limiter.
    pub redis: RedisClient,
    pub documents: Arc<dyn DocumentStore>,
    pub vectors: Arc<dyn VectorIndex>,
    pub llm: LlmClient,
    pub secrets: SecretBox,
    pub config: Config,
}

#[cfg(test)]
impl AppState {
    /// In-memory stores and a lazy pool; nothing connects until a query runs.
    pub fn for_tests() -> Self {
        use crate::storage::memory::MemoryDocumentStore;
        use crate::vectors::memory::MemoryVectorIndex;

        let config = Config::for_tests();
        AppState {
            db: sqlx::postgres::PgPoolOptions::new()
                .connect_lazy(&config.database_url)
                .expect("lazy pool"),
            redis: RedisClient::open(config.redis_url.as_str()).expect("redis url"),
            documents: Arc::new(MemoryDocumentStore::default()),
            vectors: Arc::new(MemoryVectorIndex::default()),
            llm: LlmClient::new(config.llm_timeout_secs).expect("llm client"),
            secrets: SecretBox::new(&config.settings_encryption_key),
            config,
        }
    }
}
