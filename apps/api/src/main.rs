#[macro_use]
mod macros;

mod auth;
mod config;
mod db;
mod download;
mod errors;
mod extractors;
mod filtering;
mod jobs;
mod lenient;
mod llm_client;
mod matching;
mod models;
mod organization;
mod pagination;
mod registrations;
mod reports;
mod resumes;
mod routes;
mod settings;
mod state;
mod storage;
mod tenants;
mod users;
mod vectors;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::HeaderValue;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::db::{create_pool, run_migrations};
use crate::llm_client::LlmClient;
use crate::routes::build_router;
use crate::settings::secrets::SecretBox;
use crate::state::AppState;
use crate::storage::s3::S3DocumentStore;
use crate::vectors::qdrant::QdrantVectorIndex;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Talentry API v{}", env!("CARGO_PKG_VERSION"));

    let db = create_pool(&config.database_url).await?;
    run_migrations(&db).await?;

    if let Some((email, password)) = &config.bootstrap_admin {
        auth::ensure_platform_admin(&db, email, password)
            .await
            .context("bootstrapping platform admin")?;
    }

    let redis = redis::Client::open(config.redis_url.clone())?;
    info!("Redis client initialized");

    let documents = S3DocumentStore::from_config(&config).await;
    info!("S3 document store initialized (bucket: {})", config.s3_bucket);

    let vectors = QdrantVectorIndex::connect(
        &config.qdrant_url,
        config.qdrant_api_key.clone(),
        &config.qdrant_collection_prefix,
    )?;
    info!("Qdrant client initialized ({})", config.qdrant_url);

    let llm = LlmClient::new(config.llm_timeout_secs)?;
    info!(
        "LLM client initialized (default provider: {}, timeout: {}s)",
        config.llm_default_provider, config.llm_timeout_secs
    );

    let state = AppState {
        db,
        redis,
        documents: Arc::new(documents),
        vectors: Arc::new(vectors),
        llm,
        secrets: SecretBox::new(&config.settings_encryption_key),
        config: config.clone(),
    };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&config.cors_origins));

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Configured origins when given, permissive otherwise.
fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        warn!("CORS_ORIGINS not set; allowing any origin");
        return CorsLayer::permissive();
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin '{origin}'");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any)
}
