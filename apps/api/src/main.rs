mod automation;
mod config;
mod db;
mod errors;
mod generation;
mod job_board;
mod llm_client;
mod models;
mod routes;
mod state;
mod store;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::automation::AutomationMonitor;
use crate::config::{Config, StoreBackend};
use crate::db::create_pool;
use crate::generation::match_scorer::LlmMatchScorer;
use crate::llm_client::build_backend;
use crate::routes::build_router;
use crate::state::AppState;
use crate::store::{MemoryStore, PgStore, Store};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting JobPilot API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize the store
    let store: Arc<dyn Store> = match &config.store {
        StoreBackend::Postgres { database_url } => {
            Arc::new(PgStore::new(create_pool(database_url).await?))
        }
        StoreBackend::Memory => {
            warn!("Using in-memory store; nothing survives a restart");
            Arc::new(MemoryStore::new())
        }
    };

    // Initialize LLM backend and match scorer
    let llm = build_backend(&config);
    info!("LLM backend initialized (provider: {})", llm.provider_name());
    let scorer = Arc::new(LlmMatchScorer::new(Arc::clone(&llm)));

    // Build app state
    let state = AppState {
        store,
        llm,
        scorer,
        monitor: AutomationMonitor::new(),
        config: config.clone(),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict origins once the web client has a fixed host

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
