//! Sift API Server Entry Point
//!
//! Bootstraps the store, pipeline, and chat provider, then starts the Axum
//! HTTP server with the registry sweeper running alongside it.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use sift_agents::{standard_stage_set, QueryRunner};
use sift_api::jobs::{registry_sweeper_task, RegistrySweeperConfig};
use sift_api::telemetry::init_tracing;
use sift_api::{create_api_router, ApiConfig, ApiError, ApiResult, AppState};
use sift_ingest::Ingestor;
use sift_llm::{ChatProvider, OpenAiChat};
use sift_pipeline::{PipelineLimiter, PipelineOrchestrator, RunRegistry};
use sift_store::{Store, StoreConfig};
use tokio::sync::watch;

#[tokio::main]
async fn main() -> ApiResult<()> {
    init_tracing()?;

    let store_config = StoreConfig::from_env();
    let store = Store::from_config(&store_config)?;
    // Catalog tables must exist before anything else runs
    store.ensure_schema().await?;

    let api_config = ApiConfig::from_env();

    let chat: Arc<dyn ChatProvider> = Arc::new(OpenAiChat::from_env()?);
    let stages = Arc::new(standard_stage_set(&store, &chat));

    let registry = Arc::new(RunRegistry::new());
    let limiter = PipelineLimiter::new(api_config.pipeline_capacity);
    let orchestrator = PipelineOrchestrator::new(registry.clone(), limiter, stages);

    let state = AppState::new(
        store.clone(),
        Ingestor::new(store.clone()),
        orchestrator,
        QueryRunner::new(store, chat),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = tokio::spawn(registry_sweeper_task(
        registry,
        RegistrySweeperConfig::from_env(),
        shutdown_rx,
    ));

    let app: Router = create_api_router(state, &api_config);

    let addr = resolve_bind_addr()?;
    tracing::info!(%addr, "Starting Sift API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    let server = axum::serve(listener, app);
    tokio::select! {
        result = server => {
            result.map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    let _ = shutdown_tx.send(true);
    let _ = sweeper.await;
    Ok(())
}

fn resolve_bind_addr() -> ApiResult<SocketAddr> {
    let host = std::env::var("SIFT_API_BIND").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port_str = std::env::var("PORT")
        .ok()
        .or_else(|| std::env::var("SIFT_API_PORT").ok())
        .unwrap_or_else(|| "8000".to_string());
    let port = port_str
        .parse::<u16>()
        .map_err(|_| ApiError::invalid_input(format!("Invalid port value: {}", port_str)))?;

    let addr = format!("{}:{}", host, port);
    addr.parse::<SocketAddr>()
        .map_err(|e| ApiError::invalid_input(format!("Invalid bind address {}: {}", addr, e)))
}
