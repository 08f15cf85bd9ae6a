//! REST API Routes Module
//!
//! This module contains all route handlers:
//! - Ingest upload and run status under /api/v1/ingest
//! - Metric catalog and execution under /api/v1/metrics
//! - Ad-hoc querying under /api/v1/query
//! - Health check endpoints (Kubernetes-compatible) under /health
//! - CORS support for browser-based clients

pub mod health;
pub mod ingest;
pub mod metrics;
pub mod query;

use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ApiConfig;
use crate::state::AppState;

// Re-export route creation functions for convenience
pub use health::create_router as health_router;
pub use ingest::create_router as ingest_router;
pub use metrics::create_router as metrics_router;
pub use query::create_router as query_router;

// ============================================================================
// ROUTER ASSEMBLY
// ============================================================================

/// Create the complete API router.
///
/// Routes:
/// - POST /api/v1/ingest, GET /api/v1/ingest/{run_id}/status
/// - GET  /api/v1/metrics, /api/v1/metrics/{id}, /api/v1/metrics/{id}/result
/// - POST /api/v1/query
/// - GET  /health/ping, /health/live, /health/ready (public)
///
/// # Middleware Order (outer to inner)
/// 1. CORS (outermost) - handles preflight requests
/// 2. Tracing - one span per request
/// 3. Body limit - caps multipart uploads
pub fn create_api_router(state: AppState, config: &ApiConfig) -> Router {
    let api_routes = Router::new()
        .nest("/ingest", ingest::create_router())
        .nest("/metrics", metrics::create_router())
        .nest("/query", query::create_router())
        .with_state(state.clone());

    let cors = build_cors_layer(config);

    Router::new()
        .nest("/api/v1", api_routes)
        // Health checks (no auth required)
        .nest(
            "/health",
            health::create_router(state.store.clone(), state.start_time),
        )
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

// ============================================================================
// CORS LAYER
// ============================================================================

/// Build the CORS layer from ApiConfig.
///
/// In development mode (empty origins), allows all origins.
/// In production mode, only allows configured origins.
fn build_cors_layer(config: &ApiConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .max_age(Duration::from_secs(config.cors_max_age_secs));

    if !config.is_production() {
        // Development mode: allow all origins
        tracing::info!("CORS: Development mode - allowing all origins");
        return cors.allow_origin(Any).allow_headers(Any);
    }

    // Production mode: only allow configured origins
    tracing::info!(
        "CORS: Production mode - allowing origins: {:?}",
        config.cors_origins
    );
    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();

    if config.cors_allow_credentials {
        cors.allow_origin(origins).allow_credentials(true)
    } else {
        cors.allow_origin(origins)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cors_layer_builds_for_both_modes() {
        let dev = ApiConfig::default();
        let _ = build_cors_layer(&dev);

        let mut prod = ApiConfig::default();
        prod.cors_origins = vec!["https://sift.example.com".to_string()];
        prod.cors_allow_credentials = true;
        let _ = build_cors_layer(&prod);
    }
}
