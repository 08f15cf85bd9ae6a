//! Sift API - REST API Layer
//!
//! This crate exposes the Sift pipeline over HTTP (Axum): multipart CSV
//! ingestion that launches background runs, run status polling, the metric
//! catalog with on-demand execution, ad-hoc natural-language querying, and
//! Kubernetes-compatible health checks.
//!
//! All state is injected through [`AppState`]; the binary in `main.rs` wires
//! the store, orchestrator, and chat provider together and spawns the
//! registry sweeper next to the server.

pub mod config;
pub mod constants;
pub mod error;
pub mod jobs;
mod macros;
pub mod routes;
pub mod state;
pub mod telemetry;

// Re-export commonly used types
pub use config::ApiConfig;
pub use error::{ApiError, ApiResult, ErrorCode};
pub use routes::create_api_router;
pub use state::AppState;
