//! Ingest Endpoints
//!
//! POST /api/v1/ingest accepts a multipart upload of one or more CSV files,
//! loads each into Postgres, and launches a detached pipeline run over the
//! loaded tables. The response returns immediately with the run id; progress
//! is polled via GET /api/v1/ingest/{run_id}/status.

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sift_core::{IngestMode, RunId};
use sift_ingest::Ingestor;
use sift_pipeline::PipelineOrchestrator;
use uuid::Uuid;

use crate::constants::ANONYMOUS_USER;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

// ============================================================================
// RESPONSE TYPES
// ============================================================================

/// Response for POST /ingest: the run is launched, not finished.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestStartedResponse {
    pub status: String,
    pub run_id: RunId,
    /// Final table names, in upload order (create mode may suffix them).
    pub tables: Vec<String>,
}

// ============================================================================
// HANDLERS
// ============================================================================

/// POST /ingest - Load uploaded CSV files and launch a pipeline run.
///
/// Multipart fields:
/// - `file` (repeated): CSV payloads, table name derived from the file name
/// - `mode` (optional): create | replace | append, default create
/// - `table_name` (optional): target table for replace/append; replace
///   takes exactly one file when this is set
/// - `user` (optional): attributed loader, default "anonymous"
pub async fn start_ingest(
    State(ingestor): State<Ingestor>,
    State(orchestrator): State<PipelineOrchestrator>,
    mut multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    let mut mode: Option<String> = None;
    let mut table_name: Option<String> = None;
    let mut user: Option<String> = None;
    let mut files: Vec<(String, Vec<u8>)> = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::invalid_input(format!("Malformed multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "mode" => mode = Some(read_text(field).await?),
            "table_name" => table_name = Some(read_text(field).await?),
            "user" => user = Some(read_text(field).await?),
            "file" => {
                let file_name = field.file_name().unwrap_or("upload.csv").to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| {
                        ApiError::invalid_input(format!("Failed to read upload '{}': {}", file_name, e))
                    })?
                    .to_vec();
                files.push((file_name, data));
            }
            other => tracing::debug!(field = other, "Ignoring unknown multipart field"),
        }
    }

    let mode: IngestMode = mode.as_deref().unwrap_or("create").parse()?;
    if files.is_empty() {
        return Err(ApiError::missing_field("file"));
    }
    // Each replace load drops and recreates its target, so a second file
    // aimed at the same table would silently erase the first. Rejected
    // before anything is loaded.
    if mode == IngestMode::Replace && table_name.is_some() && files.len() > 1 {
        return Err(ApiError::validation_failed(
            "Replace mode with an explicit table_name accepts a single file; \
             each file replaces the whole table",
        ));
    }

    let loaded_by = user.as_deref().unwrap_or(ANONYMOUS_USER);
    tracing::info!(%mode, files = files.len(), loaded_by, "Ingest upload received");

    let mut tables = Vec::with_capacity(files.len());
    for (file_name, data) in &files {
        let loaded = ingestor
            .ingest_file(file_name, data, mode, table_name.as_deref(), loaded_by)
            .await?;
        tracing::info!(
            table = %loaded.table_name,
            rows = loaded.row_count,
            "File loaded"
        );
        tables.push(loaded.table_name);
    }

    // Detached: the response returns 202 while the stages run in the background
    let run_id = orchestrator.launch_run(tables.clone()).detach();

    let response = IngestStartedResponse {
        status: "started".to_string(),
        run_id,
        tables,
    };
    Ok((StatusCode::ACCEPTED, Json(response)))
}

/// GET /ingest/{run_id}/status - Snapshot of every stage of the run.
pub async fn run_status(
    State(orchestrator): State<PipelineOrchestrator>,
    Path(run_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let run_id = Uuid::parse_str(run_id.trim())?;
    let snapshot = orchestrator.registry().get_status(run_id)?;
    Ok(Json(snapshot))
}

async fn read_text(field: axum::extract::multipart::Field<'_>) -> ApiResult<String> {
    field
        .text()
        .await
        .map_err(|e| ApiError::invalid_input(format!("Malformed multipart field: {}", e)))
}

// ============================================================================
// ROUTER
// ============================================================================

/// Create the ingest router.
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/", post(start_ingest))
        .route("/:run_id/status", get(run_status))
}
