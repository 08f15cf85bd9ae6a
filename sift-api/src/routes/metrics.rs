//! Metric Endpoints
//!
//! Read side of the catalog: list the metrics the analyst stage synthesized,
//! fetch one by id, or execute one and return its rows for charting.

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sift_core::{Metric, VizHint};
use sift_store::Store;

use crate::error::ApiResult;
use crate::state::AppState;

// ============================================================================
// RESPONSE TYPES
// ============================================================================

/// Response for GET /metrics/{id}/result: the metric's rows plus enough
/// context to render them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricResultResponse {
    pub metric_name: String,
    pub viz_hint: VizHint,
    pub data: Vec<JsonValue>,
}

// ============================================================================
// HANDLERS
// ============================================================================

/// GET /metrics - Every stored metric definition.
pub async fn list_metrics(State(store): State<Store>) -> ApiResult<impl IntoResponse> {
    let metrics: Vec<Metric> = store.list_metrics().await?;
    Ok(Json(metrics))
}

/// GET /metrics/{id} - One metric definition by id.
pub async fn get_metric(
    State(store): State<Store>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let metric = store.get_metric(id).await?;
    Ok(Json(metric))
}

/// GET /metrics/{id}/result - Execute the metric's SQL and return its rows.
pub async fn metric_result(
    State(store): State<Store>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let metric = store.get_metric(id).await?;
    let data = store.execute_sql(&metric.sql_definition).await?;

    let response = MetricResultResponse {
        metric_name: metric.metric_name,
        viz_hint: metric.viz_hint,
        data,
    };
    Ok(Json(response))
}

// ============================================================================
// ROUTER
// ============================================================================

/// Create the metrics router.
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_metrics))
        .route("/:id", get(get_metric))
        .route("/:id/result", get(metric_result))
}
