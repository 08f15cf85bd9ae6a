//! Ad-hoc Query Endpoint
//!
//! POST /api/v1/query turns a natural-language question into SQL grounded in
//! the column catalog and executes it. SQL generation failures surface as a
//! 200 with an `error` field in the outcome, matching the runner's contract;
//! provider and catalog failures are real HTTP errors.

use axum::{extract::State, response::IntoResponse, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use sift_agents::QueryRunner;

use crate::constants::ANONYMOUS_USER;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

// ============================================================================
// REQUEST TYPES
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub question: String,
    /// Who asked, for the audit log only.
    #[serde(default)]
    pub user: Option<String>,
}

// ============================================================================
// HANDLERS
// ============================================================================

/// POST /query - Answer a natural-language question against the loaded data.
pub async fn run_query(
    State(runner): State<QueryRunner>,
    Json(request): Json<QueryRequest>,
) -> ApiResult<impl IntoResponse> {
    let question = request.question.trim();
    if question.is_empty() {
        return Err(ApiError::missing_field("question"));
    }

    tracing::info!(
        user = request.user.as_deref().unwrap_or(ANONYMOUS_USER),
        question,
        "Query received"
    );

    let outcome = runner.answer(question).await?;
    Ok(Json(outcome))
}

// ============================================================================
// ROUTER
// ============================================================================

/// Create the query router.
pub fn create_router() -> Router<AppState> {
    Router::new().route("/", post(run_query))
}
