//! Error types for the Sift API.
//!
//! Every handler returns [`ApiResult`], and every failure is serialized as a
//! flat JSON envelope `{ code, message, details? }` with the HTTP status taken
//! from the [`ErrorCode`]. Conversions from the domain error enums live here
//! so handlers can use `?` on store, ingest, registry, and provider calls.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use sift_core::{IngestError, LlmError, RegistryError, SiftError, StageError, StoreError};
use std::fmt;

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

/// Error codes for API responses.
///
/// Each code maps to one HTTP status and names a category of failure a client
/// can act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ========================================================================
    // Validation Errors (400)
    // ========================================================================
    /// Request validation failed (bad upload, bad mode, column mismatch)
    ValidationFailed,

    /// Request contains invalid input data (malformed ids, bad JSON)
    InvalidInput,

    /// Required field is missing from request
    MissingField,

    // ========================================================================
    // Not Found Errors (404)
    // ========================================================================
    /// Requested pipeline run does not exist
    RunNotFound,

    /// Requested table is not part of the run
    TableNotFound,

    /// Requested metric does not exist
    MetricNotFound,

    // ========================================================================
    // Upstream Errors (429, 502)
    // ========================================================================
    /// Chat provider rejected the request for rate limiting
    TooManyRequests,

    /// Chat provider request failed or returned garbage
    ProviderError,

    // ========================================================================
    // Server Errors (500, 503)
    // ========================================================================
    /// Internal server error
    InternalError,

    /// Database operation failed
    DatabaseError,

    /// Service is temporarily unavailable
    ServiceUnavailable,

    /// Database connection pool exhausted
    ConnectionPoolExhausted,
}

impl ErrorCode {
    /// Get the HTTP status code for this error code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            // Validation errors
            ErrorCode::ValidationFailed
            | ErrorCode::InvalidInput
            | ErrorCode::MissingField => StatusCode::BAD_REQUEST,

            // Not found errors
            ErrorCode::RunNotFound
            | ErrorCode::TableNotFound
            | ErrorCode::MetricNotFound => StatusCode::NOT_FOUND,

            // Upstream errors
            ErrorCode::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            ErrorCode::ProviderError => StatusCode::BAD_GATEWAY,

            // Server errors
            ErrorCode::ServiceUnavailable
            | ErrorCode::ConnectionPoolExhausted => StatusCode::SERVICE_UNAVAILABLE,

            ErrorCode::InternalError
            | ErrorCode::DatabaseError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get a default message for this error code.
    pub fn default_message(&self) -> &'static str {
        match self {
            // Validation
            ErrorCode::ValidationFailed => "Request validation failed",
            ErrorCode::InvalidInput => "Invalid input data",
            ErrorCode::MissingField => "Required field is missing",

            // Not Found
            ErrorCode::RunNotFound => "Run not found",
            ErrorCode::TableNotFound => "Table not found",
            ErrorCode::MetricNotFound => "Metric not found",

            // Upstream
            ErrorCode::TooManyRequests => "Rate limit exceeded",
            ErrorCode::ProviderError => "Chat provider request failed",

            // Server
            ErrorCode::InternalError => "Internal server error",
            ErrorCode::DatabaseError => "Database operation failed",
            ErrorCode::ServiceUnavailable => "Service temporarily unavailable",
            ErrorCode::ConnectionPoolExhausted => "Connection pool exhausted",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// API ERROR STRUCT
// ============================================================================

/// Structured error response for API operations.
///
/// This type is returned by all API endpoints when an error occurs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    /// Error code categorizing the error
    pub code: ErrorCode,

    /// Human-readable error message
    pub message: String,

    /// Optional additional details (field errors, column lists, etc.)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Create a new API error with the given code, using the default message.
    pub fn from_code(code: ErrorCode) -> Self {
        Self {
            code,
            message: code.default_message().to_string(),
            details: None,
        }
    }

    /// Add additional details to the error.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    // ========================================================================
    // Convenience constructors for common errors
    // ========================================================================

    /// Create a ValidationFailed error.
    pub fn validation_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationFailed, message)
    }

    /// Create an InvalidInput error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    /// Create a MissingField error.
    pub fn missing_field(field: &str) -> Self {
        Self::new(
            ErrorCode::MissingField,
            format!("Required field '{}' is missing", field),
        )
    }

    /// Create a RunNotFound error.
    pub fn run_not_found(run_id: impl fmt::Display) -> Self {
        Self::new(ErrorCode::RunNotFound, format!("Run {} not found", run_id))
    }

    /// Create a TableNotFound error.
    pub fn table_not_found(run_id: impl fmt::Display, table: &str) -> Self {
        Self::new(
            ErrorCode::TableNotFound,
            format!("Table '{}' is not part of run {}", table, run_id),
        )
    }

    /// Create a MetricNotFound error.
    pub fn metric_not_found(id: i64) -> Self {
        Self::new(ErrorCode::MetricNotFound, format!("Metric {} not found", id))
    }

    /// Create a TooManyRequests error.
    pub fn too_many_requests(retry_after_ms: Option<i64>) -> Self {
        let message = match retry_after_ms {
            Some(ms) => format!("Rate limit exceeded. Retry after {} ms", ms),
            None => "Rate limit exceeded".to_string(),
        };
        Self::new(ErrorCode::TooManyRequests, message)
    }

    /// Create a ProviderError.
    pub fn provider_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ProviderError, message)
    }

    /// Create an InternalError.
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// Create a DatabaseError.
    pub fn database_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseError, message)
    }

    /// Create a ServiceUnavailable error.
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ServiceUnavailable, message)
    }

    /// Create a ConnectionPoolExhausted error.
    pub fn connection_pool_exhausted() -> Self {
        Self::from_code(ErrorCode::ConnectionPoolExhausted)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

// ============================================================================
// AXUM INTEGRATION
// ============================================================================

/// Implement IntoResponse for ApiError to enable automatic error handling in Axum.
///
/// This allows ApiError to be returned directly from Axum handlers:
/// ```ignore
/// async fn handler() -> Result<Json<Response>, ApiError> {
///     Err(ApiError::missing_field("question"))
/// }
/// ```
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(self);
        (status, body).into_response()
    }
}

// ============================================================================
// CONVERSIONS FROM DOMAIN ERRORS
// ============================================================================

/// Convert from StoreError to ApiError.
impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::MetricNotFound { id } => ApiError::metric_not_found(id),
            StoreError::PoolUnavailable { reason } => {
                tracing::error!(%reason, "Connection pool error");
                ApiError::connection_pool_exhausted()
            }
            other => {
                // Log the full error and return a generic message to the client
                tracing::error!(error = %other, "Database error");
                ApiError::database_error("Database operation failed")
            }
        }
    }
}

/// Convert from IngestError to ApiError.
///
/// Everything an upload can get wrong is the client's fault, so these map to
/// 400 except for the wrapped store errors.
impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::Store(inner) => ApiError::from(inner),
            IngestError::ColumnMismatch {
                table,
                expected,
                got,
            } => ApiError::new(
                ErrorCode::ValidationFailed,
                format!("Uploaded columns do not match table '{}'", table),
            )
            .with_details(serde_json::json!({
                "table": table,
                "expected": expected,
                "got": got,
            })),
            other => ApiError::validation_failed(other.to_string()),
        }
    }
}

/// Convert from LlmError to ApiError.
impl From<LlmError> for ApiError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::ProviderNotConfigured => {
                ApiError::service_unavailable("No chat provider is configured")
            }
            LlmError::RateLimited {
                provider,
                retry_after_ms,
            } => {
                tracing::warn!(%provider, retry_after_ms, "Provider rate limited");
                ApiError::too_many_requests(Some(retry_after_ms))
            }
            other => {
                tracing::error!(error = %other, "Provider error");
                ApiError::from_code(ErrorCode::ProviderError)
            }
        }
    }
}

/// Convert from RegistryError to ApiError.
impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::UnknownRun { run_id } => ApiError::run_not_found(run_id),
            RegistryError::UnknownTable { run_id, table } => {
                ApiError::table_not_found(run_id, &table)
            }
            other => {
                // Transition errors are pipeline bugs, not client mistakes
                tracing::error!(error = %other, "Registry error");
                ApiError::internal_error(other.to_string())
            }
        }
    }
}

/// Convert from StageError to ApiError.
impl From<StageError> for ApiError {
    fn from(err: StageError) -> Self {
        match err {
            StageError::Store(inner) => ApiError::from(inner),
            StageError::Llm(inner) => ApiError::from(inner),
            StageError::Failed { message } => ApiError::internal_error(message),
        }
    }
}

/// Convert from SiftError to ApiError by delegating to the inner error.
impl From<SiftError> for ApiError {
    fn from(err: SiftError) -> Self {
        match err {
            SiftError::Registry(inner) => ApiError::from(inner),
            SiftError::Store(inner) => ApiError::from(inner),
            SiftError::Ingest(inner) => ApiError::from(inner),
            SiftError::Llm(inner) => ApiError::from(inner),
            SiftError::Stage(inner) => ApiError::from(inner),
        }
    }
}

/// Convert from uuid::Error to ApiError.
impl From<uuid::Error> for ApiError {
    fn from(err: uuid::Error) -> Self {
        ApiError::invalid_input(format!("Invalid run id: {}", err))
    }
}

// ============================================================================
// RESULT TYPE ALIAS
// ============================================================================

/// Result type alias for API operations.
///
/// This is the standard result type used throughout the API layer.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_status_mapping() {
        assert_eq!(ErrorCode::ValidationFailed.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::InvalidInput.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::RunNotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorCode::MetricNotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorCode::TooManyRequests.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(ErrorCode::ProviderError.status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(ErrorCode::InternalError.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            ErrorCode::ConnectionPoolExhausted.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_api_error_constructors() {
        let err = ApiError::missing_field("question");
        assert_eq!(err.code, ErrorCode::MissingField);
        assert!(err.message.contains("question"));

        let err = ApiError::metric_not_found(42);
        assert_eq!(err.code, ErrorCode::MetricNotFound);
        assert!(err.message.contains("42"));
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);

        let run_id = sift_core::new_run_id();
        let err = ApiError::run_not_found(run_id);
        assert_eq!(err.code, ErrorCode::RunNotFound);
        assert!(err.message.contains(&run_id.to_string()));
    }

    #[test]
    fn test_error_serialization() -> Result<(), serde_json::Error> {
        let err = ApiError::metric_not_found(7);
        let json = serde_json::to_string(&err)?;

        assert!(json.contains("METRIC_NOT_FOUND"));
        assert!(json.contains("Metric 7 not found"));
        // No details key when details is None
        assert!(!json.contains("details"));

        let deserialized: ApiError = serde_json::from_str(&json)?;
        assert_eq!(deserialized, err);
        Ok(())
    }

    #[test]
    fn test_column_mismatch_carries_details() {
        let err = ApiError::from(IngestError::ColumnMismatch {
            table: "orders".to_string(),
            expected: vec!["id".to_string(), "amount".to_string()],
            got: vec!["id".to_string()],
        });

        assert_eq!(err.code, ErrorCode::ValidationFailed);
        assert!(err.message.contains("orders"));
        let details = err.details.unwrap();
        assert_eq!(details["expected"], serde_json::json!(["id", "amount"]));
        assert_eq!(details["got"], serde_json::json!(["id"]));
    }

    #[test]
    fn test_store_error_conversions() {
        let err = ApiError::from(StoreError::MetricNotFound { id: 9 });
        assert_eq!(err.code, ErrorCode::MetricNotFound);

        let err = ApiError::from(StoreError::PoolUnavailable {
            reason: "no connections".to_string(),
        });
        assert_eq!(err.code, ErrorCode::ConnectionPoolExhausted);
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);

        // Internal reasons stay out of the client-facing message
        let err = ApiError::from(StoreError::QueryFailed {
            reason: "secret internals".to_string(),
        });
        assert_eq!(err.code, ErrorCode::DatabaseError);
        assert!(!err.message.contains("secret internals"));
    }

    #[test]
    fn test_llm_error_conversions() {
        let err = ApiError::from(LlmError::ProviderNotConfigured);
        assert_eq!(err.code, ErrorCode::ServiceUnavailable);

        let err = ApiError::from(LlmError::RateLimited {
            provider: "openai".to_string(),
            retry_after_ms: 2_000,
        });
        assert_eq!(err.code, ErrorCode::TooManyRequests);
        assert!(err.message.contains("2000 ms"));

        let err = ApiError::from(LlmError::InvalidResponse {
            provider: "openai".to_string(),
            reason: "no choices".to_string(),
        });
        assert_eq!(err.code, ErrorCode::ProviderError);
    }

    #[test]
    fn test_sift_error_delegates_to_inner() {
        let run_id = sift_core::new_run_id();
        let err = ApiError::from(SiftError::Registry(RegistryError::UnknownRun { run_id }));
        assert_eq!(err.code, ErrorCode::RunNotFound);
        assert!(err.message.contains(&run_id.to_string()));

        let err = ApiError::from(SiftError::Ingest(IngestError::InvalidMode {
            mode: "upsert".to_string(),
        }));
        assert_eq!(err.code, ErrorCode::ValidationFailed);
        assert!(err.message.contains("upsert"));
    }

    #[test]
    fn test_uuid_error_is_invalid_input() {
        let parse_err = uuid::Uuid::parse_str("not-a-uuid").unwrap_err();
        let err = ApiError::from(parse_err);
        assert_eq!(err.code, ErrorCode::InvalidInput);
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }
}
