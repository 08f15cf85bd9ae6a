//! Sift Core - Shared Types
//!
//! Pure data structures with no behavior. All other crates depend on this.
//! This crate contains the pipeline state model, the catalog record types
//! written by the stages, and the error taxonomy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// Run identifier using UUIDv7 for timestamp-sortable IDs.
/// UUIDv7 embeds a Unix timestamp, making IDs naturally sortable by creation time.
pub type RunId = Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Generate a new UUIDv7 RunId (timestamp-sortable).
pub fn new_run_id() -> RunId {
    Uuid::now_v7()
}

// ============================================================================
// PIPELINE STAGES
// ============================================================================

/// The three ordered processing stages applied to each ingested table.
///
/// Declaration order is execution order: schema extraction, then column
/// descriptions, then metric synthesis. `Ord` follows declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    /// Reads the physical schema and records column metadata.
    Extractor,
    /// Generates a human-readable description per column.
    Dictionary,
    /// Synthesizes heuristic metric SQL per column.
    Analyst,
}

impl StageKind {
    /// All stages in execution order.
    pub const ALL: [StageKind; 3] = [StageKind::Extractor, StageKind::Dictionary, StageKind::Analyst];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::Extractor => "extractor",
            StageKind::Dictionary => "dictionary",
            StageKind::Analyst => "analyst",
        }
    }

    /// The stage that must reach `Done` before this one may start.
    pub fn predecessor(&self) -> Option<StageKind> {
        match self {
            StageKind::Extractor => None,
            StageKind::Dictionary => Some(StageKind::Extractor),
            StageKind::Analyst => Some(StageKind::Dictionary),
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of one stage for one table within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageState {
    Pending,
    Running,
    Done,
    Failed,
}

impl StageState {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageState::Pending => "pending",
            StageState::Running => "running",
            StageState::Done => "done",
            StageState::Failed => "failed",
        }
    }

    /// Legal state machine edges: `Pending -> Running -> Done | Failed`.
    pub fn can_transition_to(&self, next: StageState) -> bool {
        matches!(
            (self, next),
            (StageState::Pending, StageState::Running)
                | (StageState::Running, StageState::Done)
                | (StageState::Running, StageState::Failed)
        )
    }

    /// `Done` and `Failed` are absorbing; no edge leaves them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StageState::Done | StageState::Failed)
    }
}

impl fmt::Display for StageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status record for one (run, table, stage) triple.
///
/// `started_at` is set exactly once on entering `Running`; `finished_at` is
/// set exactly once on entering `Done` or `Failed`. Serialized with explicit
/// nulls so polling clients always see all four fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRecord {
    pub status: StageState,
    pub started_at: Option<Timestamp>,
    pub finished_at: Option<Timestamp>,
    pub error: Option<String>,
}

impl StageRecord {
    /// Fresh record in the initial `Pending` state.
    pub fn pending() -> Self {
        StageRecord {
            status: StageState::Pending,
            started_at: None,
            finished_at: None,
            error: None,
        }
    }
}

impl Default for StageRecord {
    fn default() -> Self {
        StageRecord::pending()
    }
}

/// Requested transition for a stage record.
///
/// The orchestrator reports outcomes through this type instead of raw target
/// states, so a failure always carries its message and a success never can.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageTransition {
    /// `Pending -> Running`.
    Start,
    /// `Running -> Done`.
    Finish,
    /// `Running -> Failed`, recording the stage's error message.
    Fail { error: String },
}

impl StageTransition {
    pub fn target_state(&self) -> StageState {
        match self {
            StageTransition::Start => StageState::Running,
            StageTransition::Finish => StageState::Done,
            StageTransition::Fail { .. } => StageState::Failed,
        }
    }
}

// ============================================================================
// CATALOG TYPES
// ============================================================================

/// Column metadata row written by the extractor stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMeta {
    pub id: i64,
    pub table_name: String,
    pub column_name: String,
    pub data_type: String,
    pub is_numeric: bool,
    pub is_datetime: bool,
}

/// Column metadata before insertion (no id yet).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewColumnMeta {
    pub table_name: String,
    pub column_name: String,
    pub data_type: String,
    pub is_numeric: bool,
    pub is_datetime: bool,
}

/// A catalog column joined with its dictionary description, if one exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogColumn {
    pub column: ColumnMeta,
    pub description: Option<String>,
}

/// Chart family a metric's result is intended for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    /// Single-value aggregate, no axes.
    Numeric,
    /// Time series over a date axis.
    Line,
    /// Categorical counts.
    Bar,
}

/// Rendering hint stored alongside each metric.
///
/// Serialized with a `type` key for the chart family, plus the column aliases
/// to bind to each axis (absent for single-value metrics).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VizHint {
    pub x: Option<String>,
    pub y: Option<String>,
    #[serde(rename = "type")]
    pub kind: ChartKind,
}

impl VizHint {
    pub fn numeric(y: impl Into<String>) -> Self {
        VizHint {
            x: None,
            y: Some(y.into()),
            kind: ChartKind::Numeric,
        }
    }

    pub fn line(x: impl Into<String>, y: impl Into<String>) -> Self {
        VizHint {
            x: Some(x.into()),
            y: Some(y.into()),
            kind: ChartKind::Line,
        }
    }

    pub fn bar(x: impl Into<String>, y: impl Into<String>) -> Self {
        VizHint {
            x: Some(x.into()),
            y: Some(y.into()),
            kind: ChartKind::Bar,
        }
    }
}

/// A stored metric definition produced by the analyst stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub id: i64,
    pub metric_name: String,
    pub sql_definition: String,
    pub viz_hint: VizHint,
    pub importance_score: f64,
    pub tags: Vec<String>,
}

/// A metric definition before insertion (no id yet).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMetric {
    pub metric_name: String,
    pub sql_definition: String,
    pub viz_hint: VizHint,
    pub importance_score: f64,
    pub tags: Vec<String>,
}

// ============================================================================
// INGESTION TYPES
// ============================================================================

/// How an uploaded file maps onto a target table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestMode {
    /// Create a fresh table, suffixing the name on collision.
    Create,
    /// Drop and recreate the named table.
    Replace,
    /// Append rows to the named table, which must already exist.
    Append,
}

impl IngestMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestMode::Create => "create",
            IngestMode::Replace => "replace",
            IngestMode::Append => "append",
        }
    }
}

impl fmt::Display for IngestMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IngestMode {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(IngestMode::Create),
            "replace" => Ok(IngestMode::Replace),
            "append" => Ok(IngestMode::Append),
            other => Err(IngestError::InvalidMode {
                mode: other.to_string(),
            }),
        }
    }
}

/// Audit row appended to ingest history after each successful load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewIngestRecord {
    pub table_name: String,
    pub mode: IngestMode,
    pub file_name: String,
    pub row_count: i64,
    pub loaded_by: String,
}

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Run registry errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Unknown run: {run_id}")]
    UnknownRun { run_id: RunId },

    #[error("Table {table} is not part of run {run_id}")]
    UnknownTable { run_id: RunId, table: String },

    #[error("Illegal transition for {table}/{stage}: {from} -> {to}")]
    InvalidTransition {
        table: String,
        stage: StageKind,
        from: StageState,
        to: StageState,
    },

    #[error("Stage {stage} for {table} cannot start before {previous} is done")]
    PriorStageIncomplete {
        table: String,
        stage: StageKind,
        previous: StageKind,
    },
}

/// Catalog store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Connection pool unavailable: {reason}")]
    PoolUnavailable { reason: String },

    #[error("Query failed: {reason}")]
    QueryFailed { reason: String },

    #[error("COPY into {table} failed: {reason}")]
    CopyFailed { table: String, reason: String },

    #[error("Metric not found: {id}")]
    MetricNotFound { id: i64 },

    #[error("Schema bootstrap failed: {reason}")]
    BootstrapFailed { reason: String },
}

/// LLM provider errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LlmError {
    #[error("No LLM provider configured")]
    ProviderNotConfigured,

    #[error("Request to {provider} failed with status {status}: {message}")]
    RequestFailed {
        provider: String,
        status: i32,
        message: String,
    },

    #[error("Rate limited by {provider}, retry after {retry_after_ms}ms")]
    RateLimited {
        provider: String,
        retry_after_ms: i64,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },
}

/// File ingestion errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IngestError {
    #[error("Uploaded file is empty")]
    EmptyFile,

    #[error("Malformed CSV: {reason}")]
    MalformedCsv { reason: String },

    #[error("No usable columns in {file_name}")]
    NoColumns { file_name: String },

    #[error("Unsupported ingest mode: {mode}")]
    InvalidMode { mode: String },

    #[error("Target table required for {mode} mode")]
    TableRequired { mode: IngestMode },

    #[error("Target table {table} does not exist")]
    TableMissing { table: String },

    #[error("Column mismatch for {table}: table has {expected:?}, file has {got:?}")]
    ColumnMismatch {
        table: String,
        expected: Vec<String>,
        got: Vec<String>,
    },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Stage execution errors, captured into the stage record's error string.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StageError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("{message}")]
    Failed { message: String },
}

impl StageError {
    pub fn failed(message: impl Into<String>) -> Self {
        StageError::Failed {
            message: message.into(),
        }
    }
}

/// Master error type for all Sift errors.
#[derive(Debug, Clone, Error)]
pub enum SiftError {
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Ingest error: {0}")]
    Ingest(#[from] IngestError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Stage error: {0}")]
    Stage(#[from] StageError),
}

/// Result type alias for Sift operations.
pub type SiftResult<T> = Result<T, SiftError>;

// ============================================================================
// TESTS
// ============================================================================


// ============================================================================
// PROPERTY-BASED TESTS
// ============================================================================

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    fn any_state() -> impl Strategy<Value = StageState> {
        prop_oneof![
            Just(StageState::Pending),
            Just(StageState::Running),
            Just(StageState::Done),
            Just(StageState::Failed),
        ]
    }

    fn any_stage() -> impl Strategy<Value = StageKind> {
        prop_oneof![
            Just(StageKind::Extractor),
            Just(StageKind::Dictionary),
            Just(StageKind::Analyst),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// No legal edge ever leaves a terminal state or re-enters Pending.
        #[test]
        fn prop_transitions_never_leave_terminal_states(from in any_state(), to in any_state()) {
            if from.can_transition_to(to) {
                prop_assert!(!from.is_terminal());
                prop_assert!(to != StageState::Pending);
            }
        }

        /// The state machine has exactly the three declared edges.
        #[test]
        fn prop_transition_edge_count(from in any_state()) {
            let count = [
                StageState::Pending,
                StageState::Running,
                StageState::Done,
                StageState::Failed,
            ]
            .iter()
            .filter(|to| from.can_transition_to(**to))
            .count();
            match from {
                StageState::Pending => prop_assert_eq!(count, 1),
                StageState::Running => prop_assert_eq!(count, 2),
                StageState::Done | StageState::Failed => prop_assert_eq!(count, 0),
            }
        }

        /// Serde round-trips every stage kind through its lowercase name.
        #[test]
        fn prop_stage_kind_serde_roundtrip(stage in any_stage()) {
            let json = serde_json::to_string(&stage).unwrap();
            prop_assert_eq!(json, format!("\"{}\"", stage.as_str()));
            let back: StageKind = serde_json::from_str(&format!("\"{}\"", stage.as_str())).unwrap();
            prop_assert_eq!(back, stage);
        }

        /// Walking predecessors from any stage terminates at the extractor.
        #[test]
        fn prop_predecessor_chain_reaches_extractor(stage in any_stage()) {
            let mut current = stage;
            let mut hops = 0;
            while let Some(prev) = current.predecessor() {
                prop_assert!(prev < current);
                current = prev;
                hops += 1;
                prop_assert!(hops < StageKind::ALL.len());
            }
            prop_assert_eq!(current, StageKind::Extractor);
        }

        /// A failure transition always carries its message into the record.
        #[test]
        fn prop_fail_transition_targets_failed(msg in ".*") {
            let transition = StageTransition::Fail { error: msg };
            prop_assert_eq!(transition.target_state(), StageState::Failed);
        }
    }
}
