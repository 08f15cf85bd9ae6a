//! Sift Pipeline - Run Tracking and Stage Orchestration
//!
//! This crate coordinates the per-table processing pipeline that follows a
//! file ingest. Each uploaded table passes through three ordered stages
//! (extractor, dictionary, analyst); the registry records every transition
//! so clients can poll progress by run id.
//!
//! # Architecture
//!
//! ```text
//! launch_run(tables)
//!     |-- one spawned task per table, gated by the PipelineLimiter
//!     |       extractor -> dictionary -> analyst
//!     |       (first failure halts the remaining stages for that table)
//!     '-- RunRegistry records pending/running/done/failed per stage
//! ```
//!
//! Failures stay local to a (run, table) pipeline: the failing stage is
//! recorded with its error message, later stages stay `pending`, and other
//! tables in the same run are unaffected.

mod limiter;
mod orchestrator;
mod registry;
mod stage;

pub use limiter::{PipelineLimiter, PipelinePermit};
pub use orchestrator::{PipelineHandle, PipelineOrchestrator, RunLaunch};
pub use registry::{RunRegistry, RunSnapshot};
pub use stage::{StageSet, TableStage};

// Re-export core types for convenience
pub use sift_core::{
    RegistryError, RunId, StageError, StageKind, StageRecord, StageState, StageTransition,
};
