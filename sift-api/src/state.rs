//! Shared application state for Axum routers.

use sift_agents::QueryRunner;
use sift_ingest::Ingestor;
use sift_pipeline::PipelineOrchestrator;
use sift_store::Store;

/// Application-wide state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    /// Catalog and data-table access.
    pub store: Store,
    /// CSV loader used by the upload endpoint.
    pub ingestor: Ingestor,
    /// Launches pipeline runs and owns the run registry.
    pub orchestrator: PipelineOrchestrator,
    /// Answers ad-hoc natural-language questions.
    pub query_runner: QueryRunner,
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(
        store: Store,
        ingestor: Ingestor,
        orchestrator: PipelineOrchestrator,
        query_runner: QueryRunner,
    ) -> Self {
        Self {
            store,
            ingestor,
            orchestrator,
            query_runner,
            start_time: std::time::Instant::now(),
        }
    }
}

// Use macro to reduce boilerplate for FromRef implementations
crate::impl_from_ref!(Store, store);
crate::impl_from_ref!(Ingestor, ingestor);
crate::impl_from_ref!(PipelineOrchestrator, orchestrator);
crate::impl_from_ref!(QueryRunner, query_runner);
