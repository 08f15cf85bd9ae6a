//! Pipeline orchestrator.
//!
//! Launches one asynchronous task per ingested table and drives the three
//! stages in order, recording every transition in the run registry. The
//! first stage failure halts the remaining stages for that table only;
//! other tables, including tables of the same run, continue unaffected.

use crate::limiter::PipelineLimiter;
use crate::registry::{RunRegistry, dedup_tables};
use crate::stage::StageSet;
use dashmap::DashMap;
use sift_core::{RunId, StageTransition};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Coordinates stage execution for every table of every run.
///
/// Cloning is cheap; all clones share the same registry, limiter, and
/// per-table locks.
#[derive(Clone)]
pub struct PipelineOrchestrator {
    registry: Arc<RunRegistry>,
    limiter: PipelineLimiter,
    stages: Arc<StageSet>,
    // Serializes pipelines that target the same physical table, so two runs
    // ingesting the same table never interleave stage writes.
    table_locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl PipelineOrchestrator {
    pub fn new(registry: Arc<RunRegistry>, limiter: PipelineLimiter, stages: Arc<StageSet>) -> Self {
        PipelineOrchestrator {
            registry,
            limiter,
            stages,
            table_locks: Arc::new(DashMap::new()),
        }
    }

    pub fn registry(&self) -> &Arc<RunRegistry> {
        &self.registry
    }

    pub fn limiter(&self) -> &PipelineLimiter {
        &self.limiter
    }

    /// Registers a new run for the given tables and spawns one pipeline
    /// task per table. Returns the run id together with a handle per task,
    /// so the caller can await, abort, or drop them to detach.
    pub fn launch_run(&self, tables: Vec<String>) -> RunLaunch {
        let tables = dedup_tables(tables);
        let run_id = self.registry.create_run(tables.clone());
        tracing::info!(%run_id, table_count = tables.len(), "Launching ingestion run");

        let mut handles = Vec::with_capacity(tables.len());
        for table in tables {
            let orchestrator = self.clone();
            let task_table = table.clone();
            let handle = tokio::spawn(async move {
                orchestrator.run_pipeline(run_id, &task_table).await;
            });
            handles.push(PipelineHandle { table, handle });
        }
        RunLaunch { run_id, handles }
    }

    /// Runs the full stage sequence for one table of one run.
    ///
    /// Holds a limiter slot for the whole sequence, then the table lock
    /// for the same span. Once the stages settle, the lock entry is
    /// dropped again unless another pipeline for the same table still
    /// references it.
    pub async fn run_pipeline(&self, run_id: RunId, table: &str) {
        let _slot = self.limiter.acquire().await;
        let table_lock = self.table_lock(table);
        {
            let _table_guard = table_lock.lock().await;
            self.run_stages(run_id, table).await;
        }
        drop(table_lock);
        // Strong count 1 means the map holds the only reference, so no
        // other pipeline is using or awaiting this lock. The map shard
        // stays locked across the check and the removal.
        self.table_locks
            .remove_if(table, |_, lock| Arc::strong_count(lock) == 1);
    }

    /// Drives the stages in order, recording every transition.
    ///
    /// Registry bookkeeping failures abandon the pipeline with an error
    /// log; they indicate the run was evicted or the process is
    /// misbehaving, and there is nowhere left to record progress.
    async fn run_stages(&self, run_id: RunId, table: &str) {
        for stage in self.stages.in_order() {
            let kind = stage.kind();
            if let Err(err) =
                self.registry
                    .update_stage(run_id, table, kind, StageTransition::Start)
            {
                tracing::error!(%run_id, table, stage = %kind, error = %err, "Failed to record stage start, abandoning pipeline");
                return;
            }

            match stage.execute(table).await {
                Ok(()) => {
                    if let Err(err) =
                        self.registry
                            .update_stage(run_id, table, kind, StageTransition::Finish)
                    {
                        tracing::error!(%run_id, table, stage = %kind, error = %err, "Failed to record stage completion, abandoning pipeline");
                        return;
                    }
                    tracing::debug!(%run_id, table, stage = %kind, "Stage completed");
                }
                Err(stage_err) => {
                    tracing::warn!(%run_id, table, stage = %kind, error = %stage_err, "Stage failed, halting remaining stages for this table");
                    if let Err(err) = self.registry.update_stage(
                        run_id,
                        table,
                        kind,
                        StageTransition::Fail {
                            error: stage_err.to_string(),
                        },
                    ) {
                        tracing::error!(%run_id, table, stage = %kind, error = %err, "Failed to record stage failure");
                    }
                    return;
                }
            }
        }
        tracing::info!(%run_id, table, "Pipeline completed");
    }

    fn table_lock(&self, table: &str) -> Arc<Mutex<()>> {
        self.table_locks
            .entry(table.to_string())
            .or_default()
            .clone()
    }

    /// Number of table lock entries currently retained.
    pub fn table_lock_count(&self) -> usize {
        self.table_locks.len()
    }
}

/// A launched run: its id plus one task handle per table pipeline.
#[derive(Debug)]
pub struct RunLaunch {
    pub run_id: RunId,
    pub handles: Vec<PipelineHandle>,
}

impl RunLaunch {
    /// Waits for every table pipeline of this run to finish.
    pub async fn join_all(self) {
        for handle in self.handles {
            handle.join().await;
        }
    }

    /// Lets the pipelines run unsupervised and keeps only the run id.
    /// Dropping a task handle detaches the task; it keeps running.
    pub fn detach(self) -> RunId {
        self.run_id
    }
}

/// Handle on one spawned table pipeline.
#[derive(Debug)]
pub struct PipelineHandle {
    table: String,
    handle: JoinHandle<()>,
}

impl PipelineHandle {
    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Aborts the pipeline task. The registry keeps whatever state the
    /// pipeline last recorded; the watchdog sweep later reclassifies a
    /// record left in `Running`.
    pub fn abort(&self) {
        self.handle.abort();
    }

    /// Waits for the pipeline task to finish. Stage failures are already
    /// recorded in the registry; only a panicking task is worth logging.
    pub async fn join(self) {
        if let Err(err) = self.handle.await {
            if err.is_panic() {
                tracing::error!(table = %self.table, "Pipeline task panicked");
            }
        }
    }
}
