//! In-memory run registry.
//!
//! Tracks the lifecycle of every ingestion run: one record per (table, stage)
//! pair, all owned here. The orchestrator is the sole writer; status polling
//! reads concurrently. Records are replaced whole on every transition so a
//! reader never observes a half-updated record.

use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sift_core::{
    RegistryError, RunId, StageKind, StageRecord, StageState, StageTransition, Timestamp,
    new_run_id,
};
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

/// Per-run bookkeeping: creation time plus the full stage grid.
#[derive(Debug, Clone)]
struct RunEntry {
    created_at: Timestamp,
    tables: BTreeMap<String, BTreeMap<StageKind, StageRecord>>,
}

impl RunEntry {
    /// A table is settled once nothing can move it anymore: no stage is
    /// running, and either every stage finished or one failed (which pins
    /// the rest at pending). A run is settled when all its tables are.
    fn is_settled(&self) -> bool {
        self.tables.values().all(|stages| {
            let any_running = stages.values().any(|r| r.status == StageState::Running);
            let any_failed = stages.values().any(|r| r.status == StageState::Failed);
            let all_done = stages.values().all(|r| r.status == StageState::Done);
            !any_running && (all_done || any_failed)
        })
    }
}

/// Read-only snapshot of one run, as returned to polling clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSnapshot {
    pub run_id: RunId,
    pub created_at: Timestamp,
    pub tables: BTreeMap<String, BTreeMap<StageKind, StageRecord>>,
}

/// Shared registry of in-flight and recently finished ingestion runs.
///
/// Constructed once at process start and injected wherever run state is
/// needed; there is no global instance. All methods take `&self` and are
/// safe to call from any task.
#[derive(Debug, Default)]
pub struct RunRegistry {
    runs: DashMap<RunId, RunEntry>,
}

impl RunRegistry {
    pub fn new() -> Self {
        RunRegistry {
            runs: DashMap::new(),
        }
    }

    /// Allocates a fresh run id and initializes every (table, stage) record
    /// to `Pending`. Duplicate table names collapse to one entry. Id
    /// generation cannot collide, so this has no error path.
    pub fn create_run(&self, tables: Vec<String>) -> RunId {
        let run_id = new_run_id();
        let grid: BTreeMap<String, BTreeMap<StageKind, StageRecord>> = tables
            .into_iter()
            .map(|table| {
                let stages = StageKind::ALL
                    .iter()
                    .map(|stage| (*stage, StageRecord::pending()))
                    .collect();
                (table, stages)
            })
            .collect();
        self.runs.insert(
            run_id,
            RunEntry {
                created_at: Utc::now(),
                tables: grid,
            },
        );
        run_id
    }

    /// Applies one transition to the named stage record.
    ///
    /// Enforces the state machine edges, the stage ordering guard (a stage
    /// may only start once its predecessor is done), and the set-once
    /// timestamp rules. The record is swapped atomically under the map's
    /// shard lock.
    pub fn update_stage(
        &self,
        run_id: RunId,
        table: &str,
        stage: StageKind,
        transition: StageTransition,
    ) -> Result<(), RegistryError> {
        let mut entry = self
            .runs
            .get_mut(&run_id)
            .ok_or(RegistryError::UnknownRun { run_id })?;
        let stages = entry
            .tables
            .get_mut(table)
            .ok_or_else(|| RegistryError::UnknownTable {
                run_id,
                table: table.to_string(),
            })?;

        // Ordering guard before the edge check, so starting a blocked stage
        // reports which stage is blocking it rather than a generic illegal
        // edge.
        if matches!(transition, StageTransition::Start) {
            if let Some(previous) = stage.predecessor() {
                let previous_done = stages
                    .get(&previous)
                    .map(|r| r.status == StageState::Done)
                    .unwrap_or(false);
                if !previous_done {
                    return Err(RegistryError::PriorStageIncomplete {
                        table: table.to_string(),
                        stage,
                        previous,
                    });
                }
            }
        }

        let record = stages.entry(stage).or_insert_with(StageRecord::pending);
        let target = transition.target_state();
        if !record.status.can_transition_to(target) {
            return Err(RegistryError::InvalidTransition {
                table: table.to_string(),
                stage,
                from: record.status,
                to: target,
            });
        }

        let now = Utc::now();
        let mut next = record.clone();
        next.status = target;
        match transition {
            StageTransition::Start => next.started_at = Some(now),
            StageTransition::Finish => next.finished_at = Some(now),
            StageTransition::Fail { error } => {
                next.finished_at = Some(now);
                next.error = Some(error);
            }
        }
        *record = next;
        Ok(())
    }

    /// Full per-table, per-stage snapshot of one run.
    pub fn get_status(&self, run_id: RunId) -> Result<RunSnapshot, RegistryError> {
        let entry = self
            .runs
            .get(&run_id)
            .ok_or(RegistryError::UnknownRun { run_id })?;
        Ok(RunSnapshot {
            run_id,
            created_at: entry.created_at,
            tables: entry.tables.clone(),
        })
    }

    /// Tables belonging to a run, in snapshot order.
    pub fn tables_of(&self, run_id: RunId) -> Result<Vec<String>, RegistryError> {
        let entry = self
            .runs
            .get(&run_id)
            .ok_or(RegistryError::UnknownRun { run_id })?;
        Ok(entry.tables.keys().cloned().collect())
    }

    /// Evicts settled runs created more than `older_than` ago. Returns how
    /// many runs were removed. Runs with any running or still-startable
    /// stage are never evicted.
    pub fn sweep_settled(&self, older_than: Duration) -> usize {
        let span = match chrono::Duration::from_std(older_than) {
            Ok(span) => span,
            Err(_) => return 0,
        };
        let cutoff = match Utc::now().checked_sub_signed(span) {
            Some(cutoff) => cutoff,
            None => return 0,
        };
        let mut evicted = 0;
        self.runs.retain(|_, entry| {
            let evict = entry.created_at < cutoff && entry.is_settled();
            if evict {
                evicted += 1;
            }
            !evict
        });
        evicted
    }

    /// Reclassifies records stuck in `Running` longer than `older_than` as
    /// `Failed`. Covers pipelines whose task died without recording an
    /// outcome (process kill, abort). Returns how many records changed.
    pub fn fail_stuck_running(&self, older_than: Duration) -> usize {
        let span = match chrono::Duration::from_std(older_than) {
            Ok(span) => span,
            Err(_) => return 0,
        };
        let cutoff = match Utc::now().checked_sub_signed(span) {
            Some(cutoff) => cutoff,
            None => return 0,
        };
        let mut reclassified = 0;
        for mut entry in self.runs.iter_mut() {
            for stages in entry.tables.values_mut() {
                for record in stages.values_mut() {
                    let stuck = record.status == StageState::Running
                        && record.started_at.map(|t| t < cutoff).unwrap_or(false);
                    if stuck {
                        let mut next = record.clone();
                        next.status = StageState::Failed;
                        next.finished_at = Some(Utc::now());
                        next.error = Some(format!(
                            "Stage stayed running past the {}s watchdog bound",
                            older_than.as_secs()
                        ));
                        *record = next;
                        reclassified += 1;
                    }
                }
            }
        }
        reclassified
    }

    pub fn contains(&self, run_id: RunId) -> bool {
        self.runs.contains_key(&run_id)
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}

/// Drops duplicate table names, keeping first occurrence order.
pub(crate) fn dedup_tables(tables: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    tables
        .into_iter()
        .filter(|table| seen.insert(table.clone()))
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================


// ============================================================================
// PROPERTY-BASED TESTS
// ============================================================================
