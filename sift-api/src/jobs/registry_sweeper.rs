//! Registry Sweeper Background Task
//!
//! The run registry lives in memory, so two things accumulate without help:
//!
//! - Settled runs nobody polls anymore keep their stage grids alive forever
//! - Stages stuck in `Running` never settle when a pipeline task dies
//!   without recording an outcome (process kill, abort)
//!
//! This task periodically fails stuck running stages via the registry
//! watchdog and evicts settled runs past the retention window. The watchdog
//! goes first within a cycle so a reclaimed run settles and can age out.
//!
//! # Configuration
//!
//! The sweeper is configured via `RegistrySweeperConfig`:
//!
//! ```rust
//! use sift_api::jobs::RegistrySweeperConfig;
//! use std::time::Duration;
//!
//! let config = RegistrySweeperConfig {
//!     check_interval: Duration::from_secs(60),      // Sweep every minute
//!     run_retention: Duration::from_secs(86400),    // Keep settled runs a day
//!     stage_stuck_after: Duration::from_secs(1800), // Fail stages after 30 min
//! };
//! ```

use crate::constants::{
    DEFAULT_RUN_RETENTION_SECS, DEFAULT_STAGE_STUCK_SECS, DEFAULT_SWEEP_INTERVAL_SECS,
};
use sift_pipeline::RunRegistry;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Configuration for the registry sweeper background task.
#[derive(Debug, Clone)]
pub struct RegistrySweeperConfig {
    /// How often to sweep (default: 60 seconds)
    pub check_interval: Duration,

    /// How long settled runs stay visible to status polling before eviction.
    /// Zero disables eviction entirely (default: 24 hours)
    pub run_retention: Duration,

    /// Age after which a stage still in `Running` is failed by the watchdog
    /// (default: 30 minutes)
    pub stage_stuck_after: Duration,
}

impl Default for RegistrySweeperConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
            run_retention: Duration::from_secs(DEFAULT_RUN_RETENTION_SECS),
            stage_stuck_after: Duration::from_secs(DEFAULT_STAGE_STUCK_SECS),
        }
    }
}

impl RegistrySweeperConfig {
    /// Create RegistrySweeperConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `SIFT_SWEEP_INTERVAL_SECS`: How often to sweep (default: 60)
    /// - `SIFT_RUN_RETENTION_SECS`: Settled run retention, 0 disables eviction (default: 86400)
    /// - `SIFT_STAGE_STUCK_SECS`: Running-stage watchdog threshold (default: 1800)
    pub fn from_env() -> Self {
        let check_interval = Duration::from_secs(
            std::env::var("SIFT_SWEEP_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS),
        );

        let run_retention = Duration::from_secs(
            std::env::var("SIFT_RUN_RETENTION_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_RUN_RETENTION_SECS),
        );

        let stage_stuck_after = Duration::from_secs(
            std::env::var("SIFT_STAGE_STUCK_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_STAGE_STUCK_SECS),
        );

        Self {
            check_interval,
            run_retention,
            stage_stuck_after,
        }
    }

    /// Create a configuration for development/testing with short windows.
    pub fn development() -> Self {
        Self {
            check_interval: Duration::from_secs(10),
            run_retention: Duration::from_secs(60),
            stage_stuck_after: Duration::from_secs(30),
        }
    }
}

// ============================================================================
// METRICS
// ============================================================================

/// Metrics for sweeper activity.
#[derive(Debug, Default)]
pub struct RegistrySweeperMetrics {
    /// Total settled runs evicted since startup
    pub runs_evicted: AtomicU64,

    /// Total running stages failed by the watchdog since startup
    pub stages_failed: AtomicU64,

    /// Total sweep cycles completed
    pub sweep_cycles: AtomicU64,
}

impl RegistrySweeperMetrics {
    /// Create new metrics instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get current snapshot of all metrics.
    pub fn snapshot(&self) -> RegistrySweeperSnapshot {
        RegistrySweeperSnapshot {
            runs_evicted: self.runs_evicted.load(Ordering::Relaxed),
            stages_failed: self.stages_failed.load(Ordering::Relaxed),
            sweep_cycles: self.sweep_cycles.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of sweeper metrics at a point in time.
#[derive(Debug, Clone)]
pub struct RegistrySweeperSnapshot {
    pub runs_evicted: u64,
    pub stages_failed: u64,
    pub sweep_cycles: u64,
}

// ============================================================================
// BACKGROUND TASK
// ============================================================================

/// Background task that keeps the run registry bounded.
///
/// Runs until the shutdown signal is received. Each cycle:
///
/// 1. Fails stages stuck in `Running` past `stage_stuck_after`
/// 2. Evicts settled runs older than `run_retention` (unless retention is zero)
///
/// # Arguments
///
/// * `registry` - Shared run registry to sweep
/// * `config` - Sweeper configuration (interval, retention, watchdog threshold)
/// * `shutdown_rx` - Watch receiver for shutdown signal
///
/// # Returns
///
/// Metrics collected during the task's lifetime
///
/// # Example
///
/// ```ignore
/// use tokio::sync::watch;
///
/// let (shutdown_tx, shutdown_rx) = watch::channel(false);
/// let handle = tokio::spawn(registry_sweeper_task(
///     registry.clone(),
///     RegistrySweeperConfig::from_env(),
///     shutdown_rx,
/// ));
///
/// // Later, trigger shutdown
/// let _ = shutdown_tx.send(true);
/// let metrics = handle.await?;
/// ```
pub async fn registry_sweeper_task(
    registry: Arc<RunRegistry>,
    config: RegistrySweeperConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Arc<RegistrySweeperMetrics> {
    let metrics = Arc::new(RegistrySweeperMetrics::new());

    let mut sweep_interval = interval(config.check_interval);
    sweep_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        check_interval_secs = config.check_interval.as_secs(),
        run_retention_secs = config.run_retention.as_secs(),
        stage_stuck_secs = config.stage_stuck_after.as_secs(),
        "Registry sweeper started"
    );

    loop {
        tokio::select! {
            // Check for shutdown signal
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    tracing::info!("Registry sweeper shutting down");
                    break;
                }
            }

            _ = sweep_interval.tick() => {
                sweep_once(&registry, &config, &metrics);
            }
        }
    }

    let snapshot = metrics.snapshot();
    tracing::info!(
        runs_evicted = snapshot.runs_evicted,
        stages_failed = snapshot.stages_failed,
        sweep_cycles = snapshot.sweep_cycles,
        "Registry sweeper completed"
    );

    metrics
}

/// Perform one sweep cycle. Watchdog runs before eviction so a reclaimed
/// run settles in the same cycle and can age out in a later one.
fn sweep_once(
    registry: &RunRegistry,
    config: &RegistrySweeperConfig,
    metrics: &RegistrySweeperMetrics,
) {
    metrics.sweep_cycles.fetch_add(1, Ordering::Relaxed);

    let failed = registry.fail_stuck_running(config.stage_stuck_after);
    if failed > 0 {
        metrics.stages_failed.fetch_add(failed as u64, Ordering::Relaxed);
        tracing::warn!(count = failed, "Watchdog failed stuck running stages");
    }

    let mut evicted = 0;
    if !config.run_retention.is_zero() {
        evicted = registry.sweep_settled(config.run_retention);
        if evicted > 0 {
            metrics.runs_evicted.fetch_add(evicted as u64, Ordering::Relaxed);
            tracing::info!(count = evicted, "Evicted settled runs");
        }
    }

    if failed == 0 && evicted == 0 {
        tracing::trace!("Sweep cycle completed with nothing to reclaim");
    }
}

// ============================================================================
// TESTS
// ============================================================================
