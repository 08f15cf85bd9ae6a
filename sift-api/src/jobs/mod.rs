//! Background Jobs
//!
//! Long-running tasks spawned alongside the HTTP server. Each task runs until
//! it observes the shutdown signal and returns its metrics for a final log
//! line.

pub mod registry_sweeper;

pub use registry_sweeper::{
    registry_sweeper_task, RegistrySweeperConfig, RegistrySweeperMetrics, RegistrySweeperSnapshot,
};
