//! Constants for the Sift API
//!
//! This module contains all constant values used throughout the API.
//! Centralizing constants makes them easy to find, modify, and test.

// ============================================================================
// CORS
// ============================================================================

/// Default CORS max age in seconds (24 hours)
pub const DEFAULT_CORS_MAX_AGE_SECS: u64 = 86400;

// ============================================================================
// UPLOADS
// ============================================================================

/// Default cap on a multipart upload body (32 MiB)
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

/// Attributed loader when the upload carries no `user` field
pub const ANONYMOUS_USER: &str = "anonymous";

// ============================================================================
// REGISTRY SWEEPER
// ============================================================================

/// Default interval between sweeper cycles in seconds
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

/// Default retention for settled runs in seconds (24 hours).
/// Zero disables eviction entirely.
pub const DEFAULT_RUN_RETENTION_SECS: u64 = 86400;

/// Default age after which a running stage is failed by the watchdog (30 minutes)
pub const DEFAULT_STAGE_STUCK_SECS: u64 = 1800;
