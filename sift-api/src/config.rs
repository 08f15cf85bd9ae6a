//! API Configuration Module
//!
//! This module provides configuration for CORS, upload limits, and pipeline
//! concurrency. Configuration is loaded from environment variables with
//! sensible defaults for development.

use crate::constants::{DEFAULT_CORS_MAX_AGE_SECS, DEFAULT_MAX_UPLOAD_BYTES};
use sift_pipeline::PipelineLimiter;

// ============================================================================
// API CONFIGURATION
// ============================================================================

/// API configuration for CORS, uploads, and pipeline concurrency.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    // ========================================================================
    // CORS Configuration
    // ========================================================================
    /// Allowed CORS origins (comma-separated in env var).
    /// Empty means allow all origins (dev mode).
    /// Example: "https://sift.example.com,https://app.sift.example.com"
    pub cors_origins: Vec<String>,

    /// Whether to allow credentials in CORS requests.
    pub cors_allow_credentials: bool,

    /// Max age for CORS preflight cache in seconds.
    pub cors_max_age_secs: u64,

    // ========================================================================
    // Upload Configuration
    // ========================================================================
    /// Cap on a multipart upload body in bytes.
    pub max_upload_bytes: usize,

    // ========================================================================
    // Pipeline Configuration
    // ========================================================================
    /// How many pipeline runs may execute concurrently.
    /// Read once at startup; changing the env var later has no effect.
    pub pipeline_capacity: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            // CORS defaults: permissive for development
            cors_origins: Vec::new(), // Empty = allow all
            cors_allow_credentials: false,
            cors_max_age_secs: DEFAULT_CORS_MAX_AGE_SECS,

            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            pipeline_capacity: PipelineLimiter::DEFAULT_CAPACITY,
        }
    }
}

impl ApiConfig {
    /// Create ApiConfig from environment variables.
    ///
    /// Environment variables:
    /// - `SIFT_CORS_ORIGINS`: Comma-separated allowed origins (empty = allow all)
    /// - `SIFT_CORS_ALLOW_CREDENTIALS`: "true" or "false" (default: false)
    /// - `SIFT_CORS_MAX_AGE_SECS`: Preflight cache duration (default: 86400)
    /// - `SIFT_MAX_UPLOAD_BYTES`: Multipart body cap (default: 33554432)
    /// - `SIFT_PIPELINE_CAPACITY`: Concurrent pipeline runs (default: 3)
    pub fn from_env() -> Self {
        let cors_origins = std::env::var("SIFT_CORS_ORIGINS")
            .ok()
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let cors_allow_credentials = std::env::var("SIFT_CORS_ALLOW_CREDENTIALS")
            .ok()
            .map(|s| s.to_lowercase() == "true")
            .unwrap_or(false);

        let cors_max_age_secs = std::env::var("SIFT_CORS_MAX_AGE_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_CORS_MAX_AGE_SECS);

        let max_upload_bytes = std::env::var("SIFT_MAX_UPLOAD_BYTES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES);

        let pipeline_capacity = std::env::var("SIFT_PIPELINE_CAPACITY")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(PipelineLimiter::DEFAULT_CAPACITY);

        Self {
            cors_origins,
            cors_allow_credentials,
            cors_max_age_secs,
            max_upload_bytes,
            pipeline_capacity,
        }
    }

    /// Check if running in production mode (strict CORS).
    pub fn is_production(&self) -> bool {
        !self.cors_origins.is_empty()
    }
}
