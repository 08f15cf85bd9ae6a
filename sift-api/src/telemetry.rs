//! Tracing setup for the API binary.

use crate::error::{ApiError, ApiResult};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence; without it, Sift crates log at debug and
/// everything else at info. Calling this twice returns an error, so tests
/// that need a subscriber should install their own.
pub fn init_tracing() -> ApiResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("sift=debug,sift_api=debug,tower_http=debug,info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .map_err(|err| ApiError::internal_error(format!("Failed to init tracing: {}", err)))
}
