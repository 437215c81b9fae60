//! Sync orchestration and rate limiting
//!
//! # Overview
//!
//! A sync of one resource runs in four steps:
//!
//! 1. **Fetch**: every page, strictly in sequence, via [`crate::api::ApiClient`]
//! 2. **Columns**: reuse the stored header mapping, or derive one from the first item
//! 3. **Rows**: resolve each item against the columns
//! 4. **Write**: hand the table to a [`crate::output::RowSink`]
//!
//! Several resources may sync concurrently; each resource's pages stay
//! sequential and share the same [`RateLimiter`].
//!
//! # Components
//!
//! - [`orchestrator`] - Per-resource sync and bounded multi-resource runs
//! - [`rate_limit`] - Sliding-window limiter per endpoint key
//! - [`config`] - Configuration constants and backoff calculation

pub mod config;
pub mod orchestrator;
pub mod rate_limit;

pub use config::ClientConfig;
pub use orchestrator::{ResourceOutcome, SyncOrchestrator, SyncReport};
pub use rate_limit::{RateDecision, RateLimiter};

use crate::api::ApiError;
use crate::output::OutputError;

/// Sync errors
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Fetching failed
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Writing the result failed
    #[error("output error: {0}")]
    Output(#[from] OutputError),
}

impl SyncError {
    /// Short machine-readable kind
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::Api(err) => err.kind(),
            SyncError::Output(_) => "output",
        }
    }
}
