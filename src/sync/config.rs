//! Sync configuration constants and client settings

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Maximum number of requests for one logical GET (original attempt plus 3 retries).
pub const MAX_ATTEMPTS: u32 = 4;

/// Longest wait the client will sleep through before failing fast (5 minutes).
pub const MAX_WAIT_MS: u64 = 5 * 60 * 1000;

/// Extra time added to a rate-limit wait so the slot has certainly freed up.
pub const WAIT_BUFFER_MS: u64 = 250;

/// Base delay for 429 backoff when the endpoint's own limit is unknown.
pub const RATE_LIMIT_BACKOFF_BASE_MS: u64 = 2_000;

/// Base delay for 5xx and transport-error backoff.
pub const SERVER_BACKOFF_BASE_MS: u64 = 1_000;

/// Upper bound of the random jitter added to 429 delays.
pub const MAX_JITTER_MS: u64 = 1_000;

/// Maximum number of pages followed by one pagination loop.
pub const MAX_PAGES: usize = 10_000;

/// Default number of resources synced concurrently.
pub const DEFAULT_CONCURRENCY: usize = 1;

/// Calculate exponential backoff: `base * 2^attempt`, saturating
pub fn calculate_backoff(base_ms: u64, attempt: u32) -> Duration {
    let factor = 2u64.saturating_pow(attempt);
    Duration::from_millis(base_ms.saturating_mul(factor))
}

/// Settings for the API client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Total attempts per logical request
    pub max_attempts: u32,
    /// Longest tolerated wait (rate limit or retry delay)
    pub max_wait: Duration,
    /// Safety buffer added to rate-limit waits
    pub wait_buffer: Duration,
    /// Whether responses are cached for endpoints that declare a TTL
    pub cache_enabled: bool,
    /// Page limit for one pagination loop
    pub max_pages: usize,
}

impl ClientConfig {
    /// Override the attempt cap
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Override the wait ceiling
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    /// Override the rate-limit safety buffer
    pub fn with_wait_buffer(mut self, wait_buffer: Duration) -> Self {
        self.wait_buffer = wait_buffer;
        self
    }

    /// Enable or disable response caching
    pub fn with_cache(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    /// Override the page limit
    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            max_wait: Duration::from_millis(MAX_WAIT_MS),
            wait_buffer: Duration::from_millis(WAIT_BUFFER_MS),
            cache_enabled: true,
            max_pages: MAX_PAGES,
        }
    }
}
