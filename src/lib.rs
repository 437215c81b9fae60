//! # Portfolio Sync Library
//!
//! Synchronizes a brokerage account's portfolio data (pies, instruments,
//! positions, transactions, dividends, order history, account cash and info)
//! from a versioned REST API into tabular rows with stable column headers.
//!
//! ## Features
//!
//! - **Rate Limiting**: Sliding-window limits tracked per endpoint
//! - **Retries**: 429/5xx/transport failures retried with backoff and jitter
//! - **Pagination**: Follows server-supplied next-page paths until exhausted
//! - **Caching**: TTL response cache keyed by endpoint and canonical query
//! - **Flattening**: Nested JSON records resolved into aligned rows
//!
//! ## Quick Start
//!
//! ```no_run
//! use portfolio_sync::api::credentials::{Environment, StaticCredentials};
//! use portfolio_sync::api::transport::ReqwestTransport;
//! use portfolio_sync::api::ApiClient;
//! use portfolio_sync::registry::EndpointRegistry;
//! use portfolio_sync::sync::SyncOrchestrator;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = Arc::new(EndpointRegistry::load_embedded()?);
//! let credentials = Arc::new(StaticCredentials::new("my-api-key", Environment::Demo));
//! let transport = Arc::new(ReqwestTransport::new()?);
//!
//! let client = Arc::new(ApiClient::new(transport, credentials, registry.clone()));
//! let orchestrator = SyncOrchestrator::new(client);
//!
//! let descriptor = registry.require("TRANSACTIONS")?;
//! let report = orchestrator
//!     .sync_resource(descriptor, &descriptor.default_query)
//!     .await?;
//! println!("{} rows, {} columns", report.rows.len(), report.headers().len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`clock`] - Injectable millisecond clocks
//! - [`registry`] - Endpoint descriptors (paths, rate limits, cache TTLs)
//! - [`api`] - Authenticated client: rate limiting, caching, retries, pagination
//! - [`schema`] - Header derivation and row resolution for nested JSON
//! - [`sync`] - Per-resource orchestration, rate limiter and configuration
//! - [`output`] - Row sinks, header-mapping store and progress reporting
//! - [`metrics`] - Request, retry and sync metrics

#![warn(missing_docs)]
#![warn(clippy::all)]

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Authenticated API client and its collaborators
pub mod api;

/// CLI command implementations
pub mod cli;

/// Time sources for rate limiting and cache expiry
pub mod clock;

/// Observability metrics
pub mod metrics;

/// Row sinks, header stores and progress sinks
pub mod output;

/// Endpoint registry with rate limits and defaults
pub mod registry;

/// Schema derivation and row flattening
pub mod schema;

/// Sync orchestration, rate limiting and configuration
pub mod sync;

pub use api::{ApiClient, ApiError, ApiResult};
pub use registry::EndpointRegistry;
pub use schema::{CellValue, Row};
pub use sync::SyncOrchestrator;

/// Query parameters for a request.
///
/// A `BTreeMap` keeps keys sorted, so serializing the map is canonical and
/// two requests with the same parameters always produce the same cache key.
pub type QueryParams = BTreeMap<String, String>;

/// Sliding-window rate limit for one endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimit {
    /// Maximum number of requests inside one window
    pub max_requests: u32,
    /// Window length in milliseconds
    pub window_ms: u64,
}

impl RateLimit {
    /// Create a new rate limit
    pub fn new(max_requests: u32, window_ms: u64) -> Self {
        Self {
            max_requests,
            window_ms,
        }
    }

    /// Window as a [`Duration`]
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    /// Average spacing between requests (`window / max_requests`) in milliseconds
    pub fn average_interval_ms(&self) -> u64 {
        self.window_ms / u64::from(self.max_requests.max(1))
    }

    /// Validate rate limit values
    pub fn validate(&self) -> Result<(), String> {
        if self.max_requests == 0 {
            return Err("max_requests must be greater than zero".to_string());
        }
        if self.window_ms == 0 {
            return Err("window_ms must be greater than zero".to_string());
        }
        Ok(())
    }
}

/// Configuration of one logical API resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointDescriptor {
    /// Stable identifier (e.g., "TRANSACTIONS") used for rate limiting and caching
    pub key: String,
    /// Path relative to the versioned base URL (e.g., "/history/transactions")
    pub path: String,
    /// Rate limit enforced for this endpoint
    pub rate_limit: RateLimit,
    /// Response cache lifetime in seconds; `None` disables caching for the endpoint
    #[serde(default)]
    pub cache_ttl_secs: Option<u64>,
    /// Whether the endpoint returns cursor-paginated pages
    #[serde(default)]
    pub paginated: bool,
    /// Query parameters sent with the first request of a sync
    #[serde(default)]
    pub default_query: QueryParams,
    /// Header paths used when no sample record is available
    #[serde(default)]
    pub default_headers: Vec<String>,
}

impl EndpointDescriptor {
    /// Create a descriptor with no cache, no default query and no default headers
    pub fn new(key: impl Into<String>, path: impl Into<String>, rate_limit: RateLimit) -> Self {
        Self {
            key: key.into(),
            path: path.into(),
            rate_limit,
            cache_ttl_secs: None,
            paginated: false,
            default_query: QueryParams::new(),
            default_headers: Vec::new(),
        }
    }

    /// Set the cache lifetime
    pub fn with_cache_ttl(mut self, ttl_secs: u64) -> Self {
        self.cache_ttl_secs = Some(ttl_secs);
        self
    }

    /// Set the fallback header list
    pub fn with_default_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.default_headers = headers.into_iter().map(Into::into).collect();
        self
    }

    /// Add a default query parameter
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_query.insert(key.into(), value.into());
        self
    }

    /// Cache lifetime as a [`Duration`], if caching is enabled for this endpoint
    pub fn cache_ttl(&self) -> Option<Duration> {
        self.cache_ttl_secs.map(Duration::from_secs)
    }

    /// Validate descriptor integrity
    pub fn validate(&self) -> Result<(), String> {
        if self.key.trim().is_empty() {
            return Err("Endpoint key cannot be empty".to_string());
        }
        if !self.path.starts_with('/') {
            return Err(format!(
                "Endpoint {} path must start with '/', got {:?}",
                self.key, self.path
            ));
        }
        self.rate_limit
            .validate()
            .map_err(|e| format!("Endpoint {} rate limit invalid: {e}", self.key))
    }
}
