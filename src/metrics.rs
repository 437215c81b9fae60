//! Observability metrics for portfolio sync
//!
//! Counters, histograms and gauges for API requests, 429 responses, retry
//! backoff, rate-limit waits, cache effectiveness and per-resource sync
//! outcomes.
//!
//! ## Architecture
//!
//! - Uses `metrics` crate for low-overhead metric collection
//! - Optional Prometheus exporter for a scrape endpoint (`--metrics-addr`)
//! - With no recorder installed every call is a no-op

use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::Lazy;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// Global metrics registry initialization flag
static METRICS_INITIALIZED: Lazy<Arc<RwLock<bool>>> = Lazy::new(|| Arc::new(RwLock::new(false)));

/// Correlation ID generator for request tracing
static CORRELATION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Initialize metrics system with Prometheus exporter
///
/// Idempotent: a second call is a no-op.
///
/// # Arguments
/// * `addr` - Socket address to bind Prometheus scrape endpoint (e.g., "0.0.0.0:9090")
pub async fn init_metrics(addr: SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    let mut initialized = METRICS_INITIALIZED.write().await;
    if *initialized {
        debug!("Metrics already initialized, skipping");
        return Ok(());
    }

    info!("Initializing metrics system on {}", addr);

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        "api_requests_total",
        Unit::Count,
        "Total number of HTTP requests made to the brokerage API"
    );
    describe_counter!(
        "api_429_responses_total",
        Unit::Count,
        "Total number of 429 rate limit responses received"
    );
    describe_counter!("api_retries_total", Unit::Count, "Total number of retries scheduled");
    describe_histogram!(
        "api_request_duration_seconds",
        Unit::Seconds,
        "HTTP request duration in seconds"
    );
    describe_histogram!(
        "api_retry_backoff_seconds",
        Unit::Seconds,
        "Delay slept before a retry"
    );
    describe_histogram!(
        "rate_limit_wait_seconds",
        Unit::Seconds,
        "Time spent waiting for a rate limit slot"
    );
    describe_gauge!(
        "rate_limit_in_window",
        Unit::Count,
        "Requests recorded inside the current rate limit window"
    );
    describe_counter!("cache_hits_total", Unit::Count, "Response cache hits");
    describe_counter!("cache_misses_total", Unit::Count, "Response cache misses");
    describe_counter!(
        "syncs_completed_total",
        Unit::Count,
        "Resources synced successfully"
    );
    describe_counter!("syncs_failed_total", Unit::Count, "Resources that failed to sync");

    *initialized = true;
    info!("Metrics system initialized successfully on {}", addr);
    Ok(())
}

/// Check if metrics system is initialized
pub async fn is_initialized() -> bool {
    *METRICS_INITIALIZED.read().await
}

/// Generate a new correlation ID for request tracing
pub fn generate_correlation_id() -> String {
    let id = CORRELATION_COUNTER.fetch_add(1, Ordering::Relaxed) + 1;
    format!("req-{id:08x}")
}

/// Timing and outcome of one HTTP request
pub struct HttpRequestMetrics {
    endpoint: String,
    start_time: Instant,
    correlation_id: String,
    attempt: u32,
}

impl HttpRequestMetrics {
    /// Start recording a new HTTP request
    pub fn start(endpoint: impl Into<String>, attempt: u32) -> Self {
        let endpoint = endpoint.into();
        let correlation_id = generate_correlation_id();

        debug!(
            correlation_id = %correlation_id,
            endpoint = %endpoint,
            attempt = attempt,
            "Sending API request"
        );

        Self {
            endpoint,
            start_time: Instant::now(),
            correlation_id,
            attempt,
        }
    }

    /// Record completion of the HTTP request
    pub fn record_complete(&self, status_code: u16) {
        let duration = self.start_time.elapsed();

        counter!(
            "api_requests_total",
            "endpoint" => self.endpoint.clone(),
            "status" => status_code.to_string(),
        )
        .increment(1);
        histogram!(
            "api_request_duration_seconds",
            "endpoint" => self.endpoint.clone(),
        )
        .record(duration.as_secs_f64());

        if status_code == 429 {
            counter!(
                "api_429_responses_total",
                "endpoint" => self.endpoint.clone(),
            )
            .increment(1);

            warn!(
                correlation_id = %self.correlation_id,
                endpoint = %self.endpoint,
                attempt = self.attempt,
                "Rate limit response (429) received"
            );
        }

        debug!(
            correlation_id = %self.correlation_id,
            endpoint = %self.endpoint,
            status = status_code,
            duration_ms = duration.as_millis(),
            "API request completed"
        );
    }

    /// Record a transport failure (no status code)
    pub fn record_network_error(&self) {
        let duration = self.start_time.elapsed();

        counter!(
            "api_requests_total",
            "endpoint" => self.endpoint.clone(),
            "status" => "network_error",
        )
        .increment(1);
        histogram!(
            "api_request_duration_seconds",
            "endpoint" => self.endpoint.clone(),
        )
        .record(duration.as_secs_f64());

        warn!(
            correlation_id = %self.correlation_id,
            endpoint = %self.endpoint,
            attempt = self.attempt,
            duration_ms = duration.as_millis(),
            "Network error recorded"
        );
    }

    /// Get the correlation ID for this request
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }
}

/// Record a scheduled retry and its backoff
pub fn record_retry_backoff(endpoint: &str, duration: Duration, attempt: u32) {
    counter!(
        "api_retries_total",
        "endpoint" => endpoint.to_string(),
    )
    .increment(1);
    histogram!(
        "api_retry_backoff_seconds",
        "endpoint" => endpoint.to_string(),
    )
    .record(duration.as_secs_f64());

    debug!(
        endpoint,
        attempt = attempt,
        backoff_ms = duration.as_millis(),
        "Retry backoff recorded"
    );
}

/// Record time spent waiting for a rate limit slot
pub fn record_rate_limit_wait(endpoint: &str, wait: Duration) {
    histogram!(
        "rate_limit_wait_seconds",
        "endpoint" => endpoint.to_string(),
    )
    .record(wait.as_secs_f64());
}

/// Update the in-window request gauge for an endpoint
pub fn update_in_window(endpoint: &str, in_window: usize) {
    gauge!(
        "rate_limit_in_window",
        "endpoint" => endpoint.to_string(),
    )
    .set(in_window as f64);
}

/// Record a response cache lookup
pub fn record_cache_lookup(hit: bool) {
    if hit {
        counter!("cache_hits_total").increment(1);
    } else {
        counter!("cache_misses_total").increment(1);
    }
}

/// Per-resource sync metrics
pub struct SyncMetrics {
    resource: String,
    start_time: Instant,
}

impl SyncMetrics {
    /// Start tracking a resource sync
    pub fn start(resource: impl Into<String>) -> Self {
        let resource = resource.into();
        info!(resource = %resource, "Resource sync started");

        Self {
            resource,
            start_time: Instant::now(),
        }
    }

    /// Record successful completion
    pub fn record_success(&self, rows: usize) {
        let duration = self.start_time.elapsed();

        counter!(
            "syncs_completed_total",
            "resource" => self.resource.clone(),
        )
        .increment(1);

        info!(
            resource = %self.resource,
            rows = rows,
            duration_ms = duration.as_millis(),
            "Resource sync completed"
        );
    }

    /// Record failure, labelled by error kind
    pub fn record_failure(&self, kind: &str) {
        let duration = self.start_time.elapsed();

        counter!(
            "syncs_failed_total",
            "resource" => self.resource.clone(),
            "error" => kind.to_string(),
        )
        .increment(1);

        error!(
            resource = %self.resource,
            error = %kind,
            duration_ms = duration.as_millis(),
            "Resource sync failed"
        );
    }
}
