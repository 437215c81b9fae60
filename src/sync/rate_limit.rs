//! Sliding-window rate limiting per endpoint
//!
//! Every endpoint key owns a log of the timestamps at which requests were let
//! through. On each check the log is pruned to the trailing window; a request
//! may proceed while fewer than `max_requests` timestamps remain.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, trace};

use crate::clock::{SharedClock, TokioClock};
use crate::registry::EndpointRegistry;
use crate::RateLimit;

/// Result of a rate-limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    /// Whether the request may be sent now
    pub allowed: bool,
    /// Time until the oldest in-window request expires (zero when allowed)
    pub wait: Duration,
}

impl RateDecision {
    fn allowed() -> Self {
        Self {
            allowed: true,
            wait: Duration::ZERO,
        }
    }

    fn blocked(wait_ms: u64) -> Self {
        Self {
            allowed: false,
            wait: Duration::from_millis(wait_ms),
        }
    }
}

/// Per-endpoint sliding-window rate limiter
///
/// Shared between concurrent syncs through an [`Arc`]; the request log is
/// guarded by a mutex that is never held across an await point.
pub struct RateLimiter {
    limits: HashMap<String, RateLimit>,
    log: Mutex<HashMap<String, VecDeque<u64>>>,
    clock: SharedClock,
}

impl RateLimiter {
    /// Create a limiter with no configured limits
    pub fn new(clock: SharedClock) -> Self {
        Self {
            limits: HashMap::new(),
            log: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Create a limiter with one limit per registry endpoint
    pub fn from_registry(registry: &EndpointRegistry, clock: SharedClock) -> Self {
        let mut limiter = Self::new(clock);
        for descriptor in registry.descriptors() {
            limiter
                .limits
                .insert(descriptor.key.clone(), descriptor.rate_limit);
        }
        limiter
    }

    /// Create a shared limiter for a registry using the monotonic clock
    pub fn shared_for(registry: &EndpointRegistry) -> Arc<Self> {
        Arc::new(Self::from_registry(registry, TokioClock::shared()))
    }

    /// Configure (or replace) the limit for one endpoint key
    pub fn with_limit(mut self, key: impl Into<String>, limit: RateLimit) -> Self {
        self.limits.insert(key.into(), limit);
        self
    }

    /// Limit configured for an endpoint key
    pub fn limit_for(&self, key: &str) -> Option<RateLimit> {
        self.limits.get(key).copied()
    }

    /// Check whether a request for `key` may proceed now
    ///
    /// When allowed, the current time is recorded against the key. When not
    /// allowed, nothing is recorded and `wait` is the exact time until the
    /// oldest in-window request leaves the window.
    pub fn can_proceed(&self, key: &str) -> RateDecision {
        let Some(limit) = self.limits.get(key) else {
            trace!(endpoint = key, "No rate limit configured, allowing request");
            return RateDecision::allowed();
        };

        let now = self.clock.now_ms();
        let mut log = self.log.lock().unwrap_or_else(|e| e.into_inner());
        let timestamps = log.entry(key.to_string()).or_default();
        prune(timestamps, now, limit.window_ms);

        if timestamps.len() < limit.max_requests as usize {
            timestamps.push_back(now);
            debug!(
                endpoint = key,
                in_window = timestamps.len(),
                max_requests = limit.max_requests,
                "Rate limit slot granted"
            );
            return RateDecision::allowed();
        }

        // Window is full, so the log is non-empty.
        let oldest = timestamps.front().copied().unwrap_or(now);
        let wait_ms = limit.window_ms.saturating_sub(now.saturating_sub(oldest));
        debug!(
            endpoint = key,
            wait_ms = wait_ms,
            "Rate limit reached, request must wait"
        );
        RateDecision::blocked(wait_ms)
    }

    /// Number of requests recorded inside the current window for `key`
    pub fn in_flight(&self, key: &str) -> usize {
        let Some(limit) = self.limits.get(key) else {
            return 0;
        };
        let now = self.clock.now_ms();
        let log = self.log.lock().unwrap_or_else(|e| e.into_inner());
        log.get(key)
            .map(|timestamps| {
                timestamps
                    .iter()
                    .filter(|&&ts| now.saturating_sub(ts) < limit.window_ms)
                    .count()
            })
            .unwrap_or(0)
    }
}

/// Drop timestamps that are a full window (or more) old.
fn prune(timestamps: &mut VecDeque<u64>, now: u64, window_ms: u64) {
    while let Some(&oldest) = timestamps.front() {
        if now.saturating_sub(oldest) >= window_ms {
            timestamps.pop_front();
        } else {
            break;
        }
    }
}
