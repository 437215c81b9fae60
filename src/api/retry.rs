//! Retry classification and delay computation
//!
//! Attempt numbers are 1-based: `attempt` is the number of the request that
//! just failed. Retryable outcomes (429, any 5xx, transport failures) are
//! retried while `attempt < max_attempts`.

use rand::Rng;
use std::time::Duration;

use crate::sync::config::{
    calculate_backoff, MAX_ATTEMPTS, MAX_JITTER_MS, RATE_LIMIT_BACKOFF_BASE_MS,
    SERVER_BACKOFF_BASE_MS,
};
use crate::RateLimit;

use super::transport::TransportErrorKind;

/// What a failed attempt produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// A non-2xx HTTP status
    Status(u16),
    /// No response at all
    Transport(TransportErrorKind),
}

/// Whether to retry, and after how long
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryDecision {
    /// Retry the request
    pub retry: bool,
    /// Delay before the next attempt (zero when not retrying)
    pub delay: Duration,
}

impl RetryDecision {
    fn give_up() -> Self {
        Self {
            retry: false,
            delay: Duration::ZERO,
        }
    }

    fn after(delay: Duration) -> Self {
        Self { retry: true, delay }
    }
}

/// Source of random jitter for 429 backoff
pub trait JitterSource: Send + Sync {
    /// Jitter in milliseconds, within `0..=max_ms`
    fn jitter_ms(&self, max_ms: u64) -> u64;
}

/// Uniform jitter from the thread-local RNG
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRngJitter;

impl JitterSource for ThreadRngJitter {
    fn jitter_ms(&self, max_ms: u64) -> u64 {
        rand::thread_rng().gen_range(0..=max_ms)
    }
}

/// Constant jitter, for deterministic tests
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedJitter(pub u64);

impl JitterSource for FixedJitter {
    fn jitter_ms(&self, max_ms: u64) -> u64 {
        self.0.min(max_ms)
    }
}

/// Decides whether a failed attempt is retried
pub struct RetryPolicy {
    max_attempts: u32,
    jitter: Box<dyn JitterSource>,
}

impl RetryPolicy {
    /// Policy with the default attempt cap and random jitter
    pub fn new() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            jitter: Box::new(ThreadRngJitter),
        }
    }

    /// Override the attempt cap
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Override the jitter source
    pub fn with_jitter(mut self, jitter: impl JitterSource + 'static) -> Self {
        self.jitter = Box::new(jitter);
        self
    }

    /// Total attempts allowed per logical request
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Decide whether to retry after `attempt` failed with `outcome`
    ///
    /// `rate_limit` is the endpoint's own limit; it shapes the 429 delay so
    /// retries line up with the window instead of hammering it.
    pub fn should_retry(
        &self,
        outcome: Outcome,
        attempt: u32,
        rate_limit: Option<&RateLimit>,
    ) -> RetryDecision {
        if !is_retryable(outcome) || attempt >= self.max_attempts {
            return RetryDecision::give_up();
        }

        let delay = match outcome {
            Outcome::Status(429) => {
                let jitter = self.jitter.jitter_ms(MAX_JITTER_MS);
                match rate_limit {
                    Some(limit) => {
                        let interval = limit.average_interval_ms();
                        let linear = u64::from(attempt).saturating_mul(interval) / 2;
                        Duration::from_millis(
                            interval.saturating_add(jitter).saturating_add(linear),
                        )
                    }
                    None => calculate_backoff(RATE_LIMIT_BACKOFF_BASE_MS, attempt)
                        .saturating_add(Duration::from_millis(jitter)),
                }
            }
            _ => calculate_backoff(SERVER_BACKOFF_BASE_MS, attempt),
        };

        RetryDecision::after(delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .finish_non_exhaustive()
    }
}

/// 429, any 5xx and every transport failure are retryable
pub fn is_retryable(outcome: Outcome) -> bool {
    match outcome {
        Outcome::Status(status) => status == 429 || (500..600).contains(&status),
        Outcome::Transport(_) => true,
    }
}

/// Classification of failures for user messaging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryErrorType {
    /// Network timeout
    NetworkTimeout,
    /// Connection refused, DNS failure, or other offline scenarios
    NetworkOffline,
    /// HTTP 429 rate limit exceeded
    RateLimit,
    /// HTTP 5xx server error
    ServerError(u16),
    /// HTTP 400 invalid request
    InvalidRequest,
    /// Authentication failures (401/403)
    AuthFailed(u16),
    /// Other non-retryable statuses
    ClientError(u16),
    /// Generic fallback when no better classification fits
    NetworkGeneric,
}

impl RetryErrorType {
    /// Classify an HTTP status
    pub fn from_status(status: u16) -> Self {
        match status {
            400 => Self::InvalidRequest,
            401 | 403 => Self::AuthFailed(status),
            429 => Self::RateLimit,
            500..=599 => Self::ServerError(status),
            _ => Self::ClientError(status),
        }
    }

    /// Classify an attempt outcome
    pub fn from_outcome(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Status(status) => Self::from_status(status),
            Outcome::Transport(TransportErrorKind::Timeout) => Self::NetworkTimeout,
            Outcome::Transport(TransportErrorKind::Connect) => Self::NetworkOffline,
            Outcome::Transport(TransportErrorKind::Other) => Self::NetworkGeneric,
        }
    }

    /// Short description used inside retry log messages
    pub fn description(&self) -> &'static str {
        match self {
            Self::NetworkTimeout => "network timeout",
            Self::NetworkOffline => "connection failed",
            Self::RateLimit => "rate limit exceeded",
            Self::ServerError(code) => match code {
                500 => "internal server error",
                502 => "bad gateway",
                503 => "service unavailable",
                504 => "gateway timeout",
                _ => "server error",
            },
            Self::InvalidRequest => "invalid request",
            Self::AuthFailed(code) => match code {
                401 => "authentication failed (401)",
                403 => "not permitted (403)",
                _ => "authentication failed",
            },
            Self::ClientError(code) => match code {
                404 => "resource not found",
                408 => "request timeout",
                _ => "client error",
            },
            Self::NetworkGeneric => "network error",
        }
    }

    /// Suggested remediation after a failure
    pub fn suggestion(&self) -> &'static str {
        match self {
            Self::NetworkTimeout => "Check your network connection and firewall settings",
            Self::NetworkOffline => "Verify internet connectivity and DNS resolution",
            Self::RateLimit => "Sync fewer resources at once or wait for the window to reset",
            Self::ServerError(_) => "The brokerage API may be experiencing issues, try again later",
            Self::InvalidRequest => "Check the query parameters configured for this resource",
            Self::AuthFailed(_) => "Verify your API key and the permissions granted to it",
            Self::ClientError(_) => "Review the endpoint path in the registry",
            Self::NetworkGeneric => "Check network connectivity and try again",
        }
    }
}
