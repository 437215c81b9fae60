//! Authenticated access to the brokerage REST API
//!
//! [`ApiClient`] combines the collaborators in this module: a transport that
//! performs raw GETs, a credential provider, the shared rate limiter, the
//! response cache and the retry policy.

pub mod cache;
pub mod client;
pub mod credentials;
pub mod pagination;
pub mod retry;
pub mod transport;

use std::time::Duration;

pub use cache::{cache_key, ResponseCache};
pub use client::ApiClient;
pub use credentials::{CredentialProvider, EnvCredentials, Environment, StaticCredentials};
pub use pagination::Page;
pub use retry::{
    is_retryable, FixedJitter, JitterSource, Outcome, RetryDecision, RetryErrorType, RetryPolicy,
    ThreadRngJitter,
};
pub use transport::{HttpResponse, HttpTransport, ReqwestTransport, TransportError, TransportErrorKind};

/// Configuration problems detected before (or instead of) a network call
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// No usable API credential
    #[error("missing API credential: {0}")]
    MissingCredential(String),

    /// Endpoint key not present in the registry
    #[error("unknown endpoint: {0}")]
    UnknownEndpoint(String),

    /// A required wait is longer than the configured ceiling
    #[error("endpoint {endpoint} requires waiting {wait:?}, above the {ceiling:?} ceiling")]
    WaitExceedsCeiling {
        /// Endpoint key
        endpoint: String,
        /// Wait that would have been needed
        wait: Duration,
        /// Configured ceiling
        ceiling: Duration,
    },

    /// Environment selector is neither `demo` nor `live`
    #[error("invalid environment: {0}")]
    InvalidEnvironment(String),

    /// Base URL and path could not be joined into a valid URL
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Errors raised by [`ApiClient`]
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Configuration problem
    #[error(transparent)]
    Configuration(#[from] ConfigError),

    /// HTTP 429 persisted through every attempt
    #[error("rate limit exceeded for {endpoint} after {attempts} attempts: {body}")]
    RateLimitExceeded {
        /// Endpoint key
        endpoint: String,
        /// Requests made
        attempts: u32,
        /// Body of the last response
        body: String,
    },

    /// 5xx or transport failure persisted through every attempt
    #[error("transient failure for {endpoint} after {attempts} attempts: {reason}")]
    TransientServer {
        /// Endpoint key
        endpoint: String,
        /// Requests made
        attempts: u32,
        /// Last HTTP status, absent for transport failures
        status: Option<u16>,
        /// Last response body or transport error message
        reason: String,
    },

    /// Non-retryable HTTP status
    #[error("request to {endpoint} rejected with HTTP {status}: {body}")]
    ClientRequest {
        /// Endpoint key
        endpoint: String,
        /// HTTP status code
        status: u16,
        /// Response body
        body: String,
        /// Requests made
        attempts: u32,
    },

    /// 2xx response whose body is not valid JSON
    #[error("invalid response from {endpoint}: {message}")]
    InvalidResponse {
        /// Endpoint key
        endpoint: String,
        /// Parse error
        message: String,
    },

    /// Pagination did not terminate within the page limit
    #[error("pagination for {endpoint} exceeded {max_pages} pages")]
    PaginationLimit {
        /// Endpoint key
        endpoint: String,
        /// Configured page limit
        max_pages: usize,
    },

    /// The server returned a next-page path that was already visited
    #[error("pagination for {endpoint} revisited {path}")]
    PaginationLoop {
        /// Endpoint key
        endpoint: String,
        /// Repeated next-page path
        path: String,
    },
}

/// Result type for API operations
pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    /// Short machine-readable kind, used in metrics labels and JSON output
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Configuration(ConfigError::MissingCredential(_)) => "missing_credential",
            ApiError::Configuration(ConfigError::UnknownEndpoint(_)) => "unknown_endpoint",
            ApiError::Configuration(ConfigError::WaitExceedsCeiling { .. }) => "wait_exceeds_ceiling",
            ApiError::Configuration(ConfigError::InvalidEnvironment(_)) => "invalid_environment",
            ApiError::Configuration(ConfigError::InvalidUrl(_)) => "invalid_url",
            ApiError::RateLimitExceeded { .. } => "rate_limit_exceeded",
            ApiError::TransientServer { .. } => "transient_server",
            ApiError::ClientRequest { .. } => "client_request",
            ApiError::InvalidResponse { .. } => "invalid_response",
            ApiError::PaginationLimit { .. } => "pagination_limit",
            ApiError::PaginationLoop { .. } => "pagination_loop",
        }
    }

    /// Last HTTP status involved, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::RateLimitExceeded { .. } => Some(429),
            ApiError::TransientServer { status, .. } => *status,
            ApiError::ClientRequest { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Endpoint key the error belongs to, if known
    pub fn endpoint(&self) -> Option<&str> {
        match self {
            ApiError::Configuration(ConfigError::UnknownEndpoint(endpoint))
            | ApiError::Configuration(ConfigError::WaitExceedsCeiling { endpoint, .. })
            | ApiError::RateLimitExceeded { endpoint, .. }
            | ApiError::TransientServer { endpoint, .. }
            | ApiError::ClientRequest { endpoint, .. }
            | ApiError::InvalidResponse { endpoint, .. }
            | ApiError::PaginationLimit { endpoint, .. }
            | ApiError::PaginationLoop { endpoint, .. } => Some(endpoint),
            ApiError::Configuration(_) => None,
        }
    }

    /// Number of requests made before giving up (zero when none were sent)
    pub fn attempts(&self) -> u32 {
        match self {
            ApiError::RateLimitExceeded { attempts, .. }
            | ApiError::TransientServer { attempts, .. }
            | ApiError::ClientRequest { attempts, .. } => *attempts,
            _ => 0,
        }
    }

    /// Remediation hint shown to the user after a failure
    pub fn suggestion(&self) -> &'static str {
        match self {
            ApiError::Configuration(ConfigError::MissingCredential(_)) => {
                "Set PORTFOLIO_API_KEY or pass --api-key"
            }
            ApiError::Configuration(ConfigError::UnknownEndpoint(_)) => {
                "Run the endpoints command to list configured resources"
            }
            ApiError::Configuration(ConfigError::WaitExceedsCeiling { .. }) => {
                "Raise --max-wait-secs or sync this resource separately"
            }
            ApiError::Configuration(ConfigError::InvalidEnvironment(_)) => {
                "Set PORTFOLIO_ENV to demo or live"
            }
            ApiError::Configuration(ConfigError::InvalidUrl(_)) => {
                "Check the endpoint paths in the registry file"
            }
            ApiError::RateLimitExceeded { .. } => RetryErrorType::RateLimit.suggestion(),
            ApiError::TransientServer { status: Some(code), .. } => {
                RetryErrorType::ServerError(*code).suggestion()
            }
            ApiError::TransientServer { status: None, .. } => {
                RetryErrorType::NetworkGeneric.suggestion()
            }
            ApiError::ClientRequest { status, .. } => {
                RetryErrorType::from_status(*status).suggestion()
            }
            ApiError::InvalidResponse { .. } => "The API returned malformed JSON, try again later",
            ApiError::PaginationLimit { .. } | ApiError::PaginationLoop { .. } => {
                "The API returned an endless page chain, report it to the provider"
            }
        }
    }
}
