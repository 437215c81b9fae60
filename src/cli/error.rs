//! CLI error types and conversions

use crate::api::ApiError;
use crate::output::OutputError;
use crate::registry::RegistryError;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Registry error
    #[error("registry error: {0}")]
    RegistryError(#[from] RegistryError),

    /// API error raised outside a resource sync
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// Output error
    #[error("output error: {0}")]
    OutputError(#[from] OutputError),

    /// Invalid argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    ConfigurationError(String),

    /// One or more resources failed to sync
    #[error("{failed} of {total} resources failed to sync")]
    SyncFailed {
        /// Failed resources
        failed: usize,
        /// Resources attempted
        total: usize,
    },
}
