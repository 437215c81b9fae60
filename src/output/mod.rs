//! Row sinks, header-mapping stores and progress reporting

use tracing::info;

use crate::schema::{HeaderMapping, Row};

pub mod csv;
pub mod header_store;

pub use self::csv::CsvRowSink;
pub use header_store::{JsonHeaderStore, MemoryHeaderStore};

/// Output errors
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// CSV write error
    #[error("CSV error: {0}")]
    CsvError(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// File lock could not be taken
    #[error("lock error: {0}")]
    LockError(String),

    /// Stored file is larger than the accepted maximum
    #[error("file too large: {size} bytes (max: {max} bytes)")]
    FileTooLarge {
        /// Actual size
        size: u64,
        /// Accepted maximum
        max: u64,
    },

    /// Stored file has an unsupported schema version
    #[error("schema version mismatch: expected {expected}, found {found}")]
    SchemaVersionMismatch {
        /// Supported version
        expected: String,
        /// Version in the file
        found: String,
    },
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Destination for the rows of one synced resource
pub trait RowSink: Send + Sync {
    /// Replace the stored table for `resource_key`
    fn write_rows(
        &self,
        resource_key: &str,
        columns: &[HeaderMapping],
        rows: &[Row],
    ) -> OutputResult<()>;
}

/// Persistent column definitions per resource
pub trait HeaderStore: Send + Sync {
    /// Stored mapping for `resource_key`, if any
    fn load(&self, resource_key: &str) -> OutputResult<Option<Vec<HeaderMapping>>>;

    /// Persist the mapping for `resource_key`
    fn store(&self, resource_key: &str, mapping: &[HeaderMapping]) -> OutputResult<()>;
}

/// Receives human-readable progress messages
pub trait ProgressSink: Send + Sync {
    /// Report progress for `resource_key`; must not fail
    fn report(&self, resource_key: &str, message: &str);
}

/// Progress sink that logs at info level
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn report(&self, resource_key: &str, message: &str) {
        info!(resource = resource_key, "{message}");
    }
}
