//! CSV row sink: one file per resource

use csv::Writer;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::schema::{HeaderMapping, Row};

use super::{OutputError, OutputResult, RowSink};

const DEFAULT_BUFFER_SIZE: usize = 8192; // 8KB buffer

/// Writes `<dir>/<resource key in lowercase>.csv`, replacing earlier content
#[derive(Debug, Clone)]
pub struct CsvRowSink {
    dir: PathBuf,
    buffer_size: usize,
}

impl CsvRowSink {
    /// Create a sink writing into `dir`
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self::new_with_buffer_size(dir, DEFAULT_BUFFER_SIZE)
    }

    /// Create a sink with a custom write buffer size
    pub fn new_with_buffer_size<P: AsRef<Path>>(dir: P, buffer_size: usize) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            buffer_size,
        }
    }

    /// File written for `resource_key`
    pub fn path_for(&self, resource_key: &str) -> PathBuf {
        self.dir.join(format!("{}.csv", resource_key.to_lowercase()))
    }
}

impl RowSink for CsvRowSink {
    fn write_rows(
        &self,
        resource_key: &str,
        columns: &[HeaderMapping],
        rows: &[Row],
    ) -> OutputResult<()> {
        let path = self.path_for(resource_key);
        debug!(path = %path.display(), rows = rows.len(), "Writing CSV");

        std::fs::create_dir_all(&self.dir)
            .map_err(|e| OutputError::IoError(format!("Failed to create directory: {e}")))?;
        let file = File::create(&path)
            .map_err(|e| OutputError::IoError(format!("Failed to create file: {e}")))?;
        let mut writer = Writer::from_writer(BufWriter::with_capacity(self.buffer_size, file));

        writer
            .write_record(columns.iter().map(|c| c.display_name.as_str()))
            .map_err(|e| OutputError::CsvError(format!("Failed to write header: {e}")))?;
        for row in rows {
            writer
                .write_record(row.iter().map(ToString::to_string))
                .map_err(|e| OutputError::CsvError(format!("Failed to write row: {e}")))?;
        }

        writer
            .flush()
            .map_err(|e| OutputError::IoError(format!("Failed to flush: {e}")))?;
        let buf_writer = writer
            .into_inner()
            .map_err(|e| OutputError::IoError(format!("Failed to get inner writer: {e}")))?;
        let file = buf_writer
            .into_inner()
            .map_err(|e| OutputError::IoError(format!("Failed to get file handle: {e}")))?;
        file.sync_all()
            .map_err(|e| OutputError::IoError(format!("Failed to sync file: {e}")))?;

        info!(
            resource = resource_key,
            path = %path.display(),
            rows = rows.len(),
            columns = columns.len(),
            "CSV written"
        );
        Ok(())
    }
}
