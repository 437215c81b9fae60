//! Header-mapping persistence
//!
//! [`JsonHeaderStore`] keeps every resource's mapping in one JSON file.
//! Writes go through a temp file in the same directory that atomically
//! replaces the target; an advisory lock file (fd-lock) coordinates
//! concurrent processes.

use fd_lock::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info, warn};

use crate::schema::HeaderMapping;

use super::{HeaderStore, OutputError, OutputResult};

/// Current header file schema version
const SCHEMA_VERSION: &str = "1.0.0";

/// Maximum allowed header file size (10 MB) to prevent memory exhaustion
pub const MAX_HEADER_FILE_SIZE: u64 = 10 * 1024 * 1024;

#[derive(Debug, Serialize, Deserialize)]
struct HeaderFile {
    schema_version: String,
    updated_at: i64,
    resources: BTreeMap<String, Vec<HeaderMapping>>,
}

impl HeaderFile {
    fn empty() -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            updated_at: chrono::Utc::now().timestamp_millis(),
            resources: BTreeMap::new(),
        }
    }
}

/// Header store backed by a single JSON file
#[derive(Debug)]
pub struct JsonHeaderStore {
    path: PathBuf,
    // Serializes writers inside this process; the lock file covers other processes.
    write_guard: Mutex<()>,
}

impl JsonHeaderStore {
    /// Store at `path` (created on first write)
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_guard: Mutex::new(()),
        }
    }

    /// Location of the JSON file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open_lock_file(&self) -> OutputResult<File> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| OutputError::IoError(e.to_string()))?;
            }
        }

        OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(self.path.with_extension("lock"))
            .map_err(|e| OutputError::LockError(format!("Failed to create lock file: {e}")))
    }

    /// Read the file without locking; a missing file is an empty store
    fn read_unlocked(&self) -> OutputResult<HeaderFile> {
        let metadata = match std::fs::metadata(&self.path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HeaderFile::empty()),
            Err(e) => return Err(OutputError::IoError(e.to_string())),
        };
        if metadata.len() > MAX_HEADER_FILE_SIZE {
            return Err(OutputError::FileTooLarge {
                size: metadata.len(),
                max: MAX_HEADER_FILE_SIZE,
            });
        }

        let contents =
            std::fs::read_to_string(&self.path).map_err(|e| OutputError::IoError(e.to_string()))?;
        let file: HeaderFile = serde_json::from_str(&contents).map_err(|e| {
            warn!(error = %e, path = %self.path.display(), "Failed to parse header file");
            OutputError::SerializationError(e.to_string())
        })?;

        if file.schema_version != SCHEMA_VERSION {
            return Err(OutputError::SchemaVersionMismatch {
                expected: SCHEMA_VERSION.to_string(),
                found: file.schema_version,
            });
        }
        Ok(file)
    }

    fn write_atomic(&self, file: &HeaderFile) -> OutputResult<()> {
        let json = serde_json::to_string_pretty(file)
            .map_err(|e| OutputError::SerializationError(e.to_string()))?;

        let parent_dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut temp_file = tempfile::NamedTempFile::new_in(parent_dir)
            .map_err(|e| OutputError::IoError(format!("Failed to create temp file: {e}")))?;
        temp_file
            .write_all(json.as_bytes())
            .map_err(|e| OutputError::IoError(format!("Failed to write to temp file: {e}")))?;
        temp_file
            .flush()
            .map_err(|e| OutputError::IoError(format!("Failed to flush temp file: {e}")))?;
        temp_file
            .as_file()
            .sync_all()
            .map_err(|e| OutputError::IoError(format!("Failed to sync temp file: {e}")))?;
        temp_file
            .persist(&self.path)
            .map_err(|e| OutputError::IoError(format!("Failed to persist temp file: {e}")))?;

        if let Ok(dir) = File::open(parent_dir) {
            let _ = dir.sync_all();
        }
        Ok(())
    }
}

impl HeaderStore for JsonHeaderStore {
    fn load(&self, resource_key: &str) -> OutputResult<Option<Vec<HeaderMapping>>> {
        let lock_file = self.open_lock_file()?;
        let lock = RwLock::new(lock_file);
        let _guard = lock
            .read()
            .map_err(|e| OutputError::LockError(format!("Failed to acquire read lock: {e}")))?;

        let file = self.read_unlocked()?;
        let mapping = file.resources.get(resource_key).cloned();
        debug!(
            resource = resource_key,
            found = mapping.is_some(),
            "Loaded header mapping"
        );
        Ok(mapping)
    }

    fn store(&self, resource_key: &str, mapping: &[HeaderMapping]) -> OutputResult<()> {
        let _local = self.write_guard.lock().unwrap_or_else(|e| e.into_inner());
        let lock_file = self.open_lock_file()?;
        let mut lock = RwLock::new(lock_file);
        let _guard = lock
            .write()
            .map_err(|e| OutputError::LockError(format!("Failed to acquire write lock: {e}")))?;

        let mut file = self.read_unlocked()?;
        file.resources
            .insert(resource_key.to_string(), mapping.to_vec());
        file.updated_at = chrono::Utc::now().timestamp_millis();
        self.write_atomic(&file)?;

        info!(
            resource = resource_key,
            columns = mapping.len(),
            path = %self.path.display(),
            "Header mapping saved"
        );
        Ok(())
    }
}

/// In-memory header store
#[derive(Debug, Default)]
pub struct MemoryHeaderStore {
    mappings: Mutex<HashMap<String, Vec<HeaderMapping>>>,
}

impl MemoryHeaderStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl HeaderStore for MemoryHeaderStore {
    fn load(&self, resource_key: &str) -> OutputResult<Option<Vec<HeaderMapping>>> {
        let mappings = self.mappings.lock().unwrap_or_else(|e| e.into_inner());
        Ok(mappings.get(resource_key).cloned())
    }

    fn store(&self, resource_key: &str, mapping: &[HeaderMapping]) -> OutputResult<()> {
        let mut mappings = self.mappings.lock().unwrap_or_else(|e| e.into_inner());
        mappings.insert(resource_key.to_string(), mapping.to_vec());
        Ok(())
    }
}
