//! Endpoint registry for the brokerage API
//!
//! The registry holds one [`EndpointDescriptor`] per logical resource: its path
//! under the versioned base URL, its documented rate limit, how long responses
//! may be cached, and the fallback column list used when a resource is empty.
//! Descriptors are immutable once loaded.

use serde::Deserialize;
use std::path::Path;
use tracing::{debug, info};

use crate::EndpointDescriptor;

/// Embedded registry data
const ENDPOINTS_JSON: &str = include_str!("endpoints.json");

/// Maximum accepted size of an external registry file (1 MB)
const MAX_REGISTRY_FILE_SIZE: u64 = 1024 * 1024;

/// Registry errors
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Registry JSON could not be parsed
    #[error("parse error: {0}")]
    ParseError(String),

    /// Registry file could not be read
    #[error("IO error: {0}")]
    IoError(String),

    /// A descriptor failed validation
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// Two descriptors share a key
    #[error("duplicate endpoint key: {0}")]
    DuplicateKey(String),

    /// No descriptor for the requested key
    #[error("endpoint not found: {0}")]
    NotFound(String),
}

#[derive(Debug, Deserialize)]
struct RawRegistry {
    schema_version: String,
    #[serde(default)]
    last_updated: Option<String>,
    endpoints: Vec<EndpointDescriptor>,
}

/// Registry of configured endpoints, in file order
#[derive(Debug, Clone)]
pub struct EndpointRegistry {
    schema_version: String,
    endpoints: Vec<EndpointDescriptor>,
}

impl EndpointRegistry {
    /// Load the embedded registry
    pub fn load_embedded() -> Result<Self, RegistryError> {
        Self::from_json(ENDPOINTS_JSON)
    }

    /// Load a registry from a JSON file
    pub fn from_file(path: &Path) -> Result<Self, RegistryError> {
        let metadata = std::fs::metadata(path)
            .map_err(|e| RegistryError::IoError(format!("{}: {e}", path.display())))?;
        if metadata.len() > MAX_REGISTRY_FILE_SIZE {
            return Err(RegistryError::IoError(format!(
                "{} is {} bytes, larger than the {MAX_REGISTRY_FILE_SIZE} byte limit",
                path.display(),
                metadata.len()
            )));
        }

        let json = std::fs::read_to_string(path)
            .map_err(|e| RegistryError::IoError(format!("{}: {e}", path.display())))?;
        let registry = Self::from_json(&json)?;
        info!(
            path = %path.display(),
            endpoints = registry.endpoints.len(),
            "Loaded endpoint registry from file"
        );
        Ok(registry)
    }

    /// Parse and validate a registry from a JSON string
    pub fn from_json(json: &str) -> Result<Self, RegistryError> {
        let raw: RawRegistry = serde_json::from_str(json)
            .map_err(|e| RegistryError::ParseError(format!("Failed to parse registry: {e}")))?;
        debug!(
            schema_version = %raw.schema_version,
            last_updated = ?raw.last_updated,
            "Parsed endpoint registry"
        );
        Self::from_descriptors(raw.schema_version, raw.endpoints)
    }

    /// Build a registry from descriptors
    pub fn from_descriptors(
        schema_version: impl Into<String>,
        endpoints: Vec<EndpointDescriptor>,
    ) -> Result<Self, RegistryError> {
        let mut seen = std::collections::HashSet::new();
        for endpoint in &endpoints {
            endpoint.validate().map_err(RegistryError::InvalidEndpoint)?;
            if !seen.insert(endpoint.key.to_uppercase()) {
                return Err(RegistryError::DuplicateKey(endpoint.key.clone()));
            }
        }

        Ok(Self {
            schema_version: schema_version.into(),
            endpoints,
        })
    }

    /// Schema version of the registry data
    pub fn schema_version(&self) -> &str {
        &self.schema_version
    }

    /// All descriptors, in registry order
    pub fn descriptors(&self) -> &[EndpointDescriptor] {
        &self.endpoints
    }

    /// All endpoint keys, in registry order
    pub fn keys(&self) -> Vec<&str> {
        self.endpoints.iter().map(|e| e.key.as_str()).collect()
    }

    /// Look up a descriptor by key (case-insensitive)
    pub fn get(&self, key: &str) -> Option<&EndpointDescriptor> {
        self.endpoints
            .iter()
            .find(|e| e.key.eq_ignore_ascii_case(key))
    }

    /// Look up a descriptor, failing when the key is unknown
    pub fn require(&self, key: &str) -> Result<&EndpointDescriptor, RegistryError> {
        self.get(key)
            .ok_or_else(|| RegistryError::NotFound(key.to_string()))
    }
}
