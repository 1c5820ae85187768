//! # Application Configuration
//!
//! `entigraph.toml` holds everything a store needs besides its data:
//!
//! ```toml
//! [[schema]]
//! type = "post"
//! relations = { viewer = { target = "viewer" } }
//!
//! [[schema]]
//! type = "viewer"
//!
//! [gc.default]
//! ttl_ms = 604800000
//! max = 1000
//!
//! [gc.types.viewer]
//! max = 200
//!
//! [persist]
//! namespace = "feed"
//! version = 3
//!
//! [maintenance]
//! interval_secs = 60
//! ```

use entigraph_core::{
    EntigraphError, GarbageCollector, GcConfig, PersistConfig, SchemaDecl, SchemaRegistry,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default config file name, looked up in the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "entigraph.toml";

/// Maximum config file size (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

/// Settings of the `watch` loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    /// Seconds between two TTL/LRU passes.
    pub interval_secs: u64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self { interval_secs: 60 }
    }
}

/// Parsed `entigraph.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub schema: Vec<SchemaDecl>,
    pub gc: GcConfig,
    pub persist: PersistConfig,
    pub maintenance: MaintenanceConfig,
}

impl AppConfig {
    /// Parse a configuration document.
    pub fn from_toml(text: &str) -> Result<Self, EntigraphError> {
        toml::from_str(text).map_err(|e| EntigraphError::InvalidConfig(e.to_string()))
    }

    /// Read and parse a configuration file.
    pub fn load(path: &Path) -> Result<Self, EntigraphError> {
        let metadata = std::fs::metadata(path).map_err(|e| {
            EntigraphError::IoError(format!("Cannot read config '{}': {}", path.display(), e))
        })?;
        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(EntigraphError::InvalidConfig(format!(
                "Config file size {} bytes exceeds maximum allowed {} bytes",
                metadata.len(),
                MAX_CONFIG_FILE_SIZE
            )));
        }
        let text = std::fs::read_to_string(path).map_err(|e| {
            EntigraphError::IoError(format!("Cannot read config '{}': {}", path.display(), e))
        })?;
        Self::from_toml(&text)
    }

    /// Build and validate the schema registry.
    pub fn registry(&self) -> Result<SchemaRegistry, EntigraphError> {
        if self.schema.is_empty() {
            return Err(EntigraphError::InvalidConfig(
                "at least one [[schema]] entry is required".to_string(),
            ));
        }
        SchemaRegistry::from_decls(&self.schema)
    }

    /// Build a garbage collector whose policies are checked against `registry`.
    pub fn garbage_collector(
        &self,
        registry: &SchemaRegistry,
    ) -> Result<GarbageCollector, EntigraphError> {
        GarbageCollector::new(self.gc.clone(), registry)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = AppConfig::from_toml("").expect("parse");
        assert_eq!(config, AppConfig::default());
        assert!(config.registry().is_err());
    }

    #[test]
    fn maintenance_interval_is_read() {
        let config = AppConfig::from_toml("[maintenance]\ninterval_secs = 5\n").expect("parse");
        assert_eq!(config.maintenance.interval_secs, 5);
    }
}
