//! Synchronization configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::{ContextMarker, Result};

/// Default number of mirror nodes refreshed per tick.
pub const DEFAULT_MAX_NODES_PER_SYNC: usize = 4;

/// Per-volume synchronization settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Upper limit on mesh refreshes per tick. 0 disables refreshing.
    ///
    /// Small values keep ticks cheap while editing, at the cost of the
    /// visible mesh lagging behind the voxel data for longer.
    pub max_nodes_per_sync: usize,
    /// Initial placement marker for freshly built mesh fragments.
    pub layer: ContextMarker,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_nodes_per_sync: DEFAULT_MAX_NODES_PER_SYNC,
            layer: 0,
        }
    }
}

impl SyncConfig {
    /// Config with the given refresh budget and defaults elsewhere.
    pub fn with_budget(max_nodes_per_sync: usize) -> Self {
        Self {
            max_nodes_per_sync,
            ..Self::default()
        }
    }

    /// Load from a JSON file. Missing fields fall back to defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Save as pretty-printed JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Error;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert_eq!(config.max_nodes_per_sync, 4);
        assert_eq!(config.layer, 0);
    }

    #[test]
    fn test_config_persistence() {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let path = temp_dir.path().join("nested").join("sync.json");

        let config = SyncConfig {
            max_nodes_per_sync: 16,
            layer: 8,
        };
        config.save(&path).expect("save failed");

        let loaded = SyncConfig::load(&path).expect("load failed");
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let path = temp_dir.path().join("sync.json");
        std::fs::write(&path, r#"{ "max_nodes_per_sync": 1 }"#).unwrap();

        let loaded = SyncConfig::load(&path).expect("load failed");
        assert_eq!(loaded.max_nodes_per_sync, 1);
        assert_eq!(loaded.layer, 0);
    }

    #[test]
    fn test_load_errors() {
        let temp_dir = TempDir::new().expect("failed to create temp dir");

        let missing = SyncConfig::load(&temp_dir.path().join("missing.json"));
        assert!(matches!(missing, Err(Error::Io(_))));

        let path = temp_dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(SyncConfig::load(&path), Err(Error::Config(_))));
    }
}
