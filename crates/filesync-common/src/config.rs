//! Configuration types for FileSync
//!
//! This module defines the configuration consumed by the metadata store.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Resource-id encoding scheme used by the persisted store.
///
/// Legacy stores kept document ids with a `file:`/`folder:` type prefix
/// in memory but persisted them stripped; modern stores persist ids
/// verbatim. The scheme is fixed per store and selected once at open.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdScheme {
    /// Persist resource ids verbatim
    #[default]
    Modern,
    /// Strip `file:`/`folder:` prefixes on write, restore them on read
    Legacy,
}

/// Metadata store configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Base directory for the metadata database file
    pub data_dir: PathBuf,
    /// Depth of the writer queue between the store and its persistence worker
    pub write_queue_depth: usize,
    /// Resource-id encoding scheme of the persisted store
    pub id_scheme: IdScheme,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./filesync"),
            write_queue_depth: 256,
            id_scheme: IdScheme::default(),
        }
    }
}

impl StoreConfig {
    /// Create config with a data directory
    pub fn with_data_dir(data_dir: impl AsRef<Path>) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = StoreConfig::default();
        assert_eq!(config.id_scheme, IdScheme::Modern);
        assert!(config.write_queue_depth > 0);
    }

    #[test]
    fn test_with_data_dir() {
        let config = StoreConfig::with_data_dir("/tmp/sync");
        assert_eq!(config.data_dir, PathBuf::from("/tmp/sync"));
        assert_eq!(config.write_queue_depth, StoreConfig::default().write_queue_depth);
    }
}
