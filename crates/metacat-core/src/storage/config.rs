//! Store configuration.

use std::path::PathBuf;

use metacat_proto::DEFAULT_CATALOG_NAME;

use crate::error::Error;

/// Configuration for the catalog store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Path to the database directory.
    pub path: PathBuf,

    /// Page cache capacity in bytes.
    pub cache_capacity: u64,

    /// Flush interval in milliseconds. None means flush on every write.
    pub flush_every_ms: Option<u64>,

    /// Enable zstd compression.
    pub compression: bool,

    /// Temporary database (deleted on drop).
    pub temporary: bool,

    /// Root location of the default catalog.
    pub warehouse: String,

    /// Name of the catalog bootstrapped on first open.
    pub default_catalog: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./metacat_data"),
            cache_capacity: 256 * 1024 * 1024, // 256MB
            flush_every_ms: Some(1000),
            compression: true,
            temporary: false,
            warehouse: "file:/user/hive/warehouse".to_string(),
            default_catalog: DEFAULT_CATALOG_NAME.to_string(),
        }
    }
}

impl StoreConfig {
    /// Create a new configuration with the given path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Create a temporary in-memory configuration for testing.
    pub fn temporary() -> Self {
        Self {
            path: PathBuf::from(""),
            temporary: true,
            ..Default::default()
        }
    }

    /// Set the warehouse root.
    pub fn with_warehouse(mut self, warehouse: impl Into<String>) -> Self {
        self.warehouse = warehouse.into();
        self
    }

    /// Set the page cache capacity.
    pub fn with_cache_capacity(mut self, bytes: u64) -> Self {
        self.cache_capacity = bytes;
        self
    }

    /// Set the flush interval.
    pub fn with_flush_every_ms(mut self, ms: Option<u64>) -> Self {
        self.flush_every_ms = ms;
        self
    }

    /// Open the sled database described by this configuration.
    pub fn open_db(&self) -> Result<sled::Db, Error> {
        Ok(self.to_sled_config().open()?)
    }

    /// Convert to sled configuration.
    pub(crate) fn to_sled_config(&self) -> sled::Config {
        let mut config = sled::Config::new()
            .cache_capacity(self.cache_capacity)
            .use_compression(self.compression);

        if self.temporary {
            config = config.temporary(true);
        } else {
            config = config.path(&self.path);
        }

        if let Some(ms) = self.flush_every_ms {
            config = config.flush_every_ms(Some(ms));
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.default_catalog, "hive");
        assert!(!config.temporary);
        assert!(config.compression);
    }

    #[test]
    fn test_temporary_opens() {
        let config = StoreConfig::temporary().with_warehouse("file:/tmp/warehouse");
        assert_eq!(config.warehouse, "file:/tmp/warehouse");
        let db = config.open_db().unwrap();
        assert!(db.is_empty());
    }

    #[test]
    fn test_on_disk_path() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::new(dir.path().join("meta"));
        let db = config.open_db().unwrap();
        db.insert(b"k", b"v".to_vec()).unwrap();
        db.flush().unwrap();
        assert!(dir.path().join("meta").exists());
    }
}
