//! Application Configuration
//!
//! Every section has defaults, so an empty (or absent) YAML file is a valid
//! configuration. Command-line flags override individual values after
//! loading.
//!
//! ```yaml
//! cache:
//!   durable_enabled: true
//!   durable:
//!     root_path: /var/cache/storefront
//!   default_ttl_secs: 300
//! blob_store:
//!   kind: filesystem
//!   root_path: /srv/blobs
//!   base_url: https://assets.example.com
//! catalog:
//!   kind: json
//!   path: ./catalog.json
//! migration:
//!   asset_timeout_secs: 60
//! ```

use crate::assets::UploaderConfig;
use crate::backends::{BlobStoreConfig, CatalogConfig, OriginConfig};
use crate::cache::{DurableBackendConfig, StorageHandle, IMAGES_NAMESPACE};
use crate::error::{Error, Result};
use crate::migration::MigrationConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

// =============================================================================
// Cache Configuration
// =============================================================================

/// Tiered cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Try the durable backend before falling back to memory
    pub durable_enabled: bool,
    pub durable: DurableBackendConfig,
    /// TTL used by `cache_set` when the caller gives none
    pub default_ttl_secs: u64,
    /// Namespaces swept for expired entries at startup
    pub sweep_namespaces: Vec<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            durable_enabled: true,
            durable: DurableBackendConfig::default(),
            default_ttl_secs: 300,
            sweep_namespaces: vec!["products".to_string(), IMAGES_NAMESPACE.to_string()],
        }
    }
}

impl CacheConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    /// Storage handle honoring `durable_enabled`
    pub fn storage_handle(&self) -> StorageHandle {
        if self.durable_enabled {
            StorageHandle::durable(self.durable.clone())
        } else {
            StorageHandle::ephemeral()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_ttl_secs == 0 {
            return Err(Error::Configuration("cache.default_ttl_secs must be positive".into()));
        }
        if !(1..=22).contains(&self.durable.compression.level) {
            return Err(Error::Configuration(format!(
                "cache.durable.compression.level must be within 1-22, got {}",
                self.durable.compression.level
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Application Configuration
// =============================================================================

/// Complete configuration of the asset service
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub cache: CacheConfig,
    pub origin: OriginConfig,
    pub uploader: UploaderConfig,
    pub blob_store: BlobStoreConfig,
    pub migration: MigrationConfig,
    pub catalog: CatalogConfig,
}

impl AppConfig {
    /// Parse a YAML document
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Load from a YAML file, or defaults when no file is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                debug!(path = %path.display(), "Loading configuration");
                let raw = std::fs::read_to_string(path).map_err(|e| {
                    Error::Configuration(format!("cannot read {}: {}", path.display(), e))
                })?;
                Self::from_yaml(&raw)?
            }
            None => Self::default(),
        };
        Ok(config)
    }

    /// Reject inconsistent values
    pub fn validate(&self) -> Result<()> {
        self.cache.validate()?;
        self.uploader.validate()?;
        self.blob_store.validate()?;
        self.migration.validate()?;
        self.catalog.validate()?;
        if self.origin.request_timeout_secs == 0 {
            return Err(Error::Configuration(
                "origin.request_timeout_secs must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{BlobStoreKind, CatalogKind};
    use assert_matches::assert_matches;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.migration.asset_timeout_secs, 60);
        assert_eq!(config.origin.request_timeout_secs, 30);
        assert!(config.cache.sweep_namespaces.contains(&"images".to_string()));
    }

    #[test]
    fn test_partial_yaml_keeps_other_defaults() {
        let config = AppConfig::from_yaml(
            r#"
cache:
  durable_enabled: false
  default_ttl_secs: 60
blob_store:
  kind: memory
  base_url: mem://blobs
catalog:
  kind: memory
  collection: items
uploader:
  quality: 70
"#,
        )
        .unwrap();

        assert!(!config.cache.durable_enabled);
        assert_eq!(config.cache.default_ttl(), Duration::from_secs(60));
        assert_eq!(config.blob_store.kind, BlobStoreKind::Memory);
        assert_eq!(config.catalog.kind, CatalogKind::Memory);
        assert_eq!(config.catalog.collection, "items");
        assert_eq!(config.uploader.quality, 70);
        assert_eq!(config.uploader.max_width, 1920);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file_and_missing_file() {
        let mut file = NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"migration:\n  asset_timeout_secs: 5\n").unwrap();

        let config = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.migration.asset_timeout_secs, 5);

        assert_matches!(
            AppConfig::load(Some(Path::new("/nonexistent/storefront.yaml"))),
            Err(Error::Configuration(_))
        );
        assert!(AppConfig::load(None).is_ok());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.migration.asset_timeout_secs = 0;
        assert_matches!(config.validate(), Err(Error::Configuration(_)));

        let mut config = AppConfig::default();
        config.cache.durable.compression.level = 40;
        assert_matches!(config.validate(), Err(Error::Configuration(_)));

        assert_matches!(AppConfig::from_yaml("cache: [1, 2"), Err(Error::Yaml(_)));
    }
}
