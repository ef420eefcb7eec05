//! Boundary Adapters
//!
//! Concrete implementations of the domain ports:
//! - Blob stores: in-memory, local filesystem
//! - Catalogs: in-memory, JSON file
//! - Origin: HTTP (reqwest)

pub mod fs;
pub mod http;
pub mod json_catalog;
pub mod memory;

pub use fs::FsBlobStore;
pub use http::{HttpOrigin, OriginConfig};
pub use json_catalog::JsonFileCatalog;
pub use memory::{MemoryBlobStore, MemoryCatalog};

use crate::domain::ports::{BlobStoreRef, CatalogStoreRef};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

// =============================================================================
// Blob Store Selection
// =============================================================================

/// Blob store implementation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlobStoreKind {
    Memory,
    Filesystem,
}

/// Managed blob store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BlobStoreConfig {
    pub kind: BlobStoreKind,
    /// Root directory (filesystem store only)
    pub root_path: PathBuf,
    /// Public URL prefix of every managed blob
    pub base_url: String,
}

impl Default for BlobStoreConfig {
    fn default() -> Self {
        Self {
            kind: BlobStoreKind::Filesystem,
            root_path: PathBuf::from("./blobs"),
            base_url: "http://localhost:8080/blobs".to_string(),
        }
    }
}

impl BlobStoreConfig {
    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(Error::Configuration("blob_store.base_url must be set".to_string()));
        }
        Ok(())
    }
}

/// Build the configured blob store
pub fn blob_store(config: &BlobStoreConfig) -> BlobStoreRef {
    match config.kind {
        BlobStoreKind::Memory => Arc::new(MemoryBlobStore::new(config.base_url.clone())),
        BlobStoreKind::Filesystem => Arc::new(FsBlobStore::new(
            config.root_path.clone(),
            config.base_url.clone(),
        )),
    }
}

// =============================================================================
// Catalog Selection
// =============================================================================

/// Catalog implementation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CatalogKind {
    Memory,
    Json,
}

/// Document database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub kind: CatalogKind,
    /// Catalog file (JSON catalog only)
    pub path: PathBuf,
    /// Collection holding the asset records
    pub collection: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            kind: CatalogKind::Json,
            path: PathBuf::from("./catalog.json"),
            collection: "products".to_string(),
        }
    }
}

impl CatalogConfig {
    pub fn validate(&self) -> Result<()> {
        if self.collection.trim().is_empty() {
            return Err(Error::Configuration("catalog.collection must be set".to_string()));
        }
        Ok(())
    }
}

/// Build the configured catalog
pub fn catalog(config: &CatalogConfig) -> CatalogStoreRef {
    match config.kind {
        CatalogKind::Memory => Arc::new(MemoryCatalog::new()),
        CatalogKind::Json => Arc::new(JsonFileCatalog::new(config.path.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_factories_follow_kind() {
        let store = blob_store(&BlobStoreConfig {
            kind: BlobStoreKind::Memory,
            base_url: "mem://blobs".to_string(),
            ..Default::default()
        });
        assert!(store.is_managed("mem://blobs/products/a.jpg"));

        let config: CatalogConfig = serde_yaml::from_str("kind: memory").unwrap();
        assert_eq!(config.kind, CatalogKind::Memory);
        assert_eq!(config.collection, "products");
    }

    #[test]
    fn test_validation() {
        let config = BlobStoreConfig {
            base_url: " ".to_string(),
            ..Default::default()
        };
        assert_matches!(config.validate(), Err(Error::Configuration(_)));

        let config = CatalogConfig {
            collection: String::new(),
            ..Default::default()
        };
        assert_matches!(config.validate(), Err(Error::Configuration(_)));
    }
}
