//! Domain Ports - Boundary traits for the storefront asset subsystem
//!
//! The origin image host, the managed blob store and the document database
//! are external collaborators. These traits define the surface this crate
//! needs from them; adapters in [`crate::backends`] implement them.

use crate::error::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// =============================================================================
// Catalog Records
// =============================================================================

/// One catalog item and the asset references it serves
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetRecord {
    pub id: String,
    #[serde(default)]
    pub title: String,
    /// Currently servable asset references
    #[serde(default)]
    pub asset_refs: Vec<String>,
    /// The immediately-prior set of references (one level only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_refs_backup: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub migrated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restored_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl AssetRecord {
    /// Create a record with the given references and no history
    pub fn new(id: impl Into<String>, title: impl Into<String>, asset_refs: Vec<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            asset_refs,
            asset_refs_backup: None,
            migrated_at: None,
            restored_at: None,
            created_at: None,
        }
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    /// Label used in progress reports and error entries
    pub fn display_name(&self) -> &str {
        if self.title.is_empty() {
            &self.id
        } else {
            &self.title
        }
    }
}

/// Partial update of an [`AssetRecord`]; `None` fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_refs: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_refs_backup: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub migrated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restored_at: Option<DateTime<Utc>>,
}

impl RecordPatch {
    /// Apply the set fields to `record`
    pub fn apply(&self, record: &mut AssetRecord) {
        if let Some(refs) = &self.asset_refs {
            record.asset_refs = refs.clone();
        }
        if let Some(backup) = &self.asset_refs_backup {
            record.asset_refs_backup = Some(backup.clone());
        }
        if let Some(at) = self.migrated_at {
            record.migrated_at = Some(at);
        }
        if let Some(at) = self.restored_at {
            record.restored_at = Some(at);
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &RecordPatch::default()
    }
}

// =============================================================================
// Catalog Store Port
// =============================================================================

/// Document database holding catalog records
///
/// Only whole-collection reads and partial updates by id are used; there
/// are no cross-record transactions.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Load every record of a collection
    async fn get_all(&self, collection: &str) -> Result<Vec<AssetRecord>>;

    /// Apply a partial update to one record. Unknown ids are `NotFound`.
    async fn update(&self, collection: &str, id: &str, patch: RecordPatch) -> Result<()>;

    /// Load one record by id (client-side filter over `get_all`)
    async fn get(&self, collection: &str, id: &str) -> Result<Option<AssetRecord>> {
        Ok(self
            .get_all(collection)
            .await?
            .into_iter()
            .find(|record| record.id == id))
    }
}

pub type CatalogStoreRef = Arc<dyn CatalogStore>;

// =============================================================================
// Origin Fetcher Port
// =============================================================================

/// Raw bytes downloaded from the origin host
#[derive(Debug, Clone)]
pub struct FetchedAsset {
    pub bytes: Bytes,
    /// Content type reported by the origin, if any
    pub content_type: Option<String>,
}

/// Plain unauthenticated GET against the origin image host
#[async_trait]
pub trait OriginFetcher: Send + Sync {
    /// Download `url`. Non-success responses and transport failures are
    /// `Error::Network`.
    async fn fetch(&self, url: &str) -> Result<FetchedAsset>;
}

pub type OriginFetcherRef = Arc<dyn OriginFetcher>;

// =============================================================================
// Blob Store Port
// =============================================================================

/// Metadata attached to every uploaded blob
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobMetadata {
    pub original_size: u64,
    pub compressed_size: u64,
    pub uploaded_at: DateTime<Utc>,
    pub source_tag: String,
    pub content_type: String,
}

/// Listing entry for a stored blob
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobInfo {
    pub path: String,
    pub url: String,
    pub size: u64,
    pub content_type: String,
    #[serde(default)]
    pub metadata: Option<BlobMetadata>,
}

/// Result of a successful `put`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    pub path: String,
    pub url: String,
}

/// Managed object storage keyed by path
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Public URL prefix of every blob in this store
    fn base_url(&self) -> &str;

    /// Write `bytes` at `path`, replacing any existing blob
    async fn put(&self, path: &str, bytes: Bytes, metadata: BlobMetadata) -> Result<StoredBlob>;

    /// List every blob under `folder` (recursively)
    async fn list(&self, folder: &str) -> Result<Vec<BlobInfo>>;

    /// Delete the blob at `path`
    async fn delete(&self, path: &str) -> Result<()>;

    /// Look up a single blob
    async fn get_metadata(&self, path: &str) -> Result<Option<BlobInfo>>;

    /// Public URL for `path`, each segment percent-encoded
    fn url_for(&self, path: &str) -> String {
        let encoded: Vec<_> = path
            .trim_start_matches('/')
            .split('/')
            .map(urlencoding::encode)
            .collect();
        format!("{}/{}", self.base_url().trim_end_matches('/'), encoded.join("/"))
    }

    /// Whether `url` already points into this store
    fn is_managed(&self, url: &str) -> bool {
        self.path_for_url(url).is_some()
    }

    /// Inverse of [`BlobStore::url_for`]; `None` for foreign URLs
    fn path_for_url(&self, url: &str) -> Option<String> {
        let prefix = format!("{}/", self.base_url().trim_end_matches('/'));
        let rest = url.strip_prefix(&prefix)?;
        let rest = rest.split(['?', '#']).next().unwrap_or_default();
        if rest.is_empty() {
            return None;
        }
        Some(
            urlencoding::decode(rest)
                .map(|p| p.into_owned())
                .unwrap_or_else(|_| rest.to_string()),
        )
    }
}

pub type BlobStoreRef = Arc<dyn BlobStore>;

/// Reject empty identifiers before touching any collaborator
pub fn require_non_empty(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::Validation(format!("{} must not be empty", field)));
    }
    Ok(())
}
