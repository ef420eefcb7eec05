//! Test doubles for the boundary ports

use crate::backends::{MemoryBlobStore, MemoryCatalog};
use crate::cache::entry::{CacheEntry, CacheKey, EntryInfo};
use crate::cache::storage::{BackendKind, StorageBackend};
use crate::domain::ports::{
    AssetRecord, BlobInfo, BlobMetadata, BlobStore, CatalogStore, FetchedAsset, OriginFetcher,
    RecordPatch, StoredBlob,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::{DashMap, DashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

// =============================================================================
// Origin
// =============================================================================

/// Origin serving a fixed set of URLs; anything else is a network error
#[derive(Clone, Default)]
pub struct StaticOrigin {
    assets: Arc<DashMap<String, FetchedAsset>>,
    stalled: Arc<DashSet<String>>,
    fetches: Arc<DashMap<String, u64>>,
}

impl StaticOrigin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_asset(self, url: &str, bytes: &[u8], content_type: Option<&str>) -> Self {
        self.assets.insert(
            url.to_string(),
            FetchedAsset {
                bytes: Bytes::copy_from_slice(bytes),
                content_type: content_type.map(str::to_string),
            },
        );
        self
    }

    /// Requests for `url` hang for a long time
    pub fn with_stall(self, url: &str) -> Self {
        self.stalled.insert(url.to_string());
        self
    }

    pub fn fetch_count(&self, url: &str) -> u64 {
        self.fetches.get(url).map(|c| *c).unwrap_or(0)
    }

    pub fn total_fetches(&self) -> u64 {
        self.fetches.iter().map(|c| *c.value()).sum()
    }
}

#[async_trait]
impl OriginFetcher for StaticOrigin {
    async fn fetch(&self, url: &str) -> Result<FetchedAsset> {
        *self.fetches.entry(url.to_string()).or_insert(0) += 1;
        if self.stalled.contains(url) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        self.assets
            .get(url)
            .map(|asset| asset.clone())
            .ok_or_else(|| Error::network(url, "HTTP 404 Not Found"))
    }
}

// =============================================================================
// Blob Store
// =============================================================================

/// Memory blob store with injectable failures
pub struct FlakyBlobStore {
    inner: MemoryBlobStore,
    failing_puts: AtomicU32,
    failing_deletes: DashSet<String>,
    put_attempts: AtomicU64,
}

impl FlakyBlobStore {
    pub fn new(base_url: &str) -> Self {
        Self {
            inner: MemoryBlobStore::new(base_url),
            failing_puts: AtomicU32::new(0),
            failing_deletes: DashSet::new(),
            put_attempts: AtomicU64::new(0),
        }
    }

    /// The next `count` puts fail with a network error
    pub fn fail_next_puts(&self, count: u32) {
        self.failing_puts.store(count, Ordering::SeqCst);
    }

    /// Deletes of `path` always fail
    pub fn fail_delete(&self, path: &str) {
        self.failing_deletes.insert(path.to_string());
    }

    pub fn put_attempts(&self) -> u64 {
        self.put_attempts.load(Ordering::SeqCst)
    }

    pub fn inner(&self) -> &MemoryBlobStore {
        &self.inner
    }
}

#[async_trait]
impl BlobStore for FlakyBlobStore {
    fn base_url(&self) -> &str {
        self.inner.base_url()
    }

    async fn put(&self, path: &str, bytes: Bytes, metadata: BlobMetadata) -> Result<StoredBlob> {
        self.put_attempts.fetch_add(1, Ordering::SeqCst);
        let should_fail = self
            .failing_puts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(Error::network(self.url_for(path), "connection reset"));
        }
        self.inner.put(path, bytes, metadata).await
    }

    async fn list(&self, folder: &str) -> Result<Vec<BlobInfo>> {
        self.inner.list(folder).await
    }

    async fn delete(&self, path: &str) -> Result<()> {
        if self.failing_deletes.contains(path) {
            return Err(Error::BlobStore {
                operation: "delete".to_string(),
                path: path.to_string(),
                reason: "permission denied".to_string(),
            });
        }
        self.inner.delete(path).await
    }

    async fn get_metadata(&self, path: &str) -> Result<Option<BlobInfo>> {
        self.inner.get_metadata(path).await
    }
}

// =============================================================================
// Catalog
// =============================================================================

/// Memory catalog with injectable failures
#[derive(Default)]
pub struct FailingCatalog {
    inner: MemoryCatalog,
    failing_updates: DashSet<String>,
    fail_reads: AtomicBool,
}

impl FailingCatalog {
    pub fn with_records(collection: &str, records: Vec<AssetRecord>) -> Self {
        Self {
            inner: MemoryCatalog::with_records(collection, records),
            ..Default::default()
        }
    }

    /// Updates of record `id` always fail
    pub fn fail_update(&self, id: &str) {
        self.failing_updates.insert(id.to_string());
    }

    /// Every `get_all` fails
    pub fn fail_reads(&self) {
        self.fail_reads.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl CatalogStore for FailingCatalog {
    async fn get_all(&self, collection: &str) -> Result<Vec<AssetRecord>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Error::Catalog("database unreachable".to_string()));
        }
        self.inner.get_all(collection).await
    }

    async fn update(&self, collection: &str, id: &str, patch: RecordPatch) -> Result<()> {
        if self.failing_updates.contains(id) {
            return Err(Error::Catalog(format!("write rejected for {}", id)));
        }
        self.inner.update(collection, id, patch).await
    }
}

// =============================================================================
// Cache Storage
// =============================================================================

/// Storage backend whose every operation fails
pub struct FailingBackend;

#[async_trait]
impl StorageBackend for FailingBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Durable
    }

    async fn open(&self) -> Result<()> {
        Ok(())
    }

    async fn get(&self, _key: &CacheKey) -> Result<Option<CacheEntry>> {
        Err(unavailable())
    }

    async fn set(&self, _entry: CacheEntry) -> Result<()> {
        Err(unavailable())
    }

    async fn delete(&self, _key: &CacheKey) -> Result<bool> {
        Err(unavailable())
    }

    async fn clear(&self, _namespace: &str) -> Result<u64> {
        Err(unavailable())
    }

    async fn scan(&self, _namespace: &str) -> Result<Vec<EntryInfo>> {
        Err(unavailable())
    }
}

fn unavailable() -> Error {
    Error::StorageUnavailable {
        reason: "disk detached".to_string(),
    }
}
