//! Tiered Persistent Cache
//!
//! A namespaced TTL cache in front of catalog queries and remote images:
//! - **Durable tier**: entries written to local disk, survive restarts
//! - **Ephemeral tier**: in-process fallback when durable storage is disabled
//!   or cannot be opened
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Catalog / browsing code                              │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────────────┐        ┌──────────────────────────────────┐   │
//! │  │ CacheStore("products")│        │ ImageFetchCache ("images", 7d)   │   │
//! │  └──────────┬───────────┘        └───────────────┬──────────────────┘   │
//! │             └────────────────┬───────────────────┘                      │
//! │                      ┌───────┴────────┐                                 │
//! │                      │  TieredCache   │  TTL checks, lazy expiry        │
//! │                      └───────┬────────┘                                 │
//! │                      ┌───────┴────────┐                                 │
//! │                      │ StorageHandle  │  selects backend once           │
//! │                      └───┬────────┬───┘                                 │
//! │            ┌─────────────┘        └──────────────┐                      │
//! │   ┌────────┴────────┐                   ┌────────┴────────┐             │
//! │   │ DurableBackend  │                   │ EphemeralBackend│             │
//! │   │ (files + zstd)  │                   │ (DashMap)       │             │
//! │   └─────────────────┘                   └─────────────────┘             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use storefront_assets::cache::{StorageHandle, TieredCache};
//! use std::time::Duration;
//!
//! let cache = TieredCache::new(StorageHandle::ephemeral());
//! let products = cache.store("products", Duration::from_secs(300));
//!
//! products.set_json("featured", &vec!["p1", "p2"]).await;
//! let featured: Option<Vec<String>> = products.get_json("featured").await;
//! ```
//!
//! Backend failures never surface from this layer: a failed read is a miss
//! and a failed write is dropped, both logged at `warn`.

pub mod compression;
pub mod entry;
pub mod images;
pub mod metrics;
pub mod storage;

pub use compression::{CompressionAlgorithm, CompressionConfig, CompressionManager};
pub use entry::{CacheEntry, CacheKey, EntryInfo};
pub use images::{ImageCacheStat, ImageFetchCache, IMAGES_NAMESPACE, IMAGE_CACHE_TTL};
pub use metrics::{CacheMetrics, NamespaceMetrics, NamespaceMetricsSnapshot};
pub use storage::{
    BackendKind, DurableBackend, DurableBackendConfig, EphemeralBackend, NamespaceStats,
    StorageBackend, StorageBackendRef, StorageHandle,
};

use bytes::Bytes;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

// =============================================================================
// Tiered Cache
// =============================================================================

/// Namespaced TTL cache over a [`StorageBackend`]
pub struct TieredCache {
    storage: StorageHandle,
    metrics: CacheMetrics,
}

impl TieredCache {
    /// Create a cache over the given storage handle
    pub fn new(storage: StorageHandle) -> Arc<Self> {
        Arc::new(Self {
            storage,
            metrics: CacheMetrics::new(),
        })
    }

    /// Per-namespace handle with a default TTL
    pub fn store(self: &Arc<Self>, namespace: impl Into<String>, default_ttl: Duration) -> CacheStore {
        CacheStore {
            cache: self.clone(),
            namespace: namespace.into(),
            default_ttl,
        }
    }

    /// Kind of backend serving this cache
    pub async fn backend_kind(&self) -> BackendKind {
        self.storage.kind().await
    }

    /// Per-namespace counters
    pub fn metrics(&self) -> &CacheMetrics {
        &self.metrics
    }

    /// Look up a live entry, deleting it if it has expired
    pub async fn get_entry(&self, namespace: &str, key: &str) -> Option<CacheEntry> {
        let metrics = self.metrics.namespace(namespace);
        let backend = self.storage.backend().await;
        let cache_key = CacheKey::new(namespace, key);

        match backend.get(&cache_key).await {
            Ok(Some(entry)) if entry.is_expired() => {
                if let Err(e) = backend.delete(&cache_key).await {
                    metrics.record_backend_error();
                    warn!(key = %cache_key, error = %e, "Failed to delete expired cache entry");
                }
                metrics.record_expired(1);
                metrics.record_miss();
                debug!(key = %cache_key, "Cache entry expired");
                None
            }
            Ok(Some(entry)) => {
                metrics.record_hit();
                Some(entry)
            }
            Ok(None) => {
                metrics.record_miss();
                None
            }
            Err(e) => {
                metrics.record_backend_error();
                metrics.record_miss();
                warn!(key = %cache_key, error = %e, "Cache lookup failed, treating as miss");
                None
            }
        }
    }

    /// Look up a live value
    pub async fn get(&self, namespace: &str, key: &str) -> Option<Bytes> {
        self.get_entry(namespace, key).await.map(|e| e.value)
    }

    /// Look up and deserialize a live value
    pub async fn get_json<T: DeserializeOwned>(&self, namespace: &str, key: &str) -> Option<T> {
        let value = self.get(namespace, key).await?;
        match serde_json::from_slice(&value) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                warn!(namespace, key, error = %e, "Cached value could not be decoded, treating as miss");
                None
            }
        }
    }

    /// Store a prepared entry
    pub async fn set_entry(&self, entry: CacheEntry) -> bool {
        let metrics = self.metrics.namespace(&entry.key.namespace);
        let key = entry.key.clone();
        match self.storage.backend().await.set(entry).await {
            Ok(()) => {
                metrics.record_write();
                true
            }
            Err(e) => {
                metrics.record_backend_error();
                warn!(key = %key, error = %e, "Cache write failed");
                false
            }
        }
    }

    /// Store a value that expires `ttl` from now
    pub async fn set(&self, namespace: &str, key: &str, value: Bytes, ttl: Duration) -> bool {
        self.set_entry(CacheEntry::new(CacheKey::new(namespace, key), value, ttl))
            .await
    }

    /// Serialize and store a value
    pub async fn set_json<T: Serialize + ?Sized>(
        &self,
        namespace: &str,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> bool {
        match serde_json::to_vec(value) {
            Ok(encoded) => self.set(namespace, key, Bytes::from(encoded), ttl).await,
            Err(e) => {
                warn!(namespace, key, error = %e, "Value could not be encoded for caching");
                false
            }
        }
    }

    /// Remove a single entry
    pub async fn delete(&self, namespace: &str, key: &str) -> bool {
        let cache_key = CacheKey::new(namespace, key);
        match self.storage.backend().await.delete(&cache_key).await {
            Ok(deleted) => deleted,
            Err(e) => {
                self.metrics.namespace(namespace).record_backend_error();
                warn!(key = %cache_key, error = %e, "Cache delete failed");
                false
            }
        }
    }

    /// Remove every entry of a namespace
    pub async fn clear(&self, namespace: &str) -> u64 {
        match self.storage.backend().await.clear(namespace).await {
            Ok(removed) => {
                info!(namespace, removed, "Cleared cache namespace");
                removed
            }
            Err(e) => {
                self.metrics.namespace(namespace).record_backend_error();
                warn!(namespace, error = %e, "Cache clear failed");
                0
            }
        }
    }

    /// Remove every expired entry of a namespace
    pub async fn clear_expired(&self, namespace: &str) -> u64 {
        match self
            .storage
            .backend()
            .await
            .clear_expired(namespace, Utc::now())
            .await
        {
            Ok(removed) => {
                self.metrics.namespace(namespace).record_expired(removed);
                debug!(namespace, removed, "Removed expired cache entries");
                removed
            }
            Err(e) => {
                self.metrics.namespace(namespace).record_backend_error();
                warn!(namespace, error = %e, "Expired entry sweep failed");
                0
            }
        }
    }

    /// Startup sweep over several namespaces
    pub async fn sweep_expired(&self, namespaces: &[String]) -> u64 {
        let mut total = 0;
        for namespace in namespaces {
            total += self.clear_expired(namespace).await;
        }
        info!(namespaces = namespaces.len(), removed = total, "Startup cache sweep complete");
        total
    }

    /// Walk the entries of a namespace (empty on backend failure)
    pub async fn scan(&self, namespace: &str) -> Vec<EntryInfo> {
        match self.storage.backend().await.scan(namespace).await {
            Ok(entries) => entries,
            Err(e) => {
                self.metrics.namespace(namespace).record_backend_error();
                warn!(namespace, error = %e, "Cache scan failed");
                Vec::new()
            }
        }
    }

    /// Summarize a namespace (zeroed on backend failure)
    pub async fn stats(&self, namespace: &str) -> NamespaceStats {
        match self.storage.backend().await.stats(namespace).await {
            Ok(stats) => stats,
            Err(e) => {
                self.metrics.namespace(namespace).record_backend_error();
                warn!(namespace, error = %e, "Cache stats failed");
                NamespaceStats::default()
            }
        }
    }
}

// =============================================================================
// Cache Store (per-namespace handle)
// =============================================================================

/// A [`TieredCache`] bound to one namespace with a default TTL
///
/// Built once at startup per namespace and passed to consumers.
#[derive(Clone)]
pub struct CacheStore {
    cache: Arc<TieredCache>,
    namespace: String,
    default_ttl: Duration,
}

impl CacheStore {
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// The underlying shared cache
    pub fn cache(&self) -> &Arc<TieredCache> {
        &self.cache
    }

    pub async fn get(&self, key: &str) -> Option<Bytes> {
        self.cache.get(&self.namespace, key).await
    }

    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.cache.get_json(&self.namespace, key).await
    }

    pub async fn set(&self, key: &str, value: Bytes) -> bool {
        self.cache
            .set(&self.namespace, key, value, self.default_ttl)
            .await
    }

    pub async fn set_with_ttl(&self, key: &str, value: Bytes, ttl: Duration) -> bool {
        self.cache.set(&self.namespace, key, value, ttl).await
    }

    pub async fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> bool {
        self.cache
            .set_json(&self.namespace, key, value, self.default_ttl)
            .await
    }

    pub async fn delete(&self, key: &str) -> bool {
        self.cache.delete(&self.namespace, key).await
    }

    pub async fn clear(&self) -> u64 {
        self.cache.clear(&self.namespace).await
    }

    pub async fn clear_expired(&self) -> u64 {
        self.cache.clear_expired(&self.namespace).await
    }

    pub async fn stats(&self) -> NamespaceStats {
        self.cache.stats(&self.namespace).await
    }
}

// =============================================================================
// Tests
// =============================================================================
