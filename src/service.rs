//! Asset Service
//!
//! The operations the rest of the storefront calls: namespaced caching,
//! cached images, and the administrative migration surface. One instance is
//! built at startup and shared by reference.

use crate::assets::AssetUploader;
use crate::backends::{self, HttpOrigin};
use crate::cache::{CacheStore, ImageCacheStat, ImageFetchCache, TieredCache};
use crate::config::AppConfig;
use crate::domain::ports::{AssetRecord, BlobStoreRef, CatalogStoreRef, OriginFetcherRef};
use crate::error::Result;
use crate::migration::{
    BackupRestore, CleanupOptions, CleanupProgress, CleanupReport, MigrationPipeline,
    MigrationProgress, MigrationRun, MigrationStats, SnapshotEntry,
};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::info;

/// Facade over the cache, image cache, migration and backup components
pub struct AssetService {
    cache: Arc<TieredCache>,
    default_ttl: Duration,
    sweep_namespaces: Vec<String>,
    images: ImageFetchCache,
    pipeline: MigrationPipeline,
    backup: BackupRestore,
    managed_folder: String,
}

impl AssetService {
    /// Wire the service over explicit adapters
    pub fn new(
        config: &AppConfig,
        catalog: CatalogStoreRef,
        store: BlobStoreRef,
        origin: OriginFetcherRef,
    ) -> Self {
        let cache = TieredCache::new(config.cache.storage_handle());
        let collection = config.catalog.collection.clone();
        let uploader = Arc::new(AssetUploader::new(config.uploader.clone(), store.clone()));

        Self {
            images: ImageFetchCache::new(&cache, origin.clone()),
            pipeline: MigrationPipeline::new(
                collection.clone(),
                catalog.clone(),
                origin,
                uploader,
                &config.migration,
            ),
            backup: BackupRestore::new(collection, catalog, store),
            default_ttl: config.cache.default_ttl(),
            sweep_namespaces: config.cache.sweep_namespaces.clone(),
            managed_folder: config.uploader.folder.clone(),
            cache,
        }
    }

    /// Validate `config` and build every adapter it names
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        config.validate()?;
        let origin = Arc::new(
            HttpOrigin::new(&config.origin)?.with_body_limit(config.uploader.max_file_size),
        );
        Ok(Self::new(
            config,
            backends::catalog(&config.catalog),
            backends::blob_store(&config.blob_store),
            origin,
        ))
    }

    pub fn cache(&self) -> &Arc<TieredCache> {
        &self.cache
    }

    /// Per-namespace handle using the configured default TTL
    pub fn store(&self, namespace: &str) -> CacheStore {
        self.cache.store(namespace, self.default_ttl)
    }

    /// Remove expired entries from every configured namespace
    pub async fn startup_sweep(&self) -> u64 {
        let swept = self.cache.sweep_expired(&self.sweep_namespaces).await;
        let images = self.images.clear_expired().await;
        swept + images
    }

    // =========================================================================
    // Generic Cache
    // =========================================================================

    pub async fn cache_get(&self, namespace: &str, key: &str) -> Option<Bytes> {
        self.cache.get(namespace, key).await
    }

    pub async fn cache_get_json<T: DeserializeOwned>(&self, namespace: &str, key: &str) -> Option<T> {
        self.cache.get_json(namespace, key).await
    }

    /// Store a value; `ttl` defaults to the configured TTL
    pub async fn cache_set(
        &self,
        namespace: &str,
        key: &str,
        value: Bytes,
        ttl: Option<Duration>,
    ) -> bool {
        self.cache
            .set(namespace, key, value, ttl.unwrap_or(self.default_ttl))
            .await
    }

    pub async fn cache_set_json<T: Serialize + ?Sized>(
        &self,
        namespace: &str,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> bool {
        self.cache
            .set_json(namespace, key, value, ttl.unwrap_or(self.default_ttl))
            .await
    }

    pub async fn cache_delete(&self, namespace: &str, key: &str) -> bool {
        self.cache.delete(namespace, key).await
    }

    pub async fn cache_clear(&self, namespace: &str) -> u64 {
        self.cache.clear(namespace).await
    }

    // =========================================================================
    // Images
    // =========================================================================

    pub async fn get_cached_image(&self, url: &str) -> String {
        self.images.get_image(url).await
    }

    /// Recompute image statistics and push them to subscribers
    pub async fn image_stats(&self) -> ImageCacheStat {
        self.images.stats().await
    }

    pub fn subscribe_image_stats(&self) -> broadcast::Receiver<ImageCacheStat> {
        self.images.subscribe()
    }

    // =========================================================================
    // Migration
    // =========================================================================

    pub async fn migrate_all<F>(&self, on_progress: F) -> Result<MigrationRun>
    where
        F: FnMut(&MigrationProgress) + Send,
    {
        self.pipeline.migrate_all(on_progress).await
    }

    pub async fn restore_one(&self, id: &str) -> Result<AssetRecord> {
        self.backup.restore_one(id).await
    }

    pub async fn migration_stats(&self) -> Result<MigrationStats> {
        self.pipeline.stats().await
    }

    pub async fn snapshot_all(&self) -> Result<Vec<SnapshotEntry>> {
        self.backup.snapshot_all().await
    }

    /// Orphan cleanup, scoped to the managed upload folder unless the
    /// options name another one
    pub async fn cleanup_orphans<F>(
        &self,
        options: CleanupOptions,
        on_progress: F,
    ) -> Result<CleanupReport>
    where
        F: FnMut(&CleanupProgress) + Send,
    {
        let options = CleanupOptions {
            folder: options.folder.or_else(|| Some(self.managed_folder.clone())),
            ..options
        };
        info!(folder = ?options.folder, dry_run = options.dry_run, "Starting orphan cleanup");
        self.backup.cleanup_orphans(&options, on_progress).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::codec::sample_png;
    use crate::backends::{MemoryBlobStore, MemoryCatalog};
    use crate::domain::ports::{BlobMetadata, BlobStore, CatalogStore};
    use crate::error::Error;
    use crate::testing::StaticOrigin;
    use assert_matches::assert_matches;
    use chrono::Utc;

    fn config() -> AppConfig {
        AppConfig::from_yaml(
            r#"
cache:
  durable_enabled: false
blob_store:
  kind: memory
  base_url: mem://blobs
catalog:
  kind: memory
"#,
        )
        .unwrap()
    }

    fn service(records: Vec<AssetRecord>) -> (Arc<MemoryCatalog>, Arc<MemoryBlobStore>, AssetService) {
        let catalog = Arc::new(MemoryCatalog::with_records("products", records));
        let store = Arc::new(MemoryBlobStore::new("mem://blobs"));
        let origin = StaticOrigin::new().with_asset("http://cdn/a.jpg", &sample_png(4, 4), Some("image/png"));
        let service = AssetService::new(&config(), catalog.clone(), store.clone(), Arc::new(origin));
        (catalog, store, service)
    }

    #[tokio::test]
    async fn test_cache_operations_use_default_ttl() {
        let (_, _, service) = service(Vec::new());

        assert!(service.cache_set_json("products", "all", &vec![1, 2, 3], None).await);
        let all: Option<Vec<u32>> = service.cache_get_json("products", "all").await;
        assert_eq!(all, Some(vec![1, 2, 3]));

        assert!(service.cache_delete("products", "all").await);
        assert!(service.cache_get("products", "all").await.is_none());

        service.cache_set("images", "k", Bytes::from("v"), None).await;
        service.cache_set("products", "k", Bytes::from("v"), Some(Duration::from_secs(5))).await;
        assert_eq!(service.cache_clear("images").await, 1);
        assert!(service.cache_get("products", "k").await.is_some());
    }

    #[tokio::test]
    async fn test_images_and_stats() {
        let (_, _, service) = service(Vec::new());
        let mut stats_rx = service.subscribe_image_stats();

        assert!(service.get_cached_image("http://cdn/a.jpg").await.starts_with("data:image/png"));
        assert!(service.get_cached_image("http://cdn/a.jpg").await.starts_with("data:image/png"));
        assert_eq!(service.get_cached_image("http://cdn/x.jpg").await, "http://cdn/x.jpg");

        let stat = service.image_stats().await;
        assert_eq!((stat.total_requests, stat.cache_hits, stat.count), (3, 1, 1));
        assert_eq!(stats_rx.recv().await.unwrap(), stat);
    }

    #[tokio::test]
    async fn test_migration_surface_end_to_end() {
        let (catalog, store, service) = service(vec![
            AssetRecord::new("p1", "Mug", vec!["http://cdn/a.jpg".to_string()]),
            AssetRecord::new("p2", "Hat", vec![]),
        ]);
        // A leftover upload nobody references
        store
            .put(
                "products/stale.jpg",
                Bytes::from("x"),
                BlobMetadata {
                    original_size: 1,
                    compressed_size: 1,
                    uploaded_at: Utc::now(),
                    source_tag: "test".to_string(),
                    content_type: "image/jpeg".to_string(),
                },
            )
            .await
            .unwrap();

        let run = service.migrate_all(|_| {}).await.unwrap();
        assert_eq!((run.success, run.without_assets), (1, 1));

        let stats = service.migration_stats().await.unwrap();
        assert_eq!((stats.fully_migrated, stats.with_backup), (1, 1));

        let snapshot = service.snapshot_all().await.unwrap();
        assert!(snapshot[0].asset_refs[0].starts_with("mem://blobs/products/"));

        let report = service
            .cleanup_orphans(CleanupOptions::default(), |_| {})
            .await
            .unwrap();
        assert_eq!(report.orphans, vec!["products/stale.jpg".to_string()]);
        assert_eq!(report.deleted, 1);
        assert_eq!(store.len().await, 1);

        let restored = service.restore_one("p1").await.unwrap();
        assert_eq!(restored.asset_refs, vec!["http://cdn/a.jpg".to_string()]);
        let record = catalog.get("products", "p1").await.unwrap().unwrap();
        assert_eq!(record.asset_refs, vec!["http://cdn/a.jpg".to_string()]);

        assert_matches!(service.restore_one("p2").await, Err(Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_startup_sweep_runs_without_entries() {
        let (_, _, service) = service(Vec::new());
        assert_eq!(service.startup_sweep().await, 0);
    }

    #[test]
    fn test_from_config_rejects_invalid_config() {
        let mut config = config();
        config.uploader.upload_attempts = 0;
        assert!(matches!(
            AssetService::from_config(&config),
            Err(Error::Configuration(_))
        ));
    }
}
