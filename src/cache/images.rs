//! Image Fetch Cache
//!
//! Cache-first retrieval of remote images. A miss downloads the image from
//! the origin, turns it into a self-contained `data:` URI and keeps it in the
//! `"images"` namespace for a fixed seven days. Fetch failures degrade to
//! returning the remote reference unchanged.
//!
//! Hit-rate statistics are recomputed on demand by [`ImageFetchCache::stats`]
//! and pushed to every subscriber.

use crate::assets::codec::content_type_of;
use crate::cache::entry::{CacheEntry, CacheKey};
use crate::cache::{CacheStore, TieredCache};
use crate::domain::ports::{FetchedAsset, OriginFetcherRef};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Namespace holding cached images
pub const IMAGES_NAMESPACE: &str = "images";

/// Fixed lifetime of a cached image
pub const IMAGE_CACHE_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

const STATS_CHANNEL_CAPACITY: usize = 16;

/// Aggregate statistics of the image cache
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageCacheStat {
    /// `get_image` calls since startup
    pub total_requests: u64,
    /// Calls answered from the cache
    pub cache_hits: u64,
    /// Entries currently stored
    pub count: u64,
    /// Raw image bytes currently stored
    pub total_bytes: u64,
    pub hit_rate_percent: f64,
}

// =============================================================================
// Image Fetch Cache
// =============================================================================

/// Fetch-through cache turning remote images into `data:` URIs
pub struct ImageFetchCache {
    store: CacheStore,
    origin: OriginFetcherRef,
    total_requests: AtomicU64,
    cache_hits: AtomicU64,
    stats_tx: broadcast::Sender<ImageCacheStat>,
}

impl ImageFetchCache {
    /// Create the image cache over the shared tiered cache
    pub fn new(cache: &Arc<TieredCache>, origin: OriginFetcherRef) -> Self {
        let (stats_tx, _) = broadcast::channel(STATS_CHANNEL_CAPACITY);
        Self {
            store: cache.store(IMAGES_NAMESPACE, IMAGE_CACHE_TTL),
            origin,
            total_requests: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            stats_tx,
        }
    }

    /// Subscribe to statistics published by [`ImageFetchCache::stats`]
    pub fn subscribe(&self) -> broadcast::Receiver<ImageCacheStat> {
        self.stats_tx.subscribe()
    }

    /// Return an embeddable representation of `remote_ref`
    ///
    /// Never fails: if the image is neither cached nor fetchable the
    /// reference itself is returned so the caller still has something to
    /// render.
    pub async fn get_image(&self, remote_ref: &str) -> String {
        self.total_requests.fetch_add(1, Ordering::Relaxed);

        if let Some(cached) = self.store.get(remote_ref).await {
            match String::from_utf8(cached.to_vec()) {
                Ok(data_uri) => {
                    self.cache_hits.fetch_add(1, Ordering::Relaxed);
                    debug!(url = %remote_ref, "Image cache hit");
                    return data_uri;
                }
                Err(_) => {
                    warn!(url = %remote_ref, "Cached image is not valid UTF-8, refetching");
                }
            }
        }

        let asset = match self.origin.fetch(remote_ref).await {
            Ok(asset) => asset,
            Err(e) => {
                warn!(url = %remote_ref, error = %e, "Image fetch failed, serving remote reference");
                return remote_ref.to_string();
            }
        };

        let data_uri = to_data_uri(&asset);
        let entry = CacheEntry::new(
            CacheKey::new(IMAGES_NAMESPACE, remote_ref),
            Bytes::from(data_uri.clone()),
            IMAGE_CACHE_TTL,
        )
        .with_size(asset.bytes.len() as u64);
        self.store.cache().set_entry(entry).await;

        debug!(url = %remote_ref, size = asset.bytes.len(), "Image cached");
        data_uri
    }

    /// Delete images older than the fixed seven-day policy
    ///
    /// Age is measured from `created_at`, whatever `expires_at` says.
    pub async fn clear_expired(&self) -> u64 {
        let now = Utc::now();
        let max_age = chrono::Duration::seconds(IMAGE_CACHE_TTL.as_secs() as i64);
        let mut removed = 0;

        for info in self.store.cache().scan(IMAGES_NAMESPACE).await {
            if now.signed_duration_since(info.created_at) > max_age
                && self.store.delete(&info.key.key).await
            {
                removed += 1;
            }
        }

        if removed > 0 {
            info!(removed, "Removed expired images");
        }
        removed
    }

    /// Remove every cached image
    pub async fn clear(&self) -> u64 {
        self.store.clear().await
    }

    /// Recompute statistics and push them to every subscriber
    pub async fn stats(&self) -> ImageCacheStat {
        let entries = self.store.cache().scan(IMAGES_NAMESPACE).await;
        let total_requests = self.total_requests.load(Ordering::Relaxed);
        let cache_hits = self.cache_hits.load(Ordering::Relaxed);

        let stat = ImageCacheStat {
            total_requests,
            cache_hits,
            count: entries.len() as u64,
            total_bytes: entries.iter().map(|e| e.size_bytes).sum(),
            hit_rate_percent: if total_requests == 0 {
                0.0
            } else {
                cache_hits as f64 / total_requests as f64 * 100.0
            },
        };

        // No subscribers is fine
        let _ = self.stats_tx.send(stat.clone());
        stat
    }
}

/// Encode fetched bytes as `data:<content-type>;base64,<payload>`
fn to_data_uri(asset: &FetchedAsset) -> String {
    let content_type = content_type_of(asset.content_type.as_deref(), &asset.bytes);
    format!("data:{};base64,{}", content_type, STANDARD.encode(&asset.bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::storage::StorageHandle;
    use crate::testing::StaticOrigin;

    const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

    fn image_cache(origin: StaticOrigin) -> (Arc<TieredCache>, ImageFetchCache) {
        let cache = TieredCache::new(StorageHandle::ephemeral());
        let images = ImageFetchCache::new(&cache, Arc::new(origin));
        (cache, images)
    }

    #[tokio::test]
    async fn test_miss_fetches_and_caches_data_uri() {
        let origin = StaticOrigin::new().with_asset("http://cdn/a.jpg", b"abc", Some("image/jpeg"));
        let (_, images) = image_cache(origin.clone());

        let first = images.get_image("http://cdn/a.jpg").await;
        assert_eq!(first, "data:image/jpeg;base64,YWJj");

        let second = images.get_image("http://cdn/a.jpg").await;
        assert_eq!(second, first);
        assert_eq!(origin.fetch_count("http://cdn/a.jpg"), 1);
    }

    #[tokio::test]
    async fn test_content_type_sniffed_when_missing() {
        let origin = StaticOrigin::new()
            .with_asset("http://cdn/a.png", PNG_MAGIC, None)
            .with_asset("http://cdn/blob", b"????", Some(" ; charset=binary"));
        let (_, images) = image_cache(origin);

        assert!(images
            .get_image("http://cdn/a.png")
            .await
            .starts_with("data:image/png;base64,"));
        assert!(images
            .get_image("http://cdn/blob")
            .await
            .starts_with("data:application/octet-stream;base64,"));
    }

    #[tokio::test]
    async fn test_fetch_failure_returns_reference_and_writes_nothing() {
        let (cache, images) = image_cache(StaticOrigin::new());

        let result = images.get_image("http://cdn/missing.jpg").await;
        assert_eq!(result, "http://cdn/missing.jpg");
        assert!(cache.scan(IMAGES_NAMESPACE).await.is_empty());

        let stat = images.stats().await;
        assert_eq!(stat.total_requests, 1);
        assert_eq!(stat.cache_hits, 0);
    }

    #[tokio::test]
    async fn test_stats_accuracy() {
        const N: usize = 5;
        let mut origin = StaticOrigin::new();
        let urls: Vec<String> = (0..N).map(|i| format!("http://cdn/{}.jpg", i)).collect();
        for url in &urls {
            origin = origin.with_asset(url, b"0123456789", Some("image/jpeg"));
        }
        let (_, images) = image_cache(origin);

        for url in &urls {
            images.get_image(url).await;
        }
        for url in &urls {
            images.get_image(url).await;
        }

        let stat = images.stats().await;
        assert_eq!(stat.cache_hits, N as u64);
        assert_eq!(stat.total_requests, 2 * N as u64);
        assert_eq!(stat.count, N as u64);
        assert_eq!(stat.total_bytes, 10 * N as u64);
        assert!((stat.hit_rate_percent - 50.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_stats_pushed_to_subscribers() {
        let (_, images) = image_cache(StaticOrigin::new());
        let mut first = images.subscribe();
        let mut second = images.subscribe();

        let stat = images.stats().await;
        assert_eq!(first.recv().await.unwrap(), stat);
        assert_eq!(second.recv().await.unwrap(), stat);
    }

    #[tokio::test]
    async fn test_clear_expired_uses_fixed_policy() {
        let (cache, images) = image_cache(StaticOrigin::new());
        let eight_days_ago = Utc::now() - chrono::Duration::days(8);

        // Stored with an unusually long TTL, still older than seven days
        cache
            .set_entry(CacheEntry::created_at(
                CacheKey::new(IMAGES_NAMESPACE, "http://cdn/old.jpg"),
                Bytes::from("data:image/jpeg;base64,AA=="),
                Duration::from_secs(30 * 24 * 60 * 60),
                eight_days_ago,
            ))
            .await;
        cache
            .set(
                IMAGES_NAMESPACE,
                "http://cdn/new.jpg",
                Bytes::from("data:image/jpeg;base64,AA=="),
                IMAGE_CACHE_TTL,
            )
            .await;

        assert_eq!(images.clear_expired().await, 1);
        let remaining = cache.scan(IMAGES_NAMESPACE).await;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].key.key, "http://cdn/new.jpg");
    }
}
