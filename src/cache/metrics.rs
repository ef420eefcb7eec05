//! Cache Metrics
//!
//! Cache-line aligned per-namespace counters for concurrent access.

use chrono::Utc;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Cache line size for alignment (64 bytes on most modern CPUs)
pub const CACHE_LINE_SIZE: usize = 64;

// =============================================================================
// Per-Namespace Metrics (Cache-Line Aligned)
// =============================================================================

/// Counters for a single namespace, aligned to prevent false sharing
#[repr(C, align(64))]
#[derive(Debug)]
pub struct NamespaceMetrics {
    /// Lookups that returned a live entry
    pub hits: AtomicU64,
    /// Lookups that found nothing (or only an expired entry)
    pub misses: AtomicU64,
    /// Entries written
    pub writes: AtomicU64,
    /// Entries removed because their TTL elapsed
    pub expirations: AtomicU64,
    /// Backend failures swallowed by the cache
    pub backend_errors: AtomicU64,
    /// Last update timestamp (Unix millis)
    pub last_update_ms: AtomicU64,
}

const _: () = assert!(std::mem::size_of::<NamespaceMetrics>() <= CACHE_LINE_SIZE);

impl Default for NamespaceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl NamespaceMetrics {
    /// Create new zeroed metrics
    pub fn new() -> Self {
        Self {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
            backend_errors: AtomicU64::new(0),
            last_update_ms: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        self.touch();
    }

    #[inline]
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        self.touch();
    }

    #[inline]
    pub fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.touch();
    }

    #[inline]
    pub fn record_expired(&self, count: u64) {
        self.expirations.fetch_add(count, Ordering::Relaxed);
        self.touch();
    }

    #[inline]
    pub fn record_backend_error(&self) {
        self.backend_errors.fetch_add(1, Ordering::Relaxed);
        self.touch();
    }

    #[inline]
    fn touch(&self) {
        self.last_update_ms
            .store(Utc::now().timestamp_millis() as u64, Ordering::Release);
    }

    /// Create a snapshot of current metrics
    pub fn snapshot(&self) -> NamespaceMetricsSnapshot {
        NamespaceMetricsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            backend_errors: self.backend_errors.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of namespace metrics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamespaceMetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub expirations: u64,
    pub backend_errors: u64,
}

impl NamespaceMetricsSnapshot {
    /// Get total lookups
    pub fn total_requests(&self) -> u64 {
        self.hits + self.misses
    }

    /// Calculate hit ratio (0.0 to 1.0)
    pub fn hit_ratio(&self) -> f64 {
        let total = self.total_requests();
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

// =============================================================================
// Cache Metrics Registry
// =============================================================================

/// Metrics for every namespace touched by the cache
#[derive(Debug, Default)]
pub struct CacheMetrics {
    namespaces: DashMap<String, Arc<NamespaceMetrics>>,
}

impl CacheMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get (or lazily create) the metrics of a namespace
    pub fn namespace(&self, namespace: &str) -> Arc<NamespaceMetrics> {
        if let Some(metrics) = self.namespaces.get(namespace) {
            return metrics.clone();
        }
        self.namespaces
            .entry(namespace.to_string())
            .or_default()
            .clone()
    }

    /// Snapshot of every known namespace, sorted by name
    pub fn snapshot(&self) -> Vec<(String, NamespaceMetricsSnapshot)> {
        let mut all: Vec<_> = self
            .namespaces
            .iter()
            .map(|r| (r.key().clone(), r.value().snapshot()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_line_alignment() {
        assert_eq!(std::mem::align_of::<NamespaceMetrics>(), CACHE_LINE_SIZE);
        assert!(std::mem::size_of::<NamespaceMetrics>() <= CACHE_LINE_SIZE);
    }

    #[test]
    fn test_namespace_metrics_operations() {
        let metrics = NamespaceMetrics::new();

        metrics.record_hit();
        metrics.record_hit();
        metrics.record_miss();
        metrics.record_expired(3);

        let snap = metrics.snapshot();
        assert_eq!(snap.hits, 2);
        assert_eq!(snap.misses, 1);
        assert_eq!(snap.expirations, 3);
        assert!((snap.hit_ratio() - 0.666).abs() < 0.01);
    }

    #[test]
    fn test_registry_isolates_namespaces() {
        let registry = CacheMetrics::new();

        registry.namespace("images").record_hit();
        registry.namespace("products").record_miss();
        registry.namespace("images").record_hit();

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].0, "images");
        assert_eq!(snapshot[0].1.hits, 2);
        assert_eq!(snapshot[1].1.misses, 1);
    }
}
