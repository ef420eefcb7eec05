//! Cache Entry Types
//!
//! Defines cache keys, entries, and the lightweight scan records used when
//! walking a namespace.

use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Cache Key
// =============================================================================

/// Composite `(namespace, key)` identifier for a cached value
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey {
    /// Namespace (e.g., "products", "images")
    pub namespace: String,
    /// Key within the namespace
    pub key: String,
}

impl CacheKey {
    /// Create a new cache key
    pub fn new(namespace: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            key: key.into(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.key)
    }
}

// =============================================================================
// Cache Entry
// =============================================================================

/// A cached value with its lifetime
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Unique key for this entry
    pub key: CacheKey,
    /// Serialized value
    pub value: Bytes,
    /// Time when entry was written
    pub created_at: DateTime<Utc>,
    /// Time after which the entry must no longer be served
    pub expires_at: DateTime<Utc>,
    /// Recorded size of the cached payload
    pub size_bytes: u64,
}

impl CacheEntry {
    /// Create an entry written now that lives for `ttl`
    pub fn new(key: CacheKey, value: Bytes, ttl: std::time::Duration) -> Self {
        Self::created_at(key, value, ttl, Utc::now())
    }

    /// Create an entry with an explicit creation time
    pub fn created_at(
        key: CacheKey,
        value: Bytes,
        ttl: std::time::Duration,
        created_at: DateTime<Utc>,
    ) -> Self {
        let expires_at = Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| created_at.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let size_bytes = value.len() as u64;
        Self {
            key,
            value,
            created_at,
            expires_at,
            size_bytes,
        }
    }

    /// Override the recorded size (e.g. the raw size of an encoded image)
    pub fn with_size(mut self, size_bytes: u64) -> Self {
        self.size_bytes = size_bytes;
        self
    }

    /// Check if the entry has expired at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Check if the entry has expired
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Lightweight view of this entry for scans
    pub fn info(&self) -> EntryInfo {
        EntryInfo {
            key: self.key.clone(),
            created_at: self.created_at,
            expires_at: self.expires_at,
            size_bytes: self.size_bytes,
        }
    }
}

// =============================================================================
// Entry Info (scan record)
// =============================================================================

/// Metadata of an entry, without its payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryInfo {
    pub key: CacheKey,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub size_bytes: u64,
}

impl EntryInfo {
    /// Check if the entry has expired at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    #[test]
    fn test_cache_key_creation() {
        let key = CacheKey::new("products", "all");
        assert_eq!(key.namespace, "products");
        assert_eq!(key.key, "all");
        assert_eq!(key.to_string(), "products/all");
    }

    #[test]
    fn test_cache_key_no_collision() {
        // Keys that would collide under naive "ns_key" concatenation
        let a = CacheKey::new("a_b", "c");
        let b = CacheKey::new("a", "b_c");
        assert_ne!(a, b);
    }

    #[test]
    fn test_cache_entry_expiry() {
        let key = CacheKey::new("test", "item");
        let created = Utc::now();
        let entry = CacheEntry::created_at(
            key,
            Bytes::from("data"),
            StdDuration::from_secs(60),
            created,
        );

        assert!(!entry.is_expired_at(created));
        assert!(!entry.is_expired_at(created + Duration::seconds(60)));
        assert!(entry.is_expired_at(created + Duration::seconds(61)));
        assert_eq!(entry.size_bytes, 4);
    }

    #[test]
    fn test_huge_ttl_saturates() {
        let entry = CacheEntry::new(
            CacheKey::new("test", "forever"),
            Bytes::from("x"),
            StdDuration::from_secs(u64::MAX),
        );
        assert!(!entry.is_expired());
    }
}
