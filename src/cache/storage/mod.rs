//! Cache Storage Backends
//!
//! A namespaced key-value store with two implementations:
//! - [`DurableBackend`]: files on local disk, survives restarts
//! - [`EphemeralBackend`]: in-process map, used when durable storage is
//!   disabled or cannot be opened
//!
//! [`StorageHandle`] picks one of them exactly once, on first use.

mod durable;
mod ephemeral;

pub use durable::{DurableBackend, DurableBackendConfig};
pub use ephemeral::EphemeralBackend;

use crate::cache::entry::{CacheEntry, CacheKey, EntryInfo};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{info, warn};

// =============================================================================
// Backend Kind
// =============================================================================

/// Which implementation is serving the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Durable,
    Ephemeral,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Durable => write!(f, "durable"),
            BackendKind::Ephemeral => write!(f, "ephemeral"),
        }
    }
}

/// Aggregate view of one namespace
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceStats {
    /// Entries currently stored (live or expired)
    pub entries: u64,
    /// Sum of recorded entry sizes
    pub total_bytes: u64,
    /// Entries already past their expiry
    pub expired: u64,
}

// =============================================================================
// StorageBackend Trait
// =============================================================================

/// Namespaced persistent key-value store
///
/// Writes to the same `(namespace, key)` are last-write-wins. Expiry is not
/// enforced here: `get` returns whatever is stored and callers decide.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Which implementation this is
    fn kind(&self) -> BackendKind;

    /// Prepare the backend for use. Idempotent.
    async fn open(&self) -> Result<()>;

    /// Get an entry by key
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>>;

    /// Store an entry, replacing any previous value
    async fn set(&self, entry: CacheEntry) -> Result<()>;

    /// Delete an entry. Returns true if it existed.
    async fn delete(&self, key: &CacheKey) -> Result<bool>;

    /// Delete every entry of a namespace. Returns the number removed.
    async fn clear(&self, namespace: &str) -> Result<u64>;

    /// Walk every entry of a namespace
    async fn scan(&self, namespace: &str) -> Result<Vec<EntryInfo>>;

    /// Delete every entry of a namespace that expired before `now`
    async fn clear_expired(&self, namespace: &str, now: DateTime<Utc>) -> Result<u64> {
        let mut removed = 0;
        for info in self.scan(namespace).await? {
            if info.is_expired_at(now) && self.delete(&info.key).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Summarize a namespace
    async fn stats(&self, namespace: &str) -> Result<NamespaceStats> {
        let now = Utc::now();
        let entries = self.scan(namespace).await?;
        Ok(NamespaceStats {
            entries: entries.len() as u64,
            total_bytes: entries.iter().map(|e| e.size_bytes).sum(),
            expired: entries.iter().filter(|e| e.is_expired_at(now)).count() as u64,
        })
    }
}

/// Type alias for Arc'd StorageBackend
pub type StorageBackendRef = Arc<dyn StorageBackend>;

// =============================================================================
// Storage Handle
// =============================================================================

/// Lazily selects and opens the backend serving the cache
///
/// The durable backend is tried first (unless disabled); if it cannot be
/// opened the ephemeral backend is used instead. The choice is made once
/// and never revisited, and is never reported to callers as an error.
pub struct StorageHandle {
    durable: Option<DurableBackendConfig>,
    backend: OnceCell<StorageBackendRef>,
}

impl StorageHandle {
    /// Handle that prefers the durable backend described by `config`
    pub fn durable(config: DurableBackendConfig) -> Self {
        Self {
            durable: Some(config),
            backend: OnceCell::new(),
        }
    }

    /// Handle that always uses the ephemeral backend
    pub fn ephemeral() -> Self {
        Self {
            durable: None,
            backend: OnceCell::new(),
        }
    }

    /// Handle over an already constructed backend
    pub fn with_backend(backend: StorageBackendRef) -> Self {
        Self {
            durable: None,
            backend: OnceCell::new_with(Some(backend)),
        }
    }

    /// Resolve the backend, opening it on first call
    pub async fn backend(&self) -> &StorageBackendRef {
        self.backend
            .get_or_init(|| async {
                match &self.durable {
                    Some(config) => Self::open_durable(config.clone()).await,
                    None => Arc::new(EphemeralBackend::new()) as StorageBackendRef,
                }
            })
            .await
    }

    /// Kind of the resolved backend (resolving it if needed)
    pub async fn kind(&self) -> BackendKind {
        self.backend().await.kind()
    }

    async fn open_durable(config: DurableBackendConfig) -> StorageBackendRef {
        let root = config.root_path.display().to_string();
        let durable = DurableBackend::new(config);
        match durable.open().await {
            Ok(()) => {
                info!(root = %root, "Durable cache storage opened");
                Arc::new(durable)
            }
            Err(e) => {
                warn!(
                    root = %root,
                    error = %e,
                    "Durable cache storage unavailable, using ephemeral storage"
                );
                Arc::new(EphemeralBackend::new())
            }
        }
    }
}
