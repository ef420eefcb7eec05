//! Ephemeral In-Memory Storage
//!
//! Process-local fallback storage backed by DashMap. Contents are lost when
//! the process exits.

use crate::cache::entry::{CacheEntry, CacheKey, EntryInfo};
use crate::cache::storage::{BackendKind, StorageBackend};
use crate::error::Result;
use async_trait::async_trait;
use dashmap::DashMap;

/// In-memory storage keyed by the structured `(namespace, key)` pair
#[derive(Debug, Default)]
pub struct EphemeralBackend {
    entries: DashMap<CacheKey, CacheEntry>,
}

impl EphemeralBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total entries across every namespace
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl StorageBackend for EphemeralBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Ephemeral
    }

    async fn open(&self) -> Result<()> {
        Ok(())
    }

    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        Ok(self.entries.get(key).map(|r| r.value().clone()))
    }

    async fn set(&self, entry: CacheEntry) -> Result<()> {
        self.entries.insert(entry.key.clone(), entry);
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> Result<bool> {
        Ok(self.entries.remove(key).is_some())
    }

    async fn clear(&self, namespace: &str) -> Result<u64> {
        let before = self.entries.len();
        self.entries.retain(|key, _| key.namespace != namespace);
        Ok(before.saturating_sub(self.entries.len()) as u64)
    }

    async fn scan(&self, namespace: &str) -> Result<Vec<EntryInfo>> {
        let mut infos: Vec<EntryInfo> = self
            .entries
            .iter()
            .filter(|r| r.key().namespace == namespace)
            .map(|r| r.value().info())
            .collect();
        infos.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(infos)
    }
}
