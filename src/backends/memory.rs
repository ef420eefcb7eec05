//! In-Memory Adapters
//!
//! Process-local blob store and catalog. Used for dry runs and as the
//! backing store of the test doubles.

use crate::domain::ports::{
    AssetRecord, BlobInfo, BlobMetadata, BlobStore, CatalogStore, RecordPatch, StoredBlob,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeMap;
use tokio::sync::RwLock;
use tracing::debug;

// =============================================================================
// Memory Blob Store
// =============================================================================

#[derive(Debug, Clone)]
struct StoredObject {
    bytes: Bytes,
    metadata: BlobMetadata,
}

/// Blob store keeping objects in a sorted map
pub struct MemoryBlobStore {
    base_url: String,
    objects: RwLock<BTreeMap<String, StoredObject>>,
}

impl MemoryBlobStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            objects: RwLock::new(BTreeMap::new()),
        }
    }

    /// Raw bytes of a stored blob
    pub async fn get_bytes(&self, path: &str) -> Option<Bytes> {
        self.objects.read().await.get(path).map(|o| o.bytes.clone())
    }

    /// Every stored path, sorted
    pub async fn paths(&self) -> Vec<String> {
        self.objects.read().await.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    fn info(&self, path: &str, object: &StoredObject) -> BlobInfo {
        BlobInfo {
            path: path.to_string(),
            url: self.url_for(path),
            size: object.bytes.len() as u64,
            content_type: object.metadata.content_type.clone(),
            metadata: Some(object.metadata.clone()),
        }
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn put(&self, path: &str, bytes: Bytes, metadata: BlobMetadata) -> Result<StoredBlob> {
        let path = path.trim_start_matches('/').to_string();
        debug!(path = %path, size = bytes.len(), "Storing blob in memory");
        self.objects
            .write()
            .await
            .insert(path.clone(), StoredObject { bytes, metadata });
        Ok(StoredBlob {
            url: self.url_for(&path),
            path,
        })
    }

    async fn list(&self, folder: &str) -> Result<Vec<BlobInfo>> {
        let prefix = folder_prefix(folder);
        Ok(self
            .objects
            .read()
            .await
            .iter()
            .filter(|(path, _)| path.starts_with(&prefix))
            .map(|(path, object)| self.info(path, object))
            .collect())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        match self.objects.write().await.remove(path.trim_start_matches('/')) {
            Some(_) => Ok(()),
            None => Err(Error::not_found("blob", path)),
        }
    }

    async fn get_metadata(&self, path: &str) -> Result<Option<BlobInfo>> {
        let path = path.trim_start_matches('/');
        Ok(self
            .objects
            .read()
            .await
            .get(path)
            .map(|object| self.info(path, object)))
    }
}

/// `"products"` -> `"products/"`, `""` -> `""`
pub(crate) fn folder_prefix(folder: &str) -> String {
    let folder = folder.trim_matches('/');
    if folder.is_empty() {
        String::new()
    } else {
        format!("{}/", folder)
    }
}

// =============================================================================
// Memory Catalog
// =============================================================================

/// Catalog keeping every collection in memory, keyed by record id
#[derive(Default)]
pub struct MemoryCatalog {
    collections: RwLock<BTreeMap<String, BTreeMap<String, AssetRecord>>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog pre-populated with one collection
    pub fn with_records(collection: &str, records: Vec<AssetRecord>) -> Self {
        let records = records.into_iter().map(|r| (r.id.clone(), r)).collect();
        Self {
            collections: RwLock::new(BTreeMap::from([(collection.to_string(), records)])),
        }
    }

    /// Insert or replace a record
    pub async fn insert(&self, collection: &str, record: AssetRecord) {
        self.collections
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .insert(record.id.clone(), record);
    }
}

#[async_trait]
impl CatalogStore for MemoryCatalog {
    async fn get_all(&self, collection: &str) -> Result<Vec<AssetRecord>> {
        Ok(self
            .collections
            .read()
            .await
            .get(collection)
            .map(|records| records.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn update(&self, collection: &str, id: &str, patch: RecordPatch) -> Result<()> {
        let mut collections = self.collections.write().await;
        let record = collections
            .get_mut(collection)
            .and_then(|records| records.get_mut(id))
            .ok_or_else(|| Error::not_found(collection, id))?;
        patch.apply(record);
        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<AssetRecord>> {
        Ok(self
            .collections
            .read()
            .await
            .get(collection)
            .and_then(|records| records.get(id).cloned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::Utc;

    fn metadata(size: u64) -> BlobMetadata {
        BlobMetadata {
            original_size: size,
            compressed_size: size,
            uploaded_at: Utc::now(),
            source_tag: "test".to_string(),
            content_type: "image/jpeg".to_string(),
        }
    }

    #[tokio::test]
    async fn test_blob_put_list_delete() {
        let store = MemoryBlobStore::new("mem://blobs");

        let stored = store
            .put("products/a.jpg", Bytes::from("aaa"), metadata(3))
            .await
            .unwrap();
        assert_eq!(stored.url, "mem://blobs/products/a.jpg");
        store
            .put("productsold/b.jpg", Bytes::from("b"), metadata(1))
            .await
            .unwrap();

        let listed = store.list("products").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].size, 3);
        assert_eq!(store.list("").await.unwrap().len(), 2);

        store.delete("products/a.jpg").await.unwrap();
        assert_matches!(store.delete("products/a.jpg").await, Err(Error::NotFound { .. }));
        assert!(store.get_metadata("products/a.jpg").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_catalog_update_and_get() {
        let catalog = MemoryCatalog::with_records(
            "products",
            vec![AssetRecord::new("p1", "Mug", vec!["http://cdn/a.jpg".to_string()])],
        );

        catalog
            .update(
                "products",
                "p1",
                RecordPatch {
                    asset_refs: Some(vec!["mem://blobs/a.jpg".to_string()]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let record = catalog.get("products", "p1").await.unwrap().unwrap();
        assert_eq!(record.asset_refs, vec!["mem://blobs/a.jpg".to_string()]);

        assert_matches!(
            catalog.update("products", "missing", RecordPatch::default()).await,
            Err(Error::NotFound { .. })
        );
        assert!(catalog.get_all("orders").await.unwrap().is_empty());
    }
}
