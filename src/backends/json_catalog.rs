//! JSON File Catalog
//!
//! A catalog persisted as one JSON document mapping collection names to
//! arrays of records:
//!
//! ```json
//! { "products": [ { "id": "p1", "title": "Mug", "price": 12.5, "assetRefs": ["http://cdn/a.jpg"] } ] }
//! ```
//!
//! The document is handled as untyped JSON. Only the requested collection is
//! decoded into [`AssetRecord`]s, and an update writes just the keys the
//! patch sets, so fields and collections this crate does not model survive
//! unchanged. Updates rewrite the whole file through a temporary file and a
//! rename.

use crate::domain::ports::{AssetRecord, CatalogStore, RecordPatch};
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;

type Document = Map<String, Value>;

/// Catalog stored in a single JSON file
pub struct JsonFileCatalog {
    path: PathBuf,
    /// Serializes read-modify-write cycles
    write_lock: Mutex<()>,
}

impl JsonFileCatalog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn invalid(&self, reason: impl std::fmt::Display) -> Error {
        Error::Catalog(format!("{} is not a valid catalog: {}", self.path.display(), reason))
    }

    async fn load(&self) -> Result<Document> {
        let raw = match fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Document::new()),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_slice(&raw).map_err(|e| self.invalid(e))? {
            Value::Object(document) => Ok(document),
            _ => Err(self.invalid("top level is not an object")),
        }
    }

    async fn save(&self, document: Document) -> Result<()> {
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(&Value::Object(document))?).await?;
        if let Err(e) = fs::rename(&tmp, &self.path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    fn collection_mut<'a>(
        &self,
        document: &'a mut Document,
        collection: &str,
    ) -> Result<Option<&'a mut Vec<Value>>> {
        match document.get_mut(collection) {
            None => Ok(None),
            Some(Value::Array(records)) => Ok(Some(records)),
            Some(_) => Err(self.invalid(format!("collection {} is not an array", collection))),
        }
    }
}

#[async_trait]
impl CatalogStore for JsonFileCatalog {
    async fn get_all(&self, collection: &str) -> Result<Vec<AssetRecord>> {
        let mut document = self.load().await?;
        let Some(records) = self.collection_mut(&mut document, collection)? else {
            return Ok(Vec::new());
        };

        std::mem::take(records)
            .into_iter()
            .enumerate()
            .map(|(index, record)| {
                serde_json::from_value(record)
                    .map_err(|e| self.invalid(format!("{}[{}]: {}", collection, index, e)))
            })
            .collect()
    }

    async fn update(&self, collection: &str, id: &str, patch: RecordPatch) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut document = self.load().await?;

        let record = self
            .collection_mut(&mut document, collection)?
            .and_then(|records| {
                records
                    .iter_mut()
                    .find(|r| r.get("id").and_then(Value::as_str) == Some(id))
            })
            .and_then(Value::as_object_mut)
            .ok_or_else(|| Error::not_found(collection, id))?;

        // Unset patch fields are skipped during serialization
        if let Value::Object(fields) = serde_json::to_value(&patch)? {
            record.extend(fields);
        }

        self.save(document).await?;
        debug!(collection, id, "Updated catalog record");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::Utc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_reads_and_persists_updates() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("catalog.json");
        std::fs::write(
            &path,
            r#"{"products":[{"id":"p1","title":"Mug","assetRefs":["http://cdn/a.jpg"]}]}"#,
        )
        .unwrap();

        let catalog = JsonFileCatalog::new(&path);
        let records = catalog.get_all("products").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].asset_refs, vec!["http://cdn/a.jpg".to_string()]);

        catalog
            .update(
                "products",
                "p1",
                RecordPatch {
                    asset_refs_backup: Some(vec!["http://cdn/a.jpg".to_string()]),
                    migrated_at: Some(Utc::now()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        // A fresh handle sees the change
        let reopened = JsonFileCatalog::new(&path);
        let record = reopened.get("products", "p1").await.unwrap().unwrap();
        assert_eq!(
            record.asset_refs_backup,
            Some(vec!["http://cdn/a.jpg".to_string()])
        );
        assert!(record.migrated_at.is_some());
    }

    #[tokio::test]
    async fn test_update_keeps_unmodeled_fields_and_collections() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("catalog.json");
        std::fs::write(
            &path,
            r#"{
                "products": [
                    {"id": "p1", "title": "Mug", "price": 12.5, "stock": 3, "assetRefs": ["http://cdn/a.jpg"]},
                    {"id": "p2", "title": "Hat", "price": 9}
                ],
                "orders": [{"id": "o1", "total": 42}, {"note": "no id"}]
            }"#,
        )
        .unwrap();

        let catalog = JsonFileCatalog::new(&path);
        catalog
            .update(
                "products",
                "p1",
                RecordPatch {
                    asset_refs: Some(vec!["mem://blobs/products/a.jpg".to_string()]),
                    migrated_at: Some(Utc::now()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let document: Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        let p1 = &document["products"][0];
        assert_eq!(p1["price"], 12.5);
        assert_eq!(p1["stock"], 3);
        assert_eq!(p1["assetRefs"][0], "mem://blobs/products/a.jpg");
        assert!(p1["migratedAt"].is_string());
        assert!(p1.get("assetRefsBackup").is_none());

        assert_eq!(
            document["products"][1],
            serde_json::json!({"id": "p2", "title": "Hat", "price": 9})
        );
        assert_eq!(
            document["orders"],
            serde_json::json!([{"id": "o1", "total": 42}, {"note": "no id"}])
        );

        // Records elsewhere that do not fit the record shape do not block reads
        let records = catalog.get_all("products").await.unwrap();
        assert_eq!(records.len(), 2);
        assert!(records[1].asset_refs.is_empty());
    }

    #[tokio::test]
    async fn test_missing_file_and_unknown_record() {
        let tmp = TempDir::new().unwrap();
        let catalog = JsonFileCatalog::new(tmp.path().join("absent.json"));

        assert!(catalog.get_all("products").await.unwrap().is_empty());
        assert_matches!(
            catalog.update("products", "p1", RecordPatch::default()).await,
            Err(Error::NotFound { .. })
        );
    }

    #[tokio::test]
    async fn test_malformed_file_is_catalog_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("catalog.json");
        std::fs::write(&path, "not json").unwrap();

        assert_matches!(
            JsonFileCatalog::new(&path).get_all("products").await,
            Err(Error::Catalog(_))
        );

        std::fs::write(&path, r#"{"products": {"id": "p1"}}"#).unwrap();
        assert_matches!(
            JsonFileCatalog::new(&path).get_all("products").await,
            Err(Error::Catalog(_))
        );
    }
}
