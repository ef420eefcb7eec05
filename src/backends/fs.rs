//! Filesystem Blob Store
//!
//! Managed blob storage on a local directory, served under a public base
//! URL (for example by a static file server or CDN pointing at the root).
//! Each blob has a JSON metadata sidecar next to it.

use crate::backends::memory::folder_prefix;
use crate::domain::ports::{BlobInfo, BlobMetadata, BlobStore, StoredBlob};
use crate::error::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

const METADATA_SUFFIX: &str = ".meta.json";

/// Blob store rooted at a local directory
pub struct FsBlobStore {
    root: PathBuf,
    base_url: String,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a blob path below the root, rejecting anything that escapes it
    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path.trim_start_matches('/'));
        let safe = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if !safe || path.trim().is_empty() || path.ends_with(METADATA_SUFFIX) {
            return Err(Error::Validation(format!("invalid blob path: {}", path)));
        }
        Ok(self.root.join(relative))
    }

    fn metadata_path(file: &Path) -> PathBuf {
        let mut name = file.as_os_str().to_owned();
        name.push(METADATA_SUFFIX);
        PathBuf::from(name)
    }

    fn blob_error(operation: &str, path: &str, e: impl std::fmt::Display) -> Error {
        Error::BlobStore {
            operation: operation.to_string(),
            path: path.to_string(),
            reason: e.to_string(),
        }
    }

    async fn read_info(&self, path: &str, file: &Path) -> Result<Option<BlobInfo>> {
        let size = match fs::metadata(file).await {
            Ok(meta) if meta.is_file() => meta.len(),
            Ok(_) => return Ok(None),
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Self::blob_error("stat", path, e)),
        };

        let metadata = match fs::read(Self::metadata_path(file)).await {
            Ok(raw) => match serde_json::from_slice::<BlobMetadata>(&raw) {
                Ok(metadata) => Some(metadata),
                Err(e) => {
                    warn!(path = %path, error = %e, "Unreadable blob metadata");
                    None
                }
            },
            Err(_) => None,
        };

        Ok(Some(BlobInfo {
            path: path.to_string(),
            url: self.url_for(path),
            size,
            content_type: metadata
                .as_ref()
                .map(|m| m.content_type.clone())
                .unwrap_or_else(|| "application/octet-stream".to_string()),
            metadata,
        }))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn put(&self, path: &str, bytes: Bytes, metadata: BlobMetadata) -> Result<StoredBlob> {
        let file = self.resolve(path)?;
        let path = path.trim_start_matches('/').to_string();

        if let Some(parent) = file.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| Self::blob_error("put", &path, e))?;
        }

        let tmp = file.with_extension(format!("{}.tmp", uuid::Uuid::new_v4().simple()));
        fs::write(&tmp, &bytes)
            .await
            .map_err(|e| Self::blob_error("put", &path, e))?;
        fs::rename(&tmp, &file)
            .await
            .map_err(|e| Self::blob_error("put", &path, e))?;
        fs::write(Self::metadata_path(&file), serde_json::to_vec_pretty(&metadata)?)
            .await
            .map_err(|e| Self::blob_error("put", &path, e))?;

        debug!(path = %path, size = bytes.len(), "Stored blob");
        Ok(StoredBlob {
            url: self.url_for(&path),
            path,
        })
    }

    async fn list(&self, folder: &str) -> Result<Vec<BlobInfo>> {
        let prefix = folder_prefix(folder);
        let start = if prefix.is_empty() {
            self.root.clone()
        } else {
            self.resolve(prefix.trim_end_matches('/'))?
        };

        let mut blobs = Vec::new();
        let mut pending = vec![start];
        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(Self::blob_error("list", folder, e)),
            };

            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| Self::blob_error("list", folder, e))?
            {
                let file = entry.path();
                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|e| Self::blob_error("list", folder, e))?;
                if file_type.is_dir() {
                    pending.push(file);
                    continue;
                }

                let Ok(relative) = file.strip_prefix(&self.root) else {
                    continue;
                };
                let path = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                if path.ends_with(METADATA_SUFFIX) || path.ends_with(".tmp") {
                    continue;
                }
                if let Some(info) = self.read_info(&path, &file).await? {
                    blobs.push(info);
                }
            }
        }

        blobs.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(blobs)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let file = self.resolve(path)?;
        match fs::remove_file(&file).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(Error::not_found("blob", path)),
            Err(e) => return Err(Self::blob_error("delete", path, e)),
        }
        if let Err(e) = fs::remove_file(Self::metadata_path(&file)).await {
            if e.kind() != ErrorKind::NotFound {
                warn!(path = %path, error = %e, "Failed to remove blob metadata");
            }
        }
        debug!(path = %path, "Deleted blob");
        Ok(())
    }

    async fn get_metadata(&self, path: &str) -> Result<Option<BlobInfo>> {
        let file = self.resolve(path)?;
        self.read_info(path.trim_start_matches('/'), &file).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::Utc;
    use tempfile::TempDir;

    fn metadata() -> BlobMetadata {
        BlobMetadata {
            original_size: 4,
            compressed_size: 4,
            uploaded_at: Utc::now(),
            source_tag: "migration".to_string(),
            content_type: "image/png".to_string(),
        }
    }

    #[tokio::test]
    async fn test_put_list_get_delete() {
        let tmp = TempDir::new().unwrap();
        let store = FsBlobStore::new(tmp.path(), "https://assets.example.com");

        let stored = store
            .put("products/2024/a.png", Bytes::from("data"), metadata())
            .await
            .unwrap();
        assert_eq!(stored.url, "https://assets.example.com/products/2024/a.png");
        store
            .put("banners/b.png", Bytes::from("bb"), metadata())
            .await
            .unwrap();

        let listed = store.list("products").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].path, "products/2024/a.png");
        assert_eq!(listed[0].size, 4);
        assert_eq!(listed[0].content_type, "image/png");
        assert_eq!(store.list("").await.unwrap().len(), 2);

        let info = store.get_metadata("products/2024/a.png").await.unwrap().unwrap();
        assert_eq!(info.metadata.unwrap().source_tag, "migration");

        store.delete("products/2024/a.png").await.unwrap();
        assert!(store.list("products").await.unwrap().is_empty());
        assert_matches!(
            store.delete("products/2024/a.png").await,
            Err(Error::NotFound { .. })
        );
    }

    #[tokio::test]
    async fn test_rejects_escaping_paths() {
        let tmp = TempDir::new().unwrap();
        let store = FsBlobStore::new(tmp.path(), "https://assets.example.com");

        assert_matches!(
            store.put("../outside.png", Bytes::from("x"), metadata()).await,
            Err(Error::Validation(_))
        );
        assert_matches!(store.delete("a/../../b").await, Err(Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_list_missing_folder_is_empty() {
        let tmp = TempDir::new().unwrap();
        let store = FsBlobStore::new(tmp.path().join("never-created"), "https://a");
        assert!(store.list("products").await.unwrap().is_empty());
    }
}
