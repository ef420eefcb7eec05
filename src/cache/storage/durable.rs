//! Durable Local Storage
//!
//! File-based cache storage. Each namespace is a directory, each key a
//! single `.entry` file holding a length-prefixed JSON header followed by the
//! (optionally compressed) payload. Files are written to a temporary name and
//! renamed into place, so a reader sees either the old or the new entry.

use crate::cache::compression::{CompressionAlgorithm, CompressionConfig, CompressionManager};
use crate::cache::entry::{CacheEntry, CacheKey, EntryInfo};
use crate::cache::storage::{BackendKind, StorageBackend};
use crate::error::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

const ENTRY_EXTENSION: &str = "entry";
const PROBE_FILE: &str = ".probe";

// =============================================================================
// Durable Backend Configuration
// =============================================================================

/// Configuration for durable storage
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DurableBackendConfig {
    /// Root directory for cache files
    pub root_path: PathBuf,
    /// Whether to fsync entry files before renaming them into place
    pub sync_writes: bool,
    /// Payload compression
    pub compression: CompressionConfig,
}

impl Default for DurableBackendConfig {
    fn default() -> Self {
        Self {
            root_path: std::env::temp_dir().join("storefront-assets-cache"),
            sync_writes: false,
            compression: CompressionConfig::default(),
        }
    }
}

impl DurableBackendConfig {
    /// Default config rooted at `root_path`
    pub fn at(root_path: impl Into<PathBuf>) -> Self {
        Self {
            root_path: root_path.into(),
            ..Default::default()
        }
    }
}

// =============================================================================
// Stored Header
// =============================================================================

/// Header stored in front of every payload
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredHeader {
    key: CacheKey,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    size_bytes: u64,
    compression: CompressionAlgorithm,
}

impl StoredHeader {
    fn info(&self) -> EntryInfo {
        EntryInfo {
            key: self.key.clone(),
            created_at: self.created_at,
            expires_at: self.expires_at,
            size_bytes: self.size_bytes,
        }
    }
}

// =============================================================================
// Durable Backend
// =============================================================================

/// Durable cache storage on the local filesystem
pub struct DurableBackend {
    config: DurableBackendConfig,
    compression: CompressionManager,
    opened: OnceCell<()>,
}

impl DurableBackend {
    pub fn new(config: DurableBackendConfig) -> Self {
        Self {
            compression: CompressionManager::with_config(config.compression.clone()),
            config,
            opened: OnceCell::new(),
        }
    }

    /// Root directory of this backend
    pub fn root_path(&self) -> &Path {
        &self.config.root_path
    }

    async fn ensure_open(&self) -> Result<()> {
        self.opened
            .get_or_try_init(|| async {
                fs::create_dir_all(&self.config.root_path)
                    .await
                    .map_err(|e| Error::StorageUnavailable {
                        reason: format!(
                            "cannot create {}: {}",
                            self.config.root_path.display(),
                            e
                        ),
                    })?;

                // Prove the directory is writable before committing to it
                let probe = self.config.root_path.join(PROBE_FILE);
                fs::write(&probe, b"ok").await.map_err(|e| Error::StorageUnavailable {
                    reason: format!("{} is not writable: {}", self.config.root_path.display(), e),
                })?;
                let _ = fs::remove_file(&probe).await;

                debug!(root = %self.config.root_path.display(), "Durable storage ready");
                Ok::<(), Error>(())
            })
            .await
            .map(|_| ())
    }

    /// Write `data` to `tmp_path` and rename it over `path`
    async fn replace_file(&self, tmp_path: &Path, path: &Path, data: &[u8]) -> Result<()> {
        let mut file = fs::File::create(tmp_path).await?;
        file.write_all(data).await?;
        if self.config.sync_writes {
            file.sync_all().await?;
        }
        drop(file);

        fs::rename(tmp_path, path).await?;
        Ok(())
    }

    fn namespace_dir(&self, namespace: &str) -> PathBuf {
        // Prefixed so that "." or ".." can never escape the root
        self.config
            .root_path
            .join(format!("ns-{}", urlencoding::encode(namespace)))
    }

    fn entry_path(&self, key: &CacheKey) -> PathBuf {
        let digest = Sha256::digest(key.key.as_bytes());
        let stem: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
        self.namespace_dir(&key.namespace)
            .join(format!("{}.{}", stem, ENTRY_EXTENSION))
    }

    fn encode(&self, entry: &CacheEntry) -> Result<Vec<u8>> {
        let (payload, compression) = self.compression.compress(&entry.value);
        let header = StoredHeader {
            key: entry.key.clone(),
            created_at: entry.created_at,
            expires_at: entry.expires_at,
            size_bytes: entry.size_bytes,
            compression,
        };
        let header_json = serde_json::to_vec(&header)?;

        let mut buf = Vec::with_capacity(4 + header_json.len() + payload.len());
        buf.extend_from_slice(&(header_json.len() as u32).to_be_bytes());
        buf.extend_from_slice(&header_json);
        buf.extend_from_slice(&payload);
        Ok(buf)
    }

    fn decode(&self, raw: &[u8]) -> Result<(StoredHeader, Bytes)> {
        if raw.len() < 4 {
            return Err(Error::Internal("truncated cache entry".into()));
        }
        let header_len = u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]) as usize;
        let body = &raw[4..];
        if body.len() < header_len {
            return Err(Error::Internal("truncated cache entry header".into()));
        }
        let header: StoredHeader = serde_json::from_slice(&body[..header_len])?;
        let payload = self
            .compression
            .decompress(&body[header_len..], header.compression)?;
        Ok((header, payload))
    }

    /// Read only the header of an entry file
    async fn read_header(path: &Path) -> Result<StoredHeader> {
        let mut file = fs::File::open(path).await?;
        let mut len_buf = [0u8; 4];
        file.read_exact(&mut len_buf).await?;
        let mut header = vec![0u8; u32::from_be_bytes(len_buf) as usize];
        file.read_exact(&mut header).await?;
        Ok(serde_json::from_slice(&header)?)
    }

    async fn entry_files(&self, namespace: &str) -> Result<Vec<PathBuf>> {
        let dir = self.namespace_dir(namespace);
        let mut files = Vec::new();
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(files),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().map(|e| e == ENTRY_EXTENSION).unwrap_or(false) {
                files.push(path);
            }
        }
        Ok(files)
    }
}

#[async_trait]
impl StorageBackend for DurableBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Durable
    }

    async fn open(&self) -> Result<()> {
        self.ensure_open().await
    }

    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        self.ensure_open().await?;

        let raw = match fs::read(self.entry_path(key)).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let (header, value) = self.decode(&raw)?;
        if header.key != *key {
            // Digest collision; treat as absent
            return Ok(None);
        }

        Ok(Some(CacheEntry {
            key: header.key,
            value,
            created_at: header.created_at,
            expires_at: header.expires_at,
            size_bytes: header.size_bytes,
        }))
    }

    async fn set(&self, entry: CacheEntry) -> Result<()> {
        self.ensure_open().await?;

        let path = self.entry_path(&entry.key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let encoded = self.encode(&entry)?;
        let tmp_path = path.with_extension(format!("{}.tmp", uuid::Uuid::new_v4().simple()));

        let written = self.replace_file(&tmp_path, &path, &encoded).await;
        if written.is_err() {
            let _ = fs::remove_file(&tmp_path).await;
        }
        written
    }

    async fn delete(&self, key: &CacheKey) -> Result<bool> {
        self.ensure_open().await?;

        match fs::remove_file(self.entry_path(key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn clear(&self, namespace: &str) -> Result<u64> {
        self.ensure_open().await?;

        let mut removed = 0;
        for path in self.entry_files(namespace).await? {
            match fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(removed)
    }

    async fn scan(&self, namespace: &str) -> Result<Vec<EntryInfo>> {
        self.ensure_open().await?;

        let mut infos = Vec::new();
        for path in self.entry_files(namespace).await? {
            match Self::read_header(&path).await {
                Ok(header) => infos.push(header.info()),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable cache entry");
                }
            }
        }
        infos.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(infos)
    }
}
