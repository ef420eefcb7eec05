//! Asset Uploader
//!
//! Validates, conditionally re-encodes and uploads a binary to the managed
//! blob store. Generated names are `<unix-millis>_<8 hex>.<ext>`, so a retry
//! never overwrites an earlier attempt unless the caller pinned the name.

use crate::assets::codec::{self, extension_for};
use crate::domain::ports::{BlobMetadata, BlobStoreRef};
use crate::error::{Error, Result};
use backoff::{backoff::Backoff, ExponentialBackoff};
use bytes::Bytes;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

// =============================================================================
// Configuration
// =============================================================================

/// Uploader limits and encoding budget
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploaderConfig {
    /// Largest accepted input, in bytes
    pub max_file_size: u64,
    /// Accepted content types
    pub allowed_content_types: Vec<String>,
    /// Inputs larger than this are re-encoded
    pub compression_threshold: u64,
    /// Width bound for re-encoded images
    pub max_width: u32,
    /// JPEG quality for re-encoded images (1-100)
    pub quality: u8,
    /// Folder under which migrated assets are stored
    pub folder: String,
    /// Tag recorded in every blob's metadata
    pub source_tag: String,
    /// Total attempts for a retryable upload failure
    pub upload_attempts: u32,
    pub retry_initial_delay_ms: u64,
    pub retry_max_delay_ms: u64,
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            max_file_size: 10 * 1024 * 1024,
            allowed_content_types: vec![
                "image/jpeg".to_string(),
                "image/png".to_string(),
                "image/gif".to_string(),
                "image/webp".to_string(),
            ],
            compression_threshold: 500 * 1024,
            max_width: 1920,
            quality: 80,
            folder: "products".to_string(),
            source_tag: "storefront-assets".to_string(),
            upload_attempts: 3,
            retry_initial_delay_ms: 200,
            retry_max_delay_ms: 5_000,
        }
    }
}

impl UploaderConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_file_size == 0 {
            return Err(Error::Configuration("uploader.max_file_size must be positive".into()));
        }
        if self.allowed_content_types.is_empty() {
            return Err(Error::Configuration(
                "uploader.allowed_content_types must not be empty".into(),
            ));
        }
        if self.max_width == 0 {
            return Err(Error::Configuration("uploader.max_width must be positive".into()));
        }
        if !(1..=100).contains(&self.quality) {
            return Err(Error::Configuration(format!(
                "uploader.quality must be within 1-100, got {}",
                self.quality
            )));
        }
        if self.upload_attempts == 0 {
            return Err(Error::Configuration("uploader.upload_attempts must be at least 1".into()));
        }
        if self.folder.trim_matches('/').is_empty() {
            return Err(Error::Configuration("uploader.folder must be set".into()));
        }
        Ok(())
    }

    fn retry_policy(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: Duration::from_millis(self.retry_initial_delay_ms),
            max_interval: Duration::from_millis(self.retry_max_delay_ms),
            max_elapsed_time: None,
            ..Default::default()
        }
    }
}

// =============================================================================
// Upload Types
// =============================================================================

/// A binary waiting to be uploaded
#[derive(Debug, Clone)]
pub struct AssetFile {
    pub bytes: Bytes,
    pub content_type: String,
}

impl AssetFile {
    pub fn new(bytes: impl Into<Bytes>, content_type: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            content_type: content_type.into(),
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Caller-supplied facts about an upload
#[derive(Debug, Clone)]
pub struct UploadMeta {
    /// Size before any re-encoding
    pub original_size: u64,
    pub content_type: String,
}

/// Outcome of a successful upload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResult {
    pub url: String,
    pub path: String,
    /// Stored size in bytes
    pub size: u64,
    /// Stored size divided by original size (1.0 when untouched)
    pub compression_ratio: f64,
}

// =============================================================================
// Asset Uploader
// =============================================================================

/// Validates, compresses and uploads assets to the managed blob store
pub struct AssetUploader {
    config: UploaderConfig,
    store: BlobStoreRef,
}

impl AssetUploader {
    pub fn new(config: UploaderConfig, store: BlobStoreRef) -> Self {
        Self { config, store }
    }

    pub fn config(&self) -> &UploaderConfig {
        &self.config
    }

    pub fn store(&self) -> &BlobStoreRef {
        &self.store
    }

    /// Reject oversized or disallowed files before any network call
    pub fn validate(&self, file: &AssetFile) -> Result<()> {
        if file.size() > self.config.max_file_size {
            return Err(Error::Validation(format!(
                "file is {} bytes, limit is {}",
                file.size(),
                self.config.max_file_size
            )));
        }
        if !self
            .config
            .allowed_content_types
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(&file.content_type))
        {
            return Err(Error::Validation(format!(
                "content type {} is not allowed",
                file.content_type
            )));
        }
        Ok(())
    }

    /// Re-encode `file` as a JPEG no wider than `max_width`
    pub fn compress(&self, file: &AssetFile, max_width: u32, quality: u8) -> Result<AssetFile> {
        let encoded = codec::encode_jpeg(&file.bytes, max_width, quality)?;
        debug!(
            original = file.size(),
            compressed = encoded.bytes.len(),
            width = encoded.width,
            height = encoded.height,
            "Re-encoded image"
        );
        Ok(AssetFile::new(encoded.bytes, encoded.content_type))
    }

    /// Compress when over the threshold, falling back to the original bytes
    pub fn prepare(&self, file: &AssetFile) -> AssetFile {
        if file.size() <= self.config.compression_threshold {
            return file.clone();
        }

        match self.compress(file, self.config.max_width, self.config.quality) {
            Ok(compressed) if compressed.size() < file.size() => compressed,
            Ok(_) => {
                debug!(size = file.size(), "Re-encoding did not shrink the file, keeping original");
                file.clone()
            }
            Err(e) => {
                warn!(size = file.size(), error = %e, "Compression failed, uploading original bytes");
                file.clone()
            }
        }
    }

    /// Write `bytes` to `folder`, generating a name unless one is pinned
    pub async fn upload(
        &self,
        bytes: Bytes,
        folder: &str,
        name: Option<&str>,
        meta: UploadMeta,
    ) -> Result<UploadResult> {
        let name = match name {
            Some(pinned) => pinned.to_string(),
            None => generate_name(extension_for(&meta.content_type)),
        };
        let path = format!("{}/{}", folder.trim_matches('/'), name);
        let size = bytes.len() as u64;

        let metadata = BlobMetadata {
            original_size: meta.original_size,
            compressed_size: size,
            uploaded_at: Utc::now(),
            source_tag: self.config.source_tag.clone(),
            content_type: meta.content_type,
        };

        let stored = self
            .store
            .put(&path, bytes, metadata)
            .await
            .map_err(|e| match e {
                Error::Validation(_) | Error::Network { .. } | Error::Timeout { .. } => e,
                other => Error::network(self.store.url_for(&path), other),
            })?;

        Ok(UploadResult {
            url: stored.url,
            path: stored.path,
            size,
            compression_ratio: if meta.original_size == 0 {
                1.0
            } else {
                size as f64 / meta.original_size as f64
            },
        })
    }

    /// [`AssetUploader::upload`] retried with exponential backoff on
    /// retryable errors, up to `upload_attempts` attempts
    pub async fn upload_with_retry(
        &self,
        bytes: Bytes,
        folder: &str,
        name: Option<&str>,
        meta: UploadMeta,
    ) -> Result<UploadResult> {
        let mut backoff = self.config.retry_policy();
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match self.upload(bytes.clone(), folder, name, meta.clone()).await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && attempt < self.config.upload_attempts => {
                    let delay = backoff
                        .next_backoff()
                        .unwrap_or_else(|| Duration::from_millis(self.config.retry_max_delay_ms));
                    warn!(
                        folder,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Upload failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Validate, prepare and upload a file
    #[instrument(skip(self, file), fields(size = file.size(), content_type = %file.content_type))]
    pub async fn upload_file(&self, file: &AssetFile, folder: &str) -> Result<UploadResult> {
        self.validate(file)?;
        let prepared = self.prepare(file);
        let meta = UploadMeta {
            original_size: file.size(),
            content_type: prepared.content_type.clone(),
        };

        let result = self
            .upload_with_retry(prepared.bytes, folder, None, meta)
            .await?;
        info!(path = %result.path, size = result.size, ratio = result.compression_ratio, "Uploaded asset");
        Ok(result)
    }
}

/// `<unix-millis>_<8 random hex>.<ext>`
pub fn generate_name(extension: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "{}_{}.{}",
        Utc::now().timestamp_millis(),
        &suffix[..8],
        extension
    )
}
