//! Payload Compression
//!
//! Compression of cache payloads written by the durable backend. Small
//! payloads and payloads that do not shrink are stored as-is.

use crate::error::{Error, Result};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Compression Algorithm
// =============================================================================

/// Compression algorithm identifier recorded next to stored payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionAlgorithm {
    #[default]
    None,
    Zstd,
}

impl fmt::Display for CompressionAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompressionAlgorithm::None => write!(f, "none"),
            CompressionAlgorithm::Zstd => write!(f, "zstd"),
        }
    }
}

// =============================================================================
// Compression Configuration
// =============================================================================

/// Configuration for payload compression
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    /// Whether compression is enabled at all
    pub enabled: bool,
    /// Minimum size to compress (smaller payloads are stored uncompressed)
    pub min_size_bytes: u64,
    /// Zstd compression level
    pub level: i32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_size_bytes: 1024, // 1KB minimum
            level: 3,
        }
    }
}

// =============================================================================
// Compression Manager
// =============================================================================

/// Compresses and decompresses stored payloads
#[derive(Debug, Clone, Default)]
pub struct CompressionManager {
    config: CompressionConfig,
}

impl CompressionManager {
    /// Create with custom config
    pub fn with_config(config: CompressionConfig) -> Self {
        Self { config }
    }

    /// Compress data if it is worth it
    ///
    /// Returns (stored_data, algorithm_used). Falls back to uncompressed if
    /// compression fails, is disabled, or does not shrink the payload.
    pub fn compress(&self, data: &[u8]) -> (Bytes, CompressionAlgorithm) {
        if !self.config.enabled || (data.len() as u64) < self.config.min_size_bytes {
            return (Bytes::copy_from_slice(data), CompressionAlgorithm::None);
        }

        match zstd::encode_all(data, self.config.level) {
            Ok(compressed) if compressed.len() < data.len() => {
                (Bytes::from(compressed), CompressionAlgorithm::Zstd)
            }
            Ok(_) => (Bytes::copy_from_slice(data), CompressionAlgorithm::None),
            Err(e) => {
                tracing::warn!(error = %e, "Compression failed, storing uncompressed");
                (Bytes::copy_from_slice(data), CompressionAlgorithm::None)
            }
        }
    }

    /// Decompress data stored with `algorithm`
    pub fn decompress(&self, data: &[u8], algorithm: CompressionAlgorithm) -> Result<Bytes> {
        match algorithm {
            CompressionAlgorithm::None => Ok(Bytes::copy_from_slice(data)),
            CompressionAlgorithm::Zstd => zstd::decode_all(data)
                .map(Bytes::from)
                .map_err(|e| Error::Compression(format!("Zstd decompression failed: {}", e))),
        }
    }
}
