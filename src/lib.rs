//! Storefront Assets - Tiered Cache and Asset Migration
//!
//! Caching and asset plumbing behind the storefront catalog: a namespaced
//! TTL cache with durable and in-process tiers, a fetch-through cache that
//! turns remote images into `data:` URIs, and an administrative pipeline
//! that moves catalog images from an external origin host into a managed
//! blob store (with backup, restore and orphan cleanup).
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────────┐
//! │                              AssetService                                    │
//! ├─────────────────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────────┐  │
//! │  │  TieredCache    │  │ ImageFetchCache │  │ MigrationPipeline           │  │
//! │  │  (namespaces)   │  │ (data: URIs)    │  │ BackupRestore               │  │
//! │  └────────┬────────┘  └────────┬────────┘  └─────────────┬───────────────┘  │
//! │           │                    │                         │                   │
//! │  ┌────────┴────────────────────┴──┐          ┌───────────┴───────────┐      │
//! │  │ StorageBackend                 │          │ AssetUploader          │      │
//! │  │ (durable files / ephemeral map)│          │ (compress + retry)     │      │
//! │  └────────────────────────────────┘          └───────────────────────┘      │
//! ├─────────────────────────────────────────────────────────────────────────────┤
//! │                         Boundary Ports                                       │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────────┐  │
//! │  │  OriginFetcher  │  │    BlobStore    │  │        CatalogStore         │  │
//! │  │  (reqwest)      │  │ (fs / memory)   │  │     (JSON file / memory)    │  │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`cache`]: Tiered cache, storage backends and the image fetch cache
//! - [`assets`]: Image codec and the blob uploader
//! - [`migration`]: Migration pipeline, backup and restore
//! - [`backends`]: Concrete adapters for the boundary ports
//! - [`service`]: Facade wiring everything from one configuration
//! - [`config`]: YAML configuration
//! - [`domain`]: Core domain types and traits
//! - [`error`]: Error types and handling

pub mod assets;
pub mod backends;
pub mod cache;
pub mod config;
pub mod domain;
pub mod error;
pub mod migration;
pub mod service;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use assets::{AssetFile, AssetUploader, UploadMeta, UploadResult, UploaderConfig};

pub use backends::{
    BlobStoreConfig, BlobStoreKind, CatalogConfig, CatalogKind, FsBlobStore, HttpOrigin,
    JsonFileCatalog, MemoryBlobStore, MemoryCatalog, OriginConfig,
};

pub use cache::{
    BackendKind, CacheStore, DurableBackendConfig, ImageCacheStat, ImageFetchCache,
    StorageBackend, StorageHandle, TieredCache,
};

pub use config::{AppConfig, CacheConfig};

pub use domain::ports::{
    AssetRecord, BlobStore, CatalogStore, FetchedAsset, OriginFetcher, RecordPatch,
};

pub use error::{Error, ErrorAction, Result};

pub use migration::{
    BackupRestore, CleanupOptions, CleanupReport, MigrationConfig, MigrationPipeline,
    MigrationProgress, MigrationRun, MigrationStats, SnapshotEntry,
};

pub use service::AssetService;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
