//! Asset Migration
//!
//! Relocates catalog image assets from the external origin host to the
//! managed blob store, and undoes it:
//! - [`MigrationPipeline`]: serial, idempotent, partial-failure tolerant
//! - [`BackupRestore`]: one-level restore, snapshots, orphan cleanup

pub mod backup;
pub mod pipeline;

pub use backup::{
    BackupRestore, CleanupError, CleanupOptions, CleanupProgress, CleanupReport, SnapshotEntry,
};
pub use pipeline::{
    AssetFallback, MigrationConfig, MigrationError, MigrationPipeline, MigrationProgress,
    MigrationRun, MigrationStage, MigrationStats, RecordOutcome,
};
