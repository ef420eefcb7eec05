//! Backup and Restore
//!
//! One-level undo of a migration, catalog snapshots for audit, and removal
//! of managed blobs no record references any more.

use crate::domain::ports::{
    require_non_empty, AssetRecord, BlobStoreRef, CatalogStoreRef, RecordPatch,
};
use crate::error::{Error, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info, instrument, warn};

/// One record of a snapshot manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotEntry {
    pub id: String,
    pub title: String,
    pub asset_refs: Vec<String>,
    pub asset_refs_backup: Option<Vec<String>>,
}

impl From<AssetRecord> for SnapshotEntry {
    fn from(record: AssetRecord) -> Self {
        Self {
            id: record.id,
            title: record.title,
            asset_refs: record.asset_refs,
            asset_refs_backup: record.asset_refs_backup,
        }
    }
}

/// Orphan cleanup settings
#[derive(Debug, Clone, Default)]
pub struct CleanupOptions {
    /// Report orphans without deleting them
    pub dry_run: bool,
    /// Folder to scan; the whole store when `None`
    pub folder: Option<String>,
}

/// Progress report emitted after each inspected blob
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupProgress {
    pub current: usize,
    pub total: usize,
    pub path: String,
}

/// A blob that could not be deleted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupError {
    pub path: String,
    pub error: String,
}

/// Result of [`BackupRestore::cleanup_orphans`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    /// Blobs listed
    pub scanned: usize,
    /// Blobs still referenced by some record
    pub referenced: usize,
    /// Unreferenced blob paths (deleted unless `dry_run`)
    pub orphans: Vec<String>,
    pub deleted: usize,
    pub bytes_reclaimed: u64,
    pub errors: Vec<CleanupError>,
    pub dry_run: bool,
}

impl CleanupReport {
    pub fn is_partial_failure(&self) -> bool {
        !self.errors.is_empty()
    }
}

// =============================================================================
// Backup Restore
// =============================================================================

/// Restore, snapshot and orphan cleanup over one catalog collection
pub struct BackupRestore {
    collection: String,
    catalog: CatalogStoreRef,
    store: BlobStoreRef,
}

impl BackupRestore {
    pub fn new(collection: impl Into<String>, catalog: CatalogStoreRef, store: BlobStoreRef) -> Self {
        Self {
            collection: collection.into(),
            catalog,
            store,
        }
    }

    /// Put a record's backed-up references back in service
    ///
    /// The backup is kept, so restoring twice re-applies the same set.
    #[instrument(skip(self))]
    pub async fn restore_one(&self, id: &str) -> Result<AssetRecord> {
        require_non_empty("record id", id)?;

        let mut record = self
            .catalog
            .get(&self.collection, id)
            .await?
            .ok_or_else(|| Error::not_found(self.collection.as_str(), id))?;
        let backup = record
            .asset_refs_backup
            .clone()
            .ok_or_else(|| Error::not_found("backup", id))?;

        let patch = RecordPatch {
            asset_refs: Some(backup),
            restored_at: Some(Utc::now()),
            ..Default::default()
        };
        self.catalog
            .update(&self.collection, id, patch.clone())
            .await?;
        patch.apply(&mut record);

        info!(id, refs = record.asset_refs.len(), "Restored asset references from backup");
        Ok(record)
    }

    /// Manifest of every record's current and backed-up references, by id
    pub async fn snapshot_all(&self) -> Result<Vec<SnapshotEntry>> {
        let mut entries: Vec<SnapshotEntry> = self
            .catalog
            .get_all(&self.collection)
            .await?
            .into_iter()
            .map(SnapshotEntry::from)
            .collect();
        entries.sort_by(|a, b| a.id.cmp(&b.id));
        debug!(records = entries.len(), "Built catalog snapshot");
        Ok(entries)
    }

    /// Delete managed blobs that no record's current references point at
    ///
    /// Delete failures are collected in the report and never abort the
    /// sweep. Backups do not count as references.
    pub async fn cleanup_orphans<F>(
        &self,
        options: &CleanupOptions,
        mut on_progress: F,
    ) -> Result<CleanupReport>
    where
        F: FnMut(&CleanupProgress) + Send,
    {
        let referenced: HashSet<String> = self
            .catalog
            .get_all(&self.collection)
            .await?
            .iter()
            .flat_map(|record| record.asset_refs.iter())
            .filter_map(|asset_ref| self.store.path_for_url(asset_ref))
            .collect();

        let folder = options.folder.as_deref().unwrap_or_default();
        let blobs = self.store.list(folder).await?;
        let mut report = CleanupReport {
            scanned: blobs.len(),
            dry_run: options.dry_run,
            ..Default::default()
        };
        info!(
            folder,
            blobs = blobs.len(),
            referenced = referenced.len(),
            dry_run = options.dry_run,
            "Scanning for orphaned blobs"
        );

        for (index, blob) in blobs.iter().enumerate() {
            if referenced.contains(&blob.path) {
                report.referenced += 1;
            } else {
                report.orphans.push(blob.path.clone());
                if !options.dry_run {
                    match self.store.delete(&blob.path).await {
                        Ok(()) => {
                            report.deleted += 1;
                            report.bytes_reclaimed += blob.size;
                        }
                        Err(e) => {
                            warn!(path = %blob.path, error = %e, "Failed to delete orphaned blob");
                            report.errors.push(CleanupError {
                                path: blob.path.clone(),
                                error: e.to_string(),
                            });
                        }
                    }
                }
            }

            on_progress(&CleanupProgress {
                current: index + 1,
                total: blobs.len(),
                path: blob.path.clone(),
            });
        }

        info!(
            scanned = report.scanned,
            orphans = report.orphans.len(),
            deleted = report.deleted,
            errors = report.errors.len(),
            "Orphan cleanup finished"
        );
        Ok(report)
    }
}
