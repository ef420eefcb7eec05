//! Migration Pipeline
//!
//! Moves catalog asset references from the external origin host to the
//! managed blob store. Records are processed one at a time in creation
//! order, and the assets of a record one at a time in reference order.
//!
//! A failing asset keeps its original reference while the rest of the
//! record still migrates. A record whose references did not change is never
//! written, so its one-level backup survives re-runs.

use crate::assets::codec::content_type_of;
use crate::assets::{AssetFile, AssetUploader, UploadResult};
use crate::domain::ports::{
    require_non_empty, AssetRecord, CatalogStoreRef, OriginFetcherRef, RecordPatch,
};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

// =============================================================================
// Configuration
// =============================================================================

/// Migration run settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    /// Upper bound on a single origin download
    pub asset_timeout_secs: u64,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            asset_timeout_secs: 60,
        }
    }
}

impl MigrationConfig {
    pub fn asset_timeout(&self) -> Duration {
        Duration::from_secs(self.asset_timeout_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.asset_timeout_secs == 0 {
            return Err(Error::Configuration(
                "migration.asset_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Run Results
// =============================================================================

/// A record-level failure recorded in a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationError {
    pub item_id: String,
    pub item_name: String,
    pub error: String,
}

/// Aggregate result of [`MigrationPipeline::migrate_all`]
///
/// `success + failed + skipped + without_assets == total`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationRun {
    /// Records enumerated
    pub total: usize,
    /// Records whose every asset reached the managed store
    pub success: usize,
    /// Records with an asset fallback or a record-level error
    pub failed: usize,
    /// Records whose references were all managed already
    pub skipped: usize,
    /// Records with no asset references at all
    pub without_assets: usize,
    pub errors: Vec<MigrationError>,
    /// Assets uploaded during this run
    pub assets_migrated: usize,
    /// Assets left at their original reference
    pub assets_fallback: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl MigrationRun {
    fn new(total: usize) -> Self {
        Self {
            total,
            success: 0,
            failed: 0,
            skipped: 0,
            without_assets: 0,
            errors: Vec::new(),
            assets_migrated: 0,
            assets_fallback: 0,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Some records failed alongside successes
    pub fn is_partial_failure(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// What happened to one record in a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStage {
    Migrated,
    PartiallyMigrated,
    Failed,
    Skipped,
    NoAssets,
}

/// Progress report emitted after each record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationProgress {
    pub stage: MigrationStage,
    /// Records processed so far (1-based)
    pub current: usize,
    pub total: usize,
    pub item_name: String,
    pub progress_percent: f64,
}

/// An asset that kept its original reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetFallback {
    pub asset_ref: String,
    pub error: String,
}

/// Result of [`MigrationPipeline::migrate_one`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordOutcome {
    /// References after migration, in the original order
    pub asset_refs: Vec<String>,
    /// Assets uploaded for this record
    pub migrated: usize,
    pub fallbacks: Vec<AssetFallback>,
    /// Whether the record was written back
    pub updated: bool,
}

/// Catalog-wide migration status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationStats {
    pub total_records: usize,
    /// Every reference managed
    pub fully_migrated: usize,
    /// Mix of managed and external references
    pub partially_migrated: usize,
    /// Only external references
    pub pending: usize,
    pub without_assets: usize,
    /// Records that can be restored
    pub with_backup: usize,
    pub managed_refs: usize,
    pub external_refs: usize,
}

// =============================================================================
// Migration Pipeline
// =============================================================================

/// Serial, idempotent asset migration over one catalog collection
pub struct MigrationPipeline {
    collection: String,
    catalog: CatalogStoreRef,
    origin: OriginFetcherRef,
    uploader: Arc<AssetUploader>,
    asset_timeout: Duration,
}

impl MigrationPipeline {
    pub fn new(
        collection: impl Into<String>,
        catalog: CatalogStoreRef,
        origin: OriginFetcherRef,
        uploader: Arc<AssetUploader>,
        config: &MigrationConfig,
    ) -> Self {
        Self {
            collection: collection.into(),
            catalog,
            origin,
            uploader,
            asset_timeout: config.asset_timeout(),
        }
    }

    /// Override the per-download bound
    pub fn with_asset_timeout(mut self, asset_timeout: Duration) -> Self {
        self.asset_timeout = asset_timeout;
        self
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    fn is_managed(&self, asset_ref: &str) -> bool {
        self.uploader.store().is_managed(asset_ref)
    }

    /// Whether `record` has any reference outside the managed store
    pub fn needs_migration(&self, record: &AssetRecord) -> bool {
        record.asset_refs.iter().any(|r| !self.is_managed(r))
    }

    /// Migrate every record of the collection
    ///
    /// Only a failure to enumerate the collection aborts the run; per-record
    /// failures are counted and collected in [`MigrationRun::errors`].
    pub async fn migrate_all<F>(&self, mut on_progress: F) -> Result<MigrationRun>
    where
        F: FnMut(&MigrationProgress) + Send,
    {
        require_non_empty("collection", &self.collection)?;

        let mut records = self.catalog.get_all(&self.collection).await?;
        records.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });

        let mut run = MigrationRun::new(records.len());
        info!(collection = %self.collection, total = run.total, "Starting asset migration");

        for (index, record) in records.iter().enumerate() {
            let stage = if record.asset_refs.is_empty() {
                run.without_assets += 1;
                MigrationStage::NoAssets
            } else if !self.needs_migration(record) {
                run.skipped += 1;
                MigrationStage::Skipped
            } else {
                self.tally(&mut run, record).await
            };

            let current = index + 1;
            on_progress(&MigrationProgress {
                stage,
                current,
                total: run.total,
                item_name: record.display_name().to_string(),
                progress_percent: current as f64 / run.total as f64 * 100.0,
            });
        }

        run.finished_at = Some(Utc::now());
        info!(
            collection = %self.collection,
            total = run.total,
            success = run.success,
            failed = run.failed,
            skipped = run.skipped,
            without_assets = run.without_assets,
            assets_migrated = run.assets_migrated,
            assets_fallback = run.assets_fallback,
            "Asset migration finished"
        );
        Ok(run)
    }

    async fn tally(&self, run: &mut MigrationRun, record: &AssetRecord) -> MigrationStage {
        let (stage, error) = match self.migrate_one(record).await {
            Ok(outcome) if outcome.fallbacks.is_empty() => {
                run.assets_migrated += outcome.migrated;
                run.success += 1;
                return MigrationStage::Migrated;
            }
            Ok(outcome) => {
                run.assets_migrated += outcome.migrated;
                run.assets_fallback += outcome.fallbacks.len();
                let stage = if outcome.migrated > 0 {
                    MigrationStage::PartiallyMigrated
                } else {
                    MigrationStage::Failed
                };
                (stage, describe_fallbacks(&outcome, record.asset_refs.len()))
            }
            Err(e) => (MigrationStage::Failed, e.to_string()),
        };

        warn!(id = %record.id, error = %error, "Record not fully migrated");
        run.failed += 1;
        run.errors.push(MigrationError {
            item_id: record.id.clone(),
            item_name: record.display_name().to_string(),
            error,
        });
        stage
    }

    /// Migrate the references of one record
    ///
    /// Managed references pass through untouched. An asset that cannot be
    /// downloaded or uploaded keeps its original reference. If anything
    /// changed the record is patched with the new references, the previous
    /// set as backup and a migration timestamp.
    #[instrument(skip(self, record), fields(id = %record.id))]
    pub async fn migrate_one(&self, record: &AssetRecord) -> Result<RecordOutcome> {
        require_non_empty("record id", &record.id)?;

        let mut asset_refs = Vec::with_capacity(record.asset_refs.len());
        let mut migrated = 0;
        let mut fallbacks = Vec::new();

        for asset_ref in &record.asset_refs {
            if self.is_managed(asset_ref) {
                asset_refs.push(asset_ref.clone());
                continue;
            }

            match self.migrate_asset(asset_ref).await {
                Ok(uploaded) => {
                    debug!(from = %asset_ref, to = %uploaded.url, "Asset migrated");
                    asset_refs.push(uploaded.url);
                    migrated += 1;
                }
                Err(e) => {
                    warn!(asset = %asset_ref, error = %e, "Asset migration failed, keeping original reference");
                    fallbacks.push(AssetFallback {
                        asset_ref: asset_ref.clone(),
                        error: e.to_string(),
                    });
                    asset_refs.push(asset_ref.clone());
                }
            }
        }

        let updated = asset_refs != record.asset_refs;
        if updated {
            self.catalog
                .update(
                    &self.collection,
                    &record.id,
                    RecordPatch {
                        asset_refs: Some(asset_refs.clone()),
                        asset_refs_backup: Some(record.asset_refs.clone()),
                        migrated_at: Some(Utc::now()),
                        restored_at: None,
                    },
                )
                .await?;
        }

        Ok(RecordOutcome {
            asset_refs,
            migrated,
            fallbacks,
            updated,
        })
    }

    /// Download one asset (bounded by the asset timeout) and upload it
    async fn migrate_asset(&self, asset_ref: &str) -> Result<UploadResult> {
        let fetched = tokio::time::timeout(self.asset_timeout, self.origin.fetch(asset_ref))
            .await
            .map_err(|_| Error::Timeout {
                operation: format!("download {}", asset_ref),
                duration: self.asset_timeout,
            })??;

        let content_type = content_type_of(fetched.content_type.as_deref(), &fetched.bytes);
        let file = AssetFile::new(fetched.bytes, content_type);
        self.uploader
            .upload_file(&file, &self.uploader.config().folder)
            .await
    }

    /// Summarize how far the collection has been migrated
    pub async fn stats(&self) -> Result<MigrationStats> {
        let records = self.catalog.get_all(&self.collection).await?;
        let mut stats = MigrationStats {
            total_records: records.len(),
            ..Default::default()
        };

        for record in &records {
            let managed = record
                .asset_refs
                .iter()
                .filter(|r| self.is_managed(r))
                .count();
            let external = record.asset_refs.len() - managed;
            stats.managed_refs += managed;
            stats.external_refs += external;

            if record.asset_refs_backup.is_some() {
                stats.with_backup += 1;
            }
            match (managed, external) {
                (0, 0) => stats.without_assets += 1,
                (_, 0) => stats.fully_migrated += 1,
                (0, _) => stats.pending += 1,
                _ => stats.partially_migrated += 1,
            }
        }

        Ok(stats)
    }
}

fn describe_fallbacks(outcome: &RecordOutcome, total_assets: usize) -> String {
    let details = outcome
        .fallbacks
        .iter()
        .map(|f| format!("{}: {}", f.asset_ref, f.error))
        .collect::<Vec<_>>()
        .join("; ");
    format!(
        "{} of {} assets not migrated: {}",
        outcome.fallbacks.len(),
        total_assets,
        details
    )
}
