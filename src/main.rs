//! Storefront Assets
//!
//! Administrative command line for the storefront asset service: run the
//! asset migration, restore records from their backups, take catalog
//! snapshots, remove orphaned blobs and inspect the caches.

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use storefront_assets::{
    AppConfig, AssetService, BlobStoreKind, CleanupOptions, Result,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Storefront Assets - tiered cache and image asset migration
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML configuration file
    #[arg(long, env = "STOREFRONT_CONFIG")]
    config: Option<PathBuf>,

    /// Root directory of the filesystem blob store
    #[arg(long, env = "BLOB_ROOT")]
    blob_root: Option<PathBuf>,

    /// Public base URL of the blob store
    #[arg(long, env = "BLOB_BASE_URL")]
    base_url: Option<String>,

    /// JSON catalog file
    #[arg(long, env = "CATALOG_PATH")]
    catalog: Option<PathBuf>,

    /// Catalog collection holding the records
    #[arg(long, env = "CATALOG_COLLECTION")]
    collection: Option<String>,

    /// Directory of the durable cache
    #[arg(long, env = "CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    /// Keep the cache in memory only
    #[arg(long, env = "NO_DURABLE_CACHE")]
    no_durable_cache: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Move every external asset of the catalog into the blob store
    Migrate,
    /// Put a record's backed-up asset references back in service
    Restore {
        /// Record id
        id: String,
    },
    /// Write a manifest of every record's current and backed-up references
    Snapshot {
        /// Output file; stdout when omitted
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Delete managed blobs no record references
    Cleanup {
        /// Report orphans without deleting them
        #[arg(long)]
        dry_run: bool,
        /// Folder to scan; the upload folder when omitted
        #[arg(long)]
        folder: Option<String>,
    },
    /// Show migration progress of the catalog
    Stats,
    /// Resolve one image through the image cache
    Image {
        /// Remote image URL
        url: String,
    },
    /// Remove expired cache entries
    Sweep,
}

impl Args {
    /// Load the configuration file and apply command-line overrides
    fn app_config(&self) -> Result<AppConfig> {
        let mut config = AppConfig::load(self.config.as_deref())?;

        if let Some(root) = &self.blob_root {
            config.blob_store.kind = BlobStoreKind::Filesystem;
            config.blob_store.root_path = root.clone();
        }
        if let Some(base_url) = &self.base_url {
            config.blob_store.base_url = base_url.clone();
        }
        if let Some(path) = &self.catalog {
            config.catalog.path = path.clone();
        }
        if let Some(collection) = &self.collection {
            config.catalog.collection = collection.clone();
        }
        if let Some(dir) = &self.cache_dir {
            config.cache.durable.root_path = dir.clone();
        }
        if self.no_durable_cache {
            config.cache.durable_enabled = false;
        }

        Ok(config)
    }
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args);

    info!("Starting {} v{}", storefront_assets::NAME, storefront_assets::VERSION);

    let config = args.app_config()?;
    info!("  Catalog: {} ({:?})", config.catalog.collection, config.catalog.kind);
    info!("  Blob store: {} ({:?})", config.blob_store.base_url, config.blob_store.kind);
    info!("  Durable cache: {}", config.cache.durable_enabled);

    let service = AssetService::from_config(&config)?;
    let swept = service.startup_sweep().await;
    if swept > 0 {
        info!("Startup sweep removed {} expired cache entries", swept);
    }

    match args.command {
        Command::Migrate => {
            let run = service
                .migrate_all(|progress| {
                    info!(
                        "[{}/{}] {:?} {} ({:.1}%)",
                        progress.current,
                        progress.total,
                        progress.stage,
                        progress.item_name,
                        progress.progress_percent
                    );
                })
                .await?;
            if run.is_partial_failure() {
                warn!("{} records kept some original references", run.failed);
            }
            print_json(&run)?;
        }
        Command::Restore { id } => {
            let record = service.restore_one(&id).await?;
            print_json(&record)?;
        }
        Command::Snapshot { output } => {
            let snapshot = service.snapshot_all().await?;
            let json = serde_json::to_string_pretty(&snapshot)?;
            match output {
                Some(path) => {
                    tokio::fs::write(&path, json).await?;
                    info!("Snapshot of {} records written to {}", snapshot.len(), path.display());
                }
                None => println!("{}", json),
            }
        }
        Command::Cleanup { dry_run, folder } => {
            let report = service
                .cleanup_orphans(CleanupOptions { dry_run, folder }, |progress| {
                    tracing::debug!("[{}/{}] {}", progress.current, progress.total, progress.path);
                })
                .await?;
            print_json(&report)?;
        }
        Command::Stats => {
            let stats = service.migration_stats().await?;
            print_json(&stats)?;
        }
        Command::Image { url } => {
            let resolved = service.get_cached_image(&url).await;
            let stat = service.image_stats().await;
            print_json(&serde_json::json!({
                "cached": resolved.starts_with("data:"),
                "length": resolved.len(),
                "stats": stat,
            }))?;
        }
        Command::Sweep => {
            let removed = service.startup_sweep().await;
            print_json(&serde_json::json!({ "removed": swept + removed }))?;
        }
    }

    info!("Done");
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "reqwest=info", "rustls=warn"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    // Logs go to stderr so command output on stdout stays parseable
    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}
