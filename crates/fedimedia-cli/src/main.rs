//! Fedimedia CLI: maintenance commands for the media store.
//!
//! Reads the same MEDIA_* environment as the server. Commands that touch
//! rows need DATABASE_URL.

use anyhow::Context;
use clap::{Parser, Subcommand};
use fedimedia_core::MediaConfig;
use fedimedia_db::{MediaRepository, PgMediaRepository};
use fedimedia_media::{Cleaner, PruneScheduler, Sweep};
use fedimedia_processing::Ffmpeg;
use fedimedia_storage::create_storage;
use fedimedia_cli::{init_tracing, probe_json, report_json, sweep_json};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

const MAX_DB_CONNECTIONS: u32 = 5;

#[derive(Parser)]
#[command(name = "fedimedia", about = "Media store maintenance")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every sweep, then storage housekeeping
    Prune {
        /// Count what would be removed without touching anything
        #[arg(long)]
        dry_run: bool,
        /// Uncache remote media older than this many days
        #[arg(long)]
        remote_days: Option<u32>,
    },
    /// Run a single sweep
    Sweep {
        /// unused-local, unused-remote, uncache-remote, uncache-remote-emoji,
        /// fix-cache-states or orphaned
        name: Sweep,
        #[arg(long)]
        dry_run: bool,
    },
    /// Probe a local file and print what was detected
    Probe {
        file: PathBuf,
    },
    /// Run the periodic prune loop until interrupted
    Schedule,
}

fn print_json(value: &serde_json::Value) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize output")?;
    println!("{}", out);
    Ok(())
}

async fn cleaner(config: &MediaConfig) -> anyhow::Result<Cleaner> {
    let database_url = config
        .database_url
        .as_deref()
        .context("DATABASE_URL must be set")?;
    let repo = PgMediaRepository::connect(database_url, MAX_DB_CONNECTIONS).await?;
    repo.migrate().await?;
    let repo: Arc<dyn MediaRepository> = Arc::new(repo);

    let storage = create_storage(config)
        .await
        .context("Failed to initialize storage")?;
    Ok(Cleaner::new(repo, storage, config.clone()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = MediaConfig::from_env().context("Invalid media configuration")?;

    match cli.command {
        Commands::Prune {
            dry_run,
            remote_days,
        } => {
            let cleaner = cleaner(&config).await?;
            let days = remote_days.unwrap_or(config.remote_cache_days);
            if let Some(report) = cleaner.prune_all(days, dry_run, true).await {
                print_json(&report_json(&report))?;
            }
        }
        Commands::Sweep { name, dry_run } => {
            let cleaner = cleaner(&config).await?;
            let result = cleaner.run_sweep(name, dry_run).await?;
            print_json(&sweep_json(name.as_str(), dry_run, &result))?;
        }
        Commands::Probe { file } => {
            let ffmpeg = Ffmpeg::from_config(&config);
            let result = fedimedia_processing::probe(&file, &ffmpeg)
                .await
                .with_context(|| format!("Failed to probe {}", file.display()))?;
            print_json(&probe_json(&result))?;
        }
        Commands::Schedule => {
            if !config.cleanup_enabled {
                tracing::warn!("MEDIA_CLEANUP_ENABLED is false, nothing to schedule");
                return Ok(());
            }
            let cleaner = cleaner(&config).await?;
            let period = Duration::from_secs(config.cleanup_interval_hours * 3600);
            let scheduler = Arc::new(PruneScheduler::new(
                cleaner,
                period,
                config.remote_cache_days,
            ));
            let handle = scheduler.clone().start();

            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for ctrl-c")?;
            tracing::info!("Shutdown signal received");
            scheduler.stop();
            handle.await.context("Prune scheduler panicked")?;
        }
    }

    Ok(())
}
