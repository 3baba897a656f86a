//! Prune and cache engine.
//!
//! Independent sweeps over the rows and the blob store. Every sweep pages
//! through the repository, can run dry (count only), and treats a blob or
//! row that is already gone as done. Per-row failures are logged and
//! collected; a failed page read aborts only the sweep it belongs to.

mod emoji;
mod media;
mod orphans;

use fedimedia_core::{MediaConfig, MediaError, MultiError};
use fedimedia_db::MediaRepository;
use fedimedia_storage::Storage;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

/// Result of one sweep: how many rows or keys matched, plus the per-row
/// failures it stepped over.
#[derive(Debug, Default)]
pub struct SweepResult {
    pub pruned: usize,
    pub errors: MultiError,
}

impl SweepResult {
    pub(crate) fn record(&mut self, context: &str, err: impl fmt::Display) {
        self.errors.push(context, err);
    }
}

/// The individually runnable sweeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sweep {
    UnusedLocal,
    UnusedRemote,
    UncacheRemote,
    UncacheRemoteEmoji,
    FixCacheStates,
    Orphaned,
}

impl Sweep {
    pub const ALL: [Sweep; 6] = [
        Sweep::UnusedLocal,
        Sweep::UnusedRemote,
        Sweep::UncacheRemote,
        Sweep::UncacheRemoteEmoji,
        Sweep::FixCacheStates,
        Sweep::Orphaned,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Sweep::UnusedLocal => "unused-local",
            Sweep::UnusedRemote => "unused-remote",
            Sweep::UncacheRemote => "uncache-remote",
            Sweep::UncacheRemoteEmoji => "uncache-remote-emoji",
            Sweep::FixCacheStates => "fix-cache-states",
            Sweep::Orphaned => "orphaned",
        }
    }
}

impl fmt::Display for Sweep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sweep {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Sweep::ALL
            .into_iter()
            .find(|sweep| sweep.as_str() == s)
            .ok_or_else(|| format!("unknown sweep: {s}"))
    }
}

/// Combined outcome of [`Cleaner::prune_all`].
#[derive(Debug, Default)]
pub struct PruneReport {
    pub dry_run: bool,
    pub unused_local: usize,
    pub unused_remote: usize,
    pub uncached_remote: usize,
    pub uncached_emoji: usize,
    pub fixed_cache_states: usize,
    pub orphaned: usize,
    pub errors: MultiError,
}

impl PruneReport {
    pub fn total(&self) -> usize {
        self.unused_local
            + self.unused_remote
            + self.uncached_remote
            + self.uncached_emoji
            + self.fixed_cache_states
            + self.orphaned
    }

    pub fn log(&self) {
        tracing::info!(
            dry_run = self.dry_run,
            unused_local = self.unused_local,
            unused_remote = self.unused_remote,
            uncached_remote = self.uncached_remote,
            uncached_emoji = self.uncached_emoji,
            fixed_cache_states = self.fixed_cache_states,
            orphaned = self.orphaned,
            total = self.total(),
            errors = self.errors.len(),
            "Prune completed"
        );
        if !self.errors.is_empty() {
            tracing::warn!(errors = %self.errors, "Prune finished with errors");
        }
    }
}

#[derive(Clone)]
pub struct Cleaner {
    repo: Arc<dyn MediaRepository>,
    storage: Arc<dyn Storage>,
    config: MediaConfig,
}

impl Cleaner {
    pub fn new(
        repo: Arc<dyn MediaRepository>,
        storage: Arc<dyn Storage>,
        config: MediaConfig,
    ) -> Self {
        Self {
            repo,
            storage,
            config,
        }
    }

    fn page_size(&self) -> usize {
        self.config.prune_page_size.max(1)
    }

    /// Run one sweep with the configured retention windows.
    pub async fn run_sweep(&self, sweep: Sweep, dry_run: bool) -> Result<SweepResult, MediaError> {
        match sweep {
            Sweep::UnusedLocal => {
                self.prune_unused_local(self.config.unused_local_days, dry_run)
                    .await
            }
            Sweep::UnusedRemote => self.prune_unused_remote(dry_run).await,
            Sweep::UncacheRemote => {
                self.uncache_remote(self.config.remote_cache_days, dry_run)
                    .await
            }
            Sweep::UncacheRemoteEmoji => {
                self.uncache_remote_emoji(self.config.remote_cache_days, dry_run)
                    .await
            }
            Sweep::FixCacheStates => self.fix_cache_states(dry_run).await,
            Sweep::Orphaned => self.prune_orphaned(dry_run).await,
        }
    }

    /// Run every sweep followed by storage housekeeping. With `blocking`
    /// unset the work is spawned and `None` is returned immediately.
    pub async fn prune_all(
        &self,
        remote_days: u32,
        dry_run: bool,
        blocking: bool,
    ) -> Option<PruneReport> {
        if blocking {
            return Some(self.prune_all_inner(remote_days, dry_run).await);
        }

        let cleaner = self.clone();
        tokio::spawn(async move {
            cleaner.prune_all_inner(remote_days, dry_run).await;
        });
        None
    }

    #[tracing::instrument(skip(self), fields(cleanup.operation = "prune_all"))]
    async fn prune_all_inner(&self, remote_days: u32, dry_run: bool) -> PruneReport {
        let start = Instant::now();
        let mut report = PruneReport {
            dry_run,
            ..Default::default()
        };

        for sweep in Sweep::ALL {
            let result = match sweep {
                Sweep::UncacheRemote => self.uncache_remote(remote_days, dry_run).await,
                Sweep::UncacheRemoteEmoji => self.uncache_remote_emoji(remote_days, dry_run).await,
                other => self.run_sweep(other, dry_run).await,
            };

            let pruned = match result {
                Ok(result) => {
                    report.errors.extend(result.errors);
                    result.pruned
                }
                Err(e) => {
                    tracing::error!(error = %e, sweep = %sweep, "Sweep aborted");
                    report.errors.push(sweep.as_str(), e);
                    0
                }
            };

            match sweep {
                Sweep::UnusedLocal => report.unused_local = pruned,
                Sweep::UnusedRemote => report.unused_remote = pruned,
                Sweep::UncacheRemote => report.uncached_remote = pruned,
                Sweep::UncacheRemoteEmoji => report.uncached_emoji = pruned,
                Sweep::FixCacheStates => report.fixed_cache_states = pruned,
                Sweep::Orphaned => report.orphaned = pruned,
            }
        }

        if !dry_run {
            if let Err(e) = self.storage.clean().await {
                tracing::error!(error = %e, "Storage clean failed");
                report.errors.push("storage clean", e);
            }
        }

        report.log();
        tracing::debug!(
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Prune run finished"
        );
        report
    }

    /// Delete a set of blobs. Not-found counts as deleted; the first other
    /// failure is returned.
    async fn delete_blobs(&self, keys: &[&str]) -> Result<(), MediaError> {
        for key in keys {
            match self.storage.delete(key).await {
                Ok(()) => tracing::debug!(key = %key, "Deleted blob"),
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

fn log_summary(sweep: Sweep, dry_run: bool, result: &SweepResult, start: Instant) {
    tracing::info!(
        sweep = %sweep,
        dry_run,
        pruned = result.pruned,
        errors = result.errors.len(),
        duration_ms = start.elapsed().as_secs_f64() * 1000.0,
        "Sweep completed"
    );
}
