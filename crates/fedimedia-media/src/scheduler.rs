//! Periodic prune-all trigger.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

use crate::prune::Cleaner;

pub struct PruneScheduler {
    cleaner: Cleaner,
    period: Duration,
    remote_days: u32,
    shutdown_tx: watch::Sender<bool>,
}

impl PruneScheduler {
    pub fn new(cleaner: Cleaner, period: Duration, remote_days: u32) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            cleaner,
            period,
            remote_days,
            shutdown_tx,
        }
    }

    /// Start the background loop. The first run happens immediately, then
    /// once per period. Returns a JoinHandle for graceful shutdown.
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            let mut prune_interval = interval(self.period);
            prune_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            tracing::info!(
                period_secs = self.period.as_secs(),
                remote_days = self.remote_days,
                "Prune scheduler started"
            );

            loop {
                tokio::select! {
                    _ = prune_interval.tick() => {
                        tracing::info!("Starting scheduled prune");
                        if let Some(report) = self.cleaner.prune_all(self.remote_days, false, true).await {
                            if report.errors.is_empty() {
                                tracing::info!(total = report.total(), "Scheduled prune completed successfully");
                            } else {
                                tracing::error!(errors = %report.errors, "Scheduled prune completed with errors");
                            }
                        }
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }

            tracing::info!("Prune scheduler stopped");
        })
    }

    /// Ask the loop to exit after the current run.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}
