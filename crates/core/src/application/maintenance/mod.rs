// Retention Scheduler
// Periodic pruning of finished jobs and reclaiming of stale Active ones

use crate::error::Result;
use crate::port::{PruneStats, QueueBackend, RetentionPolicy};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

use super::recovery::RecoveryService;
use super::worker::ShutdownToken;

/// Retention scheduler
///
/// Removes Completed and Failed jobs that fall outside the retention policy.
/// With a stale sweep attached, each pass also puts back jobs whose worker
/// never reported an outcome.
pub struct RetentionScheduler {
    backend: Arc<dyn QueueBackend>,
    policy: RetentionPolicy,
    every: Duration,
    stale_sweep: Option<RecoveryService>,
}

impl RetentionScheduler {
    /// Create a new retention scheduler
    ///
    /// # Arguments
    /// * `backend` - Queue backend to prune
    /// * `policy` - Age and count limits per state
    /// * `every` - How often to prune
    pub fn new(backend: Arc<dyn QueueBackend>, policy: RetentionPolicy, every: Duration) -> Self {
        Self {
            backend,
            policy,
            every,
            stale_sweep: None,
        }
    }

    /// Reclaim stale Active jobs on every pass
    pub fn with_stale_sweep(mut self, recovery: RecoveryService) -> Self {
        self.stale_sweep = Some(recovery);
        self
    }

    /// Run prune loop until shutdown (background task)
    ///
    /// Should be spawned in tokio::spawn
    pub async fn run(self, mut shutdown: ShutdownToken) {
        info!(
            interval_secs = self.every.as_secs(),
            completed_max_age_ms = self.policy.completed_max_age_ms,
            failed_max_age_ms = self.policy.failed_max_age_ms,
            "Retention scheduler started"
        );

        let mut tick = interval(self.every);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = tick.tick() => {}
                _ = shutdown.wait() => break,
            }

            if let Err(e) = self.run_now().await {
                error!(error = ?e, "Scheduled prune failed");
            }
            if let Err(e) = self.sweep_stale().await {
                error!(error = ?e, "Stale job sweep failed");
            }
        }
        info!("Retention scheduler stopped");
    }

    /// Prune immediately (for manual trigger)
    pub async fn run_now(&self) -> Result<PruneStats> {
        let stats = self.backend.prune(&self.policy).await?;

        if stats.total() > 0 {
            info!(
                completed_removed = stats.completed_removed,
                failed_removed = stats.failed_removed,
                "Finished jobs pruned"
            );
        }

        Ok(stats)
    }

    /// Requeue Active jobs older than the sweep window (0 without a sweep)
    pub async fn sweep_stale(&self) -> Result<u64> {
        match &self.stale_sweep {
            Some(recovery) => recovery.recover_orphaned_jobs().await,
            None => Ok(0),
        }
    }
}
