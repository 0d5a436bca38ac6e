// Crash recovery for jobs left Active by a dead process
use crate::port::{QueueBackend, TimeProvider};
use std::sync::Arc;
use tracing::info;

use crate::application::worker::constants::DEFAULT_RECOVERY_WINDOW_MS;

/// Crash recovery service
///
/// On daemon startup, puts jobs that were Active when a previous process died
/// back to Waiting so they are delivered again (at-least-once).
pub struct RecoveryService {
    backend: Arc<dyn QueueBackend>,
    time_provider: Arc<dyn TimeProvider>,
    recovery_window_ms: i64,
}

impl RecoveryService {
    /// Create a new recovery service
    ///
    /// # Arguments
    /// * `backend` - Queue backend holding the orphaned jobs
    /// * `time_provider` - Time provider
    /// * `recovery_window_ms` - Optional custom recovery window (default: 5 minutes)
    ///
    /// # Example
    /// ```ignore
    /// let recovery = RecoveryService::new(backend, time_provider, None);
    /// recovery.recover_orphaned_jobs().await?;
    /// ```
    pub fn new(
        backend: Arc<dyn QueueBackend>,
        time_provider: Arc<dyn TimeProvider>,
        recovery_window_ms: Option<i64>,
    ) -> Self {
        Self {
            backend,
            time_provider,
            recovery_window_ms: recovery_window_ms.unwrap_or(DEFAULT_RECOVERY_WINDOW_MS),
        }
    }

    /// Requeue Active jobs started before `now - recovery_window`
    ///
    /// The attempt counter is kept, so a job that keeps killing its process
    /// still runs out of attempts eventually.
    ///
    /// # Returns
    /// Number of jobs recovered
    pub async fn recover_orphaned_jobs(&self) -> crate::error::Result<u64> {
        if !self.backend.is_durable() {
            return Ok(0);
        }

        let now = self.time_provider.now_millis();
        let cutoff = now - self.recovery_window_ms;

        info!(
            cutoff_time = cutoff,
            recovery_window_ms = self.recovery_window_ms,
            "Starting orphaned job recovery"
        );

        let recovered_count = self.backend.requeue_stale_active(cutoff).await?;

        info!(recovered_count, "Orphaned job recovery complete");
        Ok(recovered_count)
    }
}
