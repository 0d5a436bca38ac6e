// Worker - Job execution loop

pub mod constants;
mod panic_guard;
mod pool;
mod shutdown;

use constants::*;
pub use panic_guard::{execute_guarded, Guarded};
pub use pool::{WorkerPool, WorkerRuntime};
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};

use crate::application::handlers::HandlerRegistry;
use crate::domain::Job;
use crate::error::{AppError, Result};
use crate::port::{FailureOutcome, QueueBackend};
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{error, info, warn};

/// One consumer slot of a queue
///
/// Pulls a job, runs its handler, reports the outcome, repeats. A worker never
/// holds more than one job, so a pool of N workers runs at most N jobs.
pub struct Worker {
    queue: String,
    slot: usize,
    backend: Arc<dyn QueueBackend>,
    handlers: Arc<HandlerRegistry>,
}

impl Worker {
    pub fn new(
        queue: impl Into<String>,
        slot: usize,
        backend: Arc<dyn QueueBackend>,
        handlers: Arc<HandlerRegistry>,
    ) -> Self {
        Self {
            queue: queue.into(),
            slot,
            backend,
            handlers,
        }
    }

    /// Run worker loop with graceful shutdown support
    ///
    /// A job in hand is always finished before the loop exits.
    pub async fn run(&self, mut shutdown: ShutdownToken) -> Result<()> {
        info!(queue = %self.queue, slot = self.slot, "Worker started");
        loop {
            // Check for shutdown signal
            if shutdown.is_shutdown() {
                info!(queue = %self.queue, slot = self.slot, "Worker shutting down");
                break;
            }
            match self.process_next_job().await {
                Ok(true) => {}
                Ok(false) => {
                    // Queue empty: block until woken, a delayed job is due, or shutdown
                    tokio::select! {
                        _ = self.backend.wait_for_jobs(&self.queue, MAX_IDLE_WAIT) => {},
                        _ = shutdown.wait() => {
                            info!(queue = %self.queue, slot = self.slot, "Worker interrupted during idle");
                            break;
                        }
                    }
                }
                Err(e) => {
                    error!(queue = %self.queue, slot = self.slot, error = %e, "Worker error");
                    tokio::select! {
                        _ = sleep(ERROR_RECOVERY_SLEEP_DURATION) => {},
                        _ = shutdown.wait() => {
                            info!(queue = %self.queue, slot = self.slot, "Worker interrupted during error recovery");
                            break;
                        }
                    }
                }
            }
        }
        info!(queue = %self.queue, slot = self.slot, "Worker stopped");
        Ok(())
    }

    /// Process next job from queue (returns true if a job was processed)
    pub async fn process_next_job(&self) -> Result<bool> {
        // Already Active in the backend, attempts incremented
        let job = match self.backend.dequeue(&self.queue).await? {
            Some(j) => j,
            None => return Ok(false),
        };

        info!(
            job_id = %job.id,
            job_type = %job.job_type,
            attempt = job.attempts,
            "Processing job"
        );

        let handler = match self.handlers.get(&job.job_type) {
            Some(h) => h,
            None => {
                error!(job_id = %job.id, job_type = %job.job_type, "No handler registered");
                self.report_failure(&job, NO_HANDLER_ERROR, false).await?;
                return Ok(true);
            }
        };

        // Handler runs on its own task: a panic must not kill the worker
        let payload = job.payload.clone();
        let execution = execute_guarded(async move { handler.handle(&payload).await }).await;

        match execution {
            Guarded::Completed(Ok(result)) => {
                self.acknowledge(&job, result).await?;
            }
            Guarded::Completed(Err(e)) => {
                warn!(
                    job_id = %job.id,
                    job_type = %job.job_type,
                    attempt = job.attempts,
                    error = %e,
                    "Job handler failed"
                );
                self.report_failure(&job, &e.to_string(), e.is_retryable())
                    .await?;
            }
            Guarded::Panicked(msg) => {
                // Panics are non-retryable
                error!(job_id = %job.id, panic_msg = %msg, "Job panicked");
                self.report_failure(&job, &format!("handler panicked: {}", msg), false)
                    .await?;
            }
            Guarded::Cancelled => {
                error!(job_id = %job.id, "Job cancelled");
                self.report_failure(&job, "handler task cancelled", false)
                    .await?;
            }
        }
        Ok(true)
    }

    /// Ack a successful run, retrying transient store errors
    ///
    /// An ack that never lands hands the attempt back through `fail`, so the
    /// job is delivered again rather than left Active.
    async fn acknowledge(&self, job: &Job, result: serde_json::Value) -> Result<()> {
        let mut delay = ACK_RETRY_BASE_DELAY;
        let mut last_error = String::new();

        for ack_attempt in 1..=ACK_MAX_ATTEMPTS {
            match self.backend.complete(job, Some(result.clone())).await {
                Ok(()) => {
                    info!(job_id = %job.id, job_type = %job.job_type, "Job completed");
                    return Ok(());
                }
                // Pruned, or reclaimed by a newer attempt: nothing left to ack
                Err(
                    e @ (AppError::NotFound(_) | AppError::InvalidState(_) | AppError::Domain(_)),
                ) => {
                    warn!(job_id = %job.id, error = %e, "Acknowledgement rejected");
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        job_id = %job.id,
                        ack_attempt,
                        error = %e,
                        "Acknowledgement failed"
                    );
                    last_error = e.to_string();
                    if ack_attempt < ACK_MAX_ATTEMPTS {
                        sleep(delay).await;
                        delay *= 2;
                    }
                }
            }
        }

        self.report_failure(job, &format!("{}: {}", ACK_FAILED_ERROR, last_error), true)
            .await
    }

    async fn report_failure(&self, job: &Job, message: &str, retryable: bool) -> Result<()> {
        match self.backend.fail(job, message, retryable).await? {
            FailureOutcome::Retried { attempt, delay_ms } => {
                info!(
                    job_id = %job.id,
                    attempt,
                    delay_ms,
                    "Job scheduled for retry"
                );
            }
            FailureOutcome::Failed { attempt } => {
                error!(
                    job_id = %job.id,
                    job_type = %job.job_type,
                    attempt,
                    error = %message,
                    "Job failed permanently"
                );
            }
        }
        Ok(())
    }
}
