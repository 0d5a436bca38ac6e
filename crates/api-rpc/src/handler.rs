//! RPC Method Handlers
//!
//! Implements the business logic for each JSON-RPC method.

use crate::error::{throttled, to_rpc_error};
use crate::rate_limiter::RateLimiter;
use crate::types::{EnqueueRequest, GetJobRequest, HealthResponse, JobView, PruneResponse};
use conductor_core::application::{Dispatcher, HealthReporter, JobHandle};
use conductor_core::domain::Job;
use conductor_core::error::AppError;
use conductor_core::port::{QueueBackend, RetentionPolicy};
use jsonrpsee::types::ErrorObjectOwned;
use std::sync::Arc;
use tracing::{debug, info};

/// RPC Handler with injected dependencies
pub struct RpcHandler {
    dispatcher: Arc<Dispatcher>,
    health: Arc<HealthReporter>,
    retention: RetentionPolicy,
    rate_limiter: RateLimiter,
}

impl RpcHandler {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        health: Arc<HealthReporter>,
        retention: RetentionPolicy,
        rate_limit_burst: u32,
        rate_limit_per_sec: u32,
    ) -> Self {
        Self {
            dispatcher,
            health,
            retention,
            rate_limiter: RateLimiter::new(rate_limit_burst, rate_limit_per_sec),
        }
    }

    fn backend(&self) -> &Arc<dyn QueueBackend> {
        self.dispatcher.backend()
    }

    /// jobs.enqueue.v1
    pub async fn enqueue(&self, params: EnqueueRequest) -> Result<JobHandle, ErrorObjectOwned> {
        if !self.rate_limiter.try_acquire() {
            return Err(throttled());
        }

        let options = params.options();
        let handle = self
            .dispatcher
            .enqueue(&params.job_type, params.payload, options)
            .await
            .map_err(to_rpc_error)?;

        debug!(job_id = %handle.job_id, queue = %handle.queue, "Job enqueued over RPC");
        Ok(handle)
    }

    /// jobs.get.v1
    pub async fn get_job(&self, params: GetJobRequest) -> Result<JobView, ErrorObjectOwned> {
        let job = self
            .backend()
            .find(&params.job_id)
            .await
            .map_err(to_rpc_error)?
            .ok_or_else(|| {
                to_rpc_error(AppError::NotFound(format!("Job {} not found", params.job_id)))
            })?;

        Ok(job_view(job))
    }

    /// admin.health.v1
    pub async fn health(&self) -> Result<HealthResponse, ErrorObjectOwned> {
        Ok(HealthResponse {
            pending: self.health.report().await,
            snapshot: self.health.snapshot().await,
        })
    }

    /// admin.prune.v1
    pub async fn prune(&self) -> Result<PruneResponse, ErrorObjectOwned> {
        let stats = self
            .backend()
            .prune(&self.retention)
            .await
            .map_err(to_rpc_error)?;

        info!(
            completed_removed = stats.completed_removed,
            failed_removed = stats.failed_removed,
            "Manual prune"
        );
        Ok(PruneResponse {
            completed_removed: stats.completed_removed,
            failed_removed: stats.failed_removed,
        })
    }
}

fn job_view(job: Job) -> JobView {
    JobView {
        job_id: job.id,
        queue: job.queue,
        job_type: job.job_type,
        state: job.state.to_string(),
        attempts: job.attempts,
        max_attempts: job.max_attempts,
        priority: job.priority,
        enqueued_at: job.enqueued_at,
        visible_at: job.visible_at,
        started_at: job.started_at,
        finished_at: job.finished_at,
        last_error: job.last_error,
        result: job.result,
    }
}
