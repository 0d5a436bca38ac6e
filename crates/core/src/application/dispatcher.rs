// Dispatcher - producer facade used by domain services to enqueue work

use crate::application::registry::JobRegistry;
use crate::domain::{DomainError, JobId, JobPayload, NewJob, Priority, RetryPolicy};
use crate::error::{AppError, Result};
use crate::port::QueueBackend;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Accepted priority range (higher = dequeued first)
pub const PRIORITY_RANGE: std::ops::RangeInclusive<Priority> = -100..=100;

/// Accepted range for a per-job max_attempts override
pub const MAX_ATTEMPTS_RANGE: std::ops::RangeInclusive<i32> = 1..=25;

/// Per-enqueue options (all optional)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnqueueOptions {
    /// Job becomes visible to workers after this many ms
    #[serde(default)]
    pub delay_ms: i64,

    #[serde(default)]
    pub priority: Priority,

    /// Overrides the registry's default max_attempts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<i32>,

    /// Overrides the registry's default backoff base delay
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff_base_ms: Option<i64>,
}

impl EnqueueOptions {
    pub fn delayed(delay_ms: i64) -> Self {
        Self {
            delay_ms,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.delay_ms < 0 {
            return Err(AppError::Validation(format!(
                "delay_ms must not be negative (got {})",
                self.delay_ms
            )));
        }
        if !PRIORITY_RANGE.contains(&self.priority) {
            return Err(DomainError::InvalidPriority(self.priority).into());
        }
        if let Some(max_attempts) = self.max_attempts {
            if !MAX_ATTEMPTS_RANGE.contains(&max_attempts) {
                return Err(AppError::Validation(format!(
                    "max_attempts must be within {}..={} (got {})",
                    MAX_ATTEMPTS_RANGE.start(),
                    MAX_ATTEMPTS_RANGE.end(),
                    max_attempts
                )));
            }
        }
        if let Some(base) = self.backoff_base_ms {
            if base < 0 {
                return Err(AppError::Validation(format!(
                    "backoff_base_ms must not be negative (got {})",
                    base
                )));
            }
        }
        Ok(())
    }

    fn retry_policy(&self, default: RetryPolicy) -> RetryPolicy {
        RetryPolicy::exponential(
            self.max_attempts.unwrap_or(default.max_attempts),
            self.backoff_base_ms.unwrap_or(default.base_delay_ms()),
        )
    }
}

/// Reference to an accepted job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHandle {
    pub job_id: JobId,
    pub queue: String,
    pub job_type: String,
    /// False when the no-op backend accepted the job (it will never run)
    pub durable: bool,
}

/// Producer API: resolves the queue, applies options, hands off to the backend
///
/// Never waits for execution.
pub struct Dispatcher {
    registry: Arc<JobRegistry>,
    backend: Arc<dyn QueueBackend>,
}

impl Dispatcher {
    pub fn new(registry: Arc<JobRegistry>, backend: Arc<dyn QueueBackend>) -> Self {
        Self { registry, backend }
    }

    /// Enqueue an untyped payload for a job type by name
    pub async fn enqueue(
        &self,
        job_type: &str,
        payload: serde_json::Value,
        options: EnqueueOptions,
    ) -> Result<JobHandle> {
        // Unknown type is reported before the payload is looked at
        self.registry.queue_for(job_type)?;

        let payload = JobPayload::from_json(job_type, payload)
            .map_err(|e| AppError::Validation(e.to_string()))?;

        self.dispatch(payload, options).await
    }

    /// Enqueue a typed payload
    pub async fn dispatch(&self, payload: JobPayload, options: EnqueueOptions) -> Result<JobHandle> {
        let job_type = payload.job_type();
        let queue = self.registry.queue_for(job_type)?.name.clone();

        payload
            .validate()
            .map_err(|e| AppError::Validation(e.to_string()))?;
        options.validate()?;

        let new_job = NewJob {
            queue: queue.clone(),
            payload,
            delay_ms: options.delay_ms,
            priority: options.priority,
            retry: options.retry_policy(self.registry.retry_policy()),
        };

        debug!(
            job_type,
            queue = %queue,
            delay_ms = options.delay_ms,
            priority = options.priority,
            max_attempts = new_job.retry.max_attempts,
            "Dispatching job"
        );

        let job_id = self.backend.enqueue(new_job).await?;
        let durable = self.backend.is_durable();

        info!(
            job_id = %job_id,
            job_type,
            queue = %queue,
            backend = %self.backend.kind(),
            "Job enqueued"
        );

        Ok(JobHandle {
            job_id,
            queue,
            job_type: job_type.to_string(),
            durable,
        })
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    pub fn backend(&self) -> &Arc<dyn QueueBackend> {
        &self.backend
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::catalog::*;
    use crate::domain::{ExportRunPayload, JobState};
    use crate::port::id_provider::SequentialIdProvider;
    use crate::port::queue_backend::mocks::MemoryQueueBackend;
    use crate::port::time_provider::mocks::ManualTimeProvider;
    use crate::port::NoopQueueBackend;
    use serde_json::json;

    fn memory_dispatcher() -> (Dispatcher, Arc<MemoryQueueBackend>) {
        let backend = Arc::new(MemoryQueueBackend::new(
            Arc::new(SequentialIdProvider::new("job")),
            Arc::new(ManualTimeProvider::new(1_000)),
        ));
        let dispatcher = Dispatcher::new(Arc::new(JobRegistry::standard()), backend.clone());
        (dispatcher, backend)
    }

    #[tokio::test]
    async fn test_enqueue_routes_to_registered_queue() {
        let (dispatcher, backend) = memory_dispatcher();

        let handle = dispatcher
            .enqueue(
                SCORING_RUN,
                json!({"tenantId": "t1", "assessmentId": "a1"}),
                EnqueueOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(handle.queue, QUEUE_SCORING);
        assert_eq!(handle.job_type, SCORING_RUN);
        assert!(handle.durable);

        let job = backend.find(&handle.job_id).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Waiting);
        assert_eq!(job.queue, QUEUE_SCORING);
        assert_eq!(job.max_attempts, 3);
        assert_eq!(job.backoff_base_ms, 1000);
        assert_eq!(backend.pending_count(QUEUE_SCORING).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unknown_job_type_rejected() {
        let (dispatcher, backend) = memory_dispatcher();

        let err = dispatcher
            .enqueue("video-transcode", json!({}), EnqueueOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::UnknownJobType(_)));
        assert!(backend.all_jobs().is_empty());
    }

    #[tokio::test]
    async fn test_payload_mismatch_is_validation_error() {
        let (dispatcher, _) = memory_dispatcher();

        let err = dispatcher
            .enqueue(EXPORT_RUN, json!({"tenantId": "t1"}), EnqueueOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_overrides_are_applied() {
        let (dispatcher, backend) = memory_dispatcher();

        let options = EnqueueOptions {
            delay_ms: 60_000,
            priority: 50,
            max_attempts: Some(5),
            backoff_base_ms: Some(250),
        };
        let handle = dispatcher
            .dispatch(
                JobPayload::ExportRun(ExportRunPayload {
                    tenant_id: "t1".to_string(),
                    job_id: "exp-9".to_string(),
                }),
                options,
            )
            .await
            .unwrap();

        let job = backend.find(&handle.job_id).await.unwrap().unwrap();
        assert_eq!(job.priority, 50);
        assert_eq!(job.delay_ms, 60_000);
        assert_eq!(job.visible_at, 61_000);
        assert_eq!(job.max_attempts, 5);
        assert_eq!(job.backoff_base_ms, 250);
    }

    #[tokio::test]
    async fn test_invalid_options_rejected() {
        let (dispatcher, backend) = memory_dispatcher();
        let payload = json!({"tenantId": "t1", "jobId": "e1"});

        for options in [
            EnqueueOptions::delayed(-1),
            EnqueueOptions {
                priority: 101,
                ..Default::default()
            },
            EnqueueOptions {
                max_attempts: Some(0),
                ..Default::default()
            },
            EnqueueOptions {
                backoff_base_ms: Some(-5),
                ..Default::default()
            },
        ] {
            let result = dispatcher.enqueue(EXPORT_RUN, payload.clone(), options).await;
            assert!(result.is_err());
        }
        assert!(backend.all_jobs().is_empty());
    }

    #[tokio::test]
    async fn test_noop_backend_returns_distinct_non_durable_handles() {
        let dispatcher = Dispatcher::new(
            Arc::new(JobRegistry::standard()),
            Arc::new(NoopQueueBackend::new()),
        );
        let payload = json!({"tenantId": "t1", "jobId": "e1"});

        let a = dispatcher
            .enqueue(EXPORT_RUN, payload.clone(), EnqueueOptions::default())
            .await
            .unwrap();
        let b = dispatcher
            .enqueue(EXPORT_RUN, payload, EnqueueOptions::default())
            .await
            .unwrap();

        assert_ne!(a.job_id, b.job_id);
        assert!(!a.durable);
        assert_eq!(
            dispatcher
                .backend()
                .pending_count(QUEUE_EXPORT)
                .await
                .unwrap(),
            0
        );
    }
}
