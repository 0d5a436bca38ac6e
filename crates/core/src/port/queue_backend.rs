// Queue Backend Port (Interface)

use crate::domain::{Job, JobId, NewJob};
use crate::error::{AppError, Result};
use crate::port::maintenance::{PruneStats, RetentionPolicy};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::debug;

/// Which adapter is behind the port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Durable SQL store shared between processes
    Sqlite,
    /// In-process store, executes jobs but loses them on exit
    Memory,
    /// Accepts work and drops it
    Noop,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Sqlite => write!(f, "sqlite"),
            BackendKind::Memory => write!(f, "memory"),
            BackendKind::Noop => write!(f, "noop"),
        }
    }
}

/// What the backend did with a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Back to Waiting, visible again after `delay_ms`
    Retried { attempt: i32, delay_ms: i64 },
    /// Terminal, kept for inspection
    Failed { attempt: i32 },
}

/// Per-queue job counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    /// Waiting and already visible
    pub waiting: u64,
    /// Waiting but scheduled in the future
    pub delayed: u64,
    pub active: u64,
    pub completed: u64,
    pub failed: u64,
}

impl QueueStats {
    pub fn pending(&self) -> u64 {
        self.waiting + self.delayed
    }
}

/// Backend interface for named queues
///
/// Implementations serialize their own concurrent access; the orchestration
/// layer shares one instance between every worker of every queue.
#[async_trait]
pub trait QueueBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Whether enqueued jobs are ever executed
    fn is_durable(&self) -> bool {
        self.kind() != BackendKind::Noop
    }

    /// Store a new Waiting job, returns the backend-assigned id
    async fn enqueue(&self, job: NewJob) -> Result<JobId>;

    /// Atomically claim the next visible job of a queue (Waiting -> Active)
    async fn dequeue(&self, queue: &str) -> Result<Option<Job>>;

    /// Acknowledge success (Active -> Completed)
    ///
    /// Guarded on the attempt that claimed the job, like `fail`: a late ack
    /// from a reclaimed attempt is rejected.
    async fn complete(&self, job: &Job, result: Option<serde_json::Value>) -> Result<()>;

    /// Report a failed attempt; the backend applies the job's retry policy
    async fn fail(&self, job: &Job, error: &str, retryable: bool) -> Result<FailureOutcome>;

    /// Suspend an idle consumer until work may be available
    async fn wait_for_jobs(&self, _queue: &str, max_wait: Duration) {
        tokio::time::sleep(max_wait).await;
    }

    async fn find(&self, job_id: &JobId) -> Result<Option<Job>>;

    /// Waiting jobs (visible or delayed)
    async fn pending_count(&self, queue: &str) -> Result<u64> {
        Ok(self.queue_stats(queue).await?.pending())
    }

    async fn queue_stats(&self, queue: &str) -> Result<QueueStats>;

    /// Put Active jobs claimed before `started_before` back to Waiting
    async fn requeue_stale_active(&self, started_before: i64) -> Result<u64>;

    /// Drop finished jobs outside the retention policy
    async fn prune(&self, policy: &RetentionPolicy) -> Result<PruneStats>;
}

/// Local wake-ups for idle consumers, one `Notify` per queue
#[derive(Default)]
pub struct QueueSignals {
    signals: Mutex<HashMap<String, Arc<Notify>>>,
}

impl QueueSignals {
    pub fn new() -> Self {
        Self::default()
    }

    fn signal(&self, queue: &str) -> Arc<Notify> {
        let mut signals = self
            .signals
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        signals
            .entry(queue.to_string())
            .or_insert_with(|| Arc::new(Notify::new()))
            .clone()
    }

    /// Wake one idle consumer of `queue`
    pub fn notify(&self, queue: &str) {
        self.signal(queue).notify_one();
    }

    /// Wait for a wake-up or the timeout, whichever comes first
    pub async fn wait(&self, queue: &str, timeout: Duration) {
        let signal = self.signal(queue);
        let _ = tokio::time::timeout(timeout, signal.notified()).await;
    }
}

/// Backend used when no durable store is configured
///
/// Every enqueue is accepted and forgotten. Nothing is ever dequeued.
#[derive(Default)]
pub struct NoopQueueBackend;

impl NoopQueueBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl QueueBackend for NoopQueueBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Noop
    }

    async fn enqueue(&self, job: NewJob) -> Result<JobId> {
        let id = format!("noop-{}", uuid::Uuid::new_v4());
        debug!(
            job_id = %id,
            queue = %job.queue,
            job_type = job.job_type(),
            "Queues disabled, job accepted without execution"
        );
        Ok(id)
    }

    async fn dequeue(&self, _queue: &str) -> Result<Option<Job>> {
        Ok(None)
    }

    async fn complete(&self, job: &Job, _result: Option<serde_json::Value>) -> Result<()> {
        Err(AppError::NotFound(format!("Job {} not found", job.id)))
    }

    async fn fail(&self, job: &Job, _error: &str, _retryable: bool) -> Result<FailureOutcome> {
        Err(AppError::NotFound(format!("Job {} not found", job.id)))
    }

    async fn find(&self, _job_id: &JobId) -> Result<Option<Job>> {
        Ok(None)
    }

    async fn pending_count(&self, _queue: &str) -> Result<u64> {
        Ok(0)
    }

    async fn queue_stats(&self, _queue: &str) -> Result<QueueStats> {
        Ok(QueueStats::default())
    }

    async fn requeue_stale_active(&self, _started_before: i64) -> Result<u64> {
        Ok(0)
    }

    async fn prune(&self, _policy: &RetentionPolicy) -> Result<PruneStats> {
        Ok(PruneStats::default())
    }
}

// ============================================================================
// In-memory implementation (tests only)
// ============================================================================

#[cfg(any(test, feature = "test-util"))]
pub mod mocks {
    use super::*;
    use crate::application::retry::{evaluate, RetryDecision};
    use crate::domain::JobState;
    use crate::port::{IdProvider, TimeProvider};

    /// In-process queue store with the same semantics as the durable backend
    pub struct MemoryQueueBackend {
        jobs: Mutex<Vec<Job>>,
        signals: QueueSignals,
        id_provider: Arc<dyn IdProvider>,
        time_provider: Arc<dyn TimeProvider>,
    }

    impl MemoryQueueBackend {
        pub fn new(id_provider: Arc<dyn IdProvider>, time_provider: Arc<dyn TimeProvider>) -> Self {
            Self {
                jobs: Mutex::new(Vec::new()),
                signals: QueueSignals::new(),
                id_provider,
                time_provider,
            }
        }

        fn jobs(&self) -> std::sync::MutexGuard<'_, Vec<Job>> {
            self.jobs
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
        }

        /// Snapshot of every stored job (insertion order)
        pub fn all_jobs(&self) -> Vec<Job> {
            self.jobs().clone()
        }
    }

    #[async_trait]
    impl QueueBackend for MemoryQueueBackend {
        fn kind(&self) -> BackendKind {
            BackendKind::Memory
        }

        async fn enqueue(&self, job: NewJob) -> Result<JobId> {
            let id = self.id_provider.generate_id();
            let queue = job.queue.clone();
            let job = Job::from_new(id.clone(), self.time_provider.now_millis(), job);
            self.jobs().push(job);
            self.signals.notify(&queue);
            Ok(id)
        }

        async fn dequeue(&self, queue: &str) -> Result<Option<Job>> {
            let now = self.time_provider.now_millis();
            let mut jobs = self.jobs();

            let next = jobs
                .iter()
                .enumerate()
                .filter(|(_, j)| {
                    j.queue == queue && j.state == JobState::Waiting && j.visible_at <= now
                })
                .min_by_key(|(_, j)| (-j.priority, j.visible_at, j.enqueued_at))
                .map(|(idx, _)| idx);

            match next {
                Some(idx) => {
                    let job = &mut jobs[idx];
                    job.start(now)?;
                    Ok(Some(job.clone()))
                }
                None => Ok(None),
            }
        }

        async fn complete(&self, job: &Job, result: Option<serde_json::Value>) -> Result<()> {
            let now = self.time_provider.now_millis();
            let mut jobs = self.jobs();
            let stored = jobs
                .iter_mut()
                .find(|j| j.id == job.id)
                .ok_or_else(|| AppError::NotFound(format!("Job {} not found", job.id)))?;
            if stored.state == JobState::Active && stored.attempts != job.attempts {
                return Err(AppError::InvalidState(format!(
                    "Job {} was reclaimed (attempt {} acked, attempt {} running)",
                    job.id, job.attempts, stored.attempts
                )));
            }
            stored.complete(now, result)?;
            Ok(())
        }

        async fn fail(&self, job: &Job, error: &str, retryable: bool) -> Result<FailureOutcome> {
            let now = self.time_provider.now_millis();
            let mut jobs = self.jobs();
            let stored = jobs
                .iter_mut()
                .find(|j| j.id == job.id)
                .ok_or_else(|| AppError::NotFound(format!("Job {} not found", job.id)))?;

            let outcome = match evaluate(stored, retryable) {
                RetryDecision::Retry(delay_ms) => {
                    stored.schedule_retry(now, delay_ms, error)?;
                    FailureOutcome::Retried {
                        attempt: stored.attempts,
                        delay_ms,
                    }
                }
                RetryDecision::Failed => {
                    stored.fail(now, error)?;
                    FailureOutcome::Failed {
                        attempt: stored.attempts,
                    }
                }
            };
            if matches!(outcome, FailureOutcome::Retried { .. }) {
                self.signals.notify(&stored.queue);
            }
            Ok(outcome)
        }

        async fn wait_for_jobs(&self, queue: &str, max_wait: Duration) {
            let now = self.time_provider.now_millis();
            let next_visible = self
                .jobs()
                .iter()
                .filter(|j| j.queue == queue && j.state == JobState::Waiting)
                .map(|j| j.visible_at)
                .min();

            let wait = match next_visible {
                Some(at) if at <= now => return,
                Some(at) => max_wait.min(Duration::from_millis((at - now) as u64)),
                None => max_wait,
            };
            self.signals.wait(queue, wait).await;
        }

        async fn find(&self, job_id: &JobId) -> Result<Option<Job>> {
            Ok(self.jobs().iter().find(|j| &j.id == job_id).cloned())
        }

        async fn queue_stats(&self, queue: &str) -> Result<QueueStats> {
            let now = self.time_provider.now_millis();
            let mut stats = QueueStats::default();
            for job in self.jobs().iter().filter(|j| j.queue == queue) {
                match job.state {
                    JobState::Waiting if job.visible_at > now => stats.delayed += 1,
                    JobState::Waiting => stats.waiting += 1,
                    JobState::Active => stats.active += 1,
                    JobState::Completed => stats.completed += 1,
                    JobState::Failed => stats.failed += 1,
                }
            }
            Ok(stats)
        }

        async fn requeue_stale_active(&self, started_before: i64) -> Result<u64> {
            let now = self.time_provider.now_millis();
            let mut count = 0;
            for job in self.jobs().iter_mut() {
                if job.state == JobState::Active
                    && job.started_at.map_or(true, |at| at < started_before)
                {
                    job.release(now)?;
                    count += 1;
                }
            }
            Ok(count)
        }

        async fn prune(&self, policy: &RetentionPolicy) -> Result<PruneStats> {
            let now = self.time_provider.now_millis();
            let mut jobs = self.jobs();
            let before_completed = jobs
                .iter()
                .filter(|j| j.state == JobState::Completed)
                .count();
            let before_failed = jobs.iter().filter(|j| j.state == JobState::Failed).count();

            prune_state(
                &mut jobs,
                JobState::Completed,
                now - policy.completed_max_age_ms,
                policy.completed_max_count,
            );
            prune_state(
                &mut jobs,
                JobState::Failed,
                now - policy.failed_max_age_ms,
                policy.failed_max_count,
            );

            let after_completed = jobs
                .iter()
                .filter(|j| j.state == JobState::Completed)
                .count();
            let after_failed = jobs.iter().filter(|j| j.state == JobState::Failed).count();

            Ok(PruneStats {
                completed_removed: (before_completed - after_completed) as u64,
                failed_removed: (before_failed - after_failed) as u64,
            })
        }
    }

    /// Keep the newest `max_count` jobs per queue in `state` finished after `cutoff`
    fn prune_state(jobs: &mut Vec<Job>, state: JobState, cutoff: i64, max_count: i64) {
        let mut finished: Vec<(String, i64, String)> = jobs
            .iter()
            .filter(|j| j.state == state)
            .map(|j| (j.queue.clone(), j.finished_at.unwrap_or(0), j.id.clone()))
            .collect();
        // newest first within each queue
        finished.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)));

        let mut kept_per_queue: HashMap<String, i64> = HashMap::new();
        let mut doomed = std::collections::HashSet::new();
        for (queue, finished_at, id) in finished {
            let kept = kept_per_queue.entry(queue).or_insert(0);
            if finished_at < cutoff || *kept >= max_count {
                doomed.insert(id);
            } else {
                *kept += 1;
            }
        }
        jobs.retain(|j| !doomed.contains(&j.id));
    }
}
