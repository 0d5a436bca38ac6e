// Job Domain Model

use crate::domain::error::{DomainError, Result};
use crate::domain::payload::JobPayload;
use crate::domain::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Job ID (opaque, assigned by the queue backend)
pub type JobId = String;

/// Priority (higher number = dequeued first)
pub type Priority = i32;

/// Job State
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Waiting,
    Active,
    Completed,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Waiting => write!(f, "WAITING"),
            JobState::Active => write!(f, "ACTIVE"),
            JobState::Completed => write!(f, "COMPLETED"),
            JobState::Failed => write!(f, "FAILED"),
        }
    }
}

impl FromStr for JobState {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "WAITING" => Ok(JobState::Waiting),
            "ACTIVE" => Ok(JobState::Active),
            "COMPLETED" => Ok(JobState::Completed),
            "FAILED" => Ok(JobState::Failed),
            other => Err(DomainError::ValidationError(format!(
                "unknown job state: {}",
                other
            ))),
        }
    }
}

/// A job as handed to the backend by the dispatcher (no id yet)
#[derive(Debug, Clone)]
pub struct NewJob {
    pub queue: String,
    pub payload: JobPayload,
    pub delay_ms: i64,
    pub priority: Priority,
    pub retry: RetryPolicy,
}

impl NewJob {
    pub fn job_type(&self) -> &'static str {
        self.payload.job_type()
    }
}

/// Job Entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub queue: String,
    pub job_type: String,
    pub payload: JobPayload,
    pub priority: Priority,
    pub state: JobState,

    pub enqueued_at: i64, // epoch ms
    pub delay_ms: i64,
    pub visible_at: i64, // epoch ms, job is not dequeued before this
    pub started_at: Option<i64>,
    pub finished_at: Option<i64>,

    // Retry bookkeeping (policy frozen at enqueue time)
    pub attempts: i32,
    pub max_attempts: i32,
    pub backoff_base_ms: i64,

    pub last_error: Option<String>,
    pub result: Option<serde_json::Value>,
}

impl Job {
    /// Materialize a waiting job from an enqueue request
    ///
    /// # Arguments
    ///
    /// * `id` - Backend-assigned job ID
    /// * `now_millis` - Enqueue timestamp in epoch ms (injected, not system time)
    /// * `new_job` - What the dispatcher asked for
    pub fn from_new(id: impl Into<String>, now_millis: i64, new_job: NewJob) -> Self {
        let delay_ms = new_job.delay_ms.max(0);
        Self {
            id: id.into(),
            queue: new_job.queue,
            job_type: new_job.payload.job_type().to_string(),
            payload: new_job.payload,
            priority: new_job.priority,
            state: JobState::Waiting,
            enqueued_at: now_millis,
            delay_ms,
            visible_at: now_millis + delay_ms,
            started_at: None,
            finished_at: None,
            attempts: 0,
            max_attempts: new_job.retry.max_attempts,
            backoff_base_ms: new_job.retry.base_delay_ms(),
            last_error: None,
            result: None,
        }
    }

    /// Effective retry policy for this job
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::exponential(self.max_attempts, self.backoff_base_ms)
    }

    fn transition_error(&self, to: JobState) -> DomainError {
        DomainError::InvalidStateTransition {
            from: self.state.to_string(),
            to: to.to_string(),
        }
    }

    /// Waiting -> Active (one more attempt)
    pub fn start(&mut self, now_millis: i64) -> Result<()> {
        if self.state != JobState::Waiting {
            return Err(self.transition_error(JobState::Active));
        }
        self.state = JobState::Active;
        self.attempts += 1;
        self.started_at = Some(now_millis);
        Ok(())
    }

    /// Active -> Completed
    pub fn complete(&mut self, now_millis: i64, result: Option<serde_json::Value>) -> Result<()> {
        if self.state != JobState::Active {
            return Err(self.transition_error(JobState::Completed));
        }
        self.state = JobState::Completed;
        self.finished_at = Some(now_millis);
        self.result = result;
        Ok(())
    }

    /// Active -> Waiting, visible again after `delay_ms`
    pub fn schedule_retry(
        &mut self,
        now_millis: i64,
        delay_ms: i64,
        error: impl Into<String>,
    ) -> Result<()> {
        if self.state != JobState::Active {
            return Err(self.transition_error(JobState::Waiting));
        }
        self.state = JobState::Waiting;
        self.visible_at = now_millis + delay_ms.max(0);
        self.started_at = None;
        self.last_error = Some(error.into());
        Ok(())
    }

    /// Active -> Failed (terminal)
    pub fn fail(&mut self, now_millis: i64, error: impl Into<String>) -> Result<()> {
        if self.state != JobState::Active {
            return Err(self.transition_error(JobState::Failed));
        }
        self.state = JobState::Failed;
        self.finished_at = Some(now_millis);
        self.last_error = Some(error.into());
        Ok(())
    }

    /// Active -> Waiting after the owning process died mid-flight
    pub fn release(&mut self, now_millis: i64) -> Result<()> {
        if self.state != JobState::Active {
            return Err(self.transition_error(JobState::Waiting));
        }
        self.state = JobState::Waiting;
        self.visible_at = now_millis;
        self.started_at = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::payload::ExportRunPayload;

    fn new_job(delay_ms: i64) -> NewJob {
        NewJob {
            queue: "export".to_string(),
            payload: JobPayload::ExportRun(ExportRunPayload {
                tenant_id: "t1".to_string(),
                job_id: "exp-1".to_string(),
            }),
            delay_ms,
            priority: 0,
            retry: RetryPolicy::exponential(3, 1000),
        }
    }

    #[test]
    fn test_from_new_sets_visibility() {
        let job = Job::from_new("job-1", 10_000, new_job(500));
        assert_eq!(job.state, JobState::Waiting);
        assert_eq!(job.job_type, "export-run");
        assert_eq!(job.visible_at, 10_500);
        assert_eq!(job.attempts, 0);
        assert_eq!(job.max_attempts, 3);
    }

    #[test]
    fn test_start_increments_attempts() {
        let mut job = Job::from_new("job-1", 0, new_job(0));
        job.start(5).unwrap();
        assert_eq!(job.state, JobState::Active);
        assert_eq!(job.attempts, 1);
        assert_eq!(job.started_at, Some(5));
    }

    #[test]
    fn test_cannot_complete_without_dequeue() {
        let mut job = Job::from_new("job-1", 0, new_job(0));
        assert!(job.complete(1, None).is_err());
        assert!(job.fail(1, "boom").is_err());
    }

    #[test]
    fn test_retry_cycle_then_complete() {
        let mut job = Job::from_new("job-1", 0, new_job(0));
        job.start(1).unwrap();
        job.schedule_retry(2, 1000, "boom").unwrap();
        assert_eq!(job.state, JobState::Waiting);
        assert_eq!(job.visible_at, 1002);
        assert_eq!(job.last_error.as_deref(), Some("boom"));

        job.start(1100).unwrap();
        job.complete(1200, Some(serde_json::json!({"ok": true})))
            .unwrap();
        assert_eq!(job.state, JobState::Completed);
        assert_eq!(job.attempts, 2);
        assert!(job.state.is_terminal());
    }

    #[test]
    fn test_state_round_trips_through_string() {
        for state in [
            JobState::Waiting,
            JobState::Active,
            JobState::Completed,
            JobState::Failed,
        ] {
            assert_eq!(state.to_string().parse::<JobState>().unwrap(), state);
        }
        assert!("RUNNING".parse::<JobState>().is_err());
    }
}
