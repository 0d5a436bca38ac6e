// Retry decision for a failed attempt
use crate::domain::Job;
use tracing::{info, warn};

/// Retry decision result
#[derive(Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry the job (with backoff delay in ms)
    Retry(i64),
    /// Do not retry, job has failed permanently
    Failed,
}

/// Decide what happens to a job whose current attempt just failed
///
/// `job.attempts` already counts the failed attempt. The job is retried
/// while `attempts < max_attempts` and the failure is retryable; the delay
/// before attempt `k + 1` is `base * 2^(k-1)`, capped by the policy.
///
/// Backends call this under their own lock or transaction so the decision
/// and the state change are applied together.
pub fn evaluate(job: &Job, retryable: bool) -> RetryDecision {
    if !retryable {
        warn!(
            job_id = %job.id,
            job_type = %job.job_type,
            attempt = job.attempts,
            "Non-retryable failure"
        );
        return RetryDecision::Failed;
    }

    if job.attempts >= job.max_attempts {
        warn!(
            job_id = %job.id,
            job_type = %job.job_type,
            attempts = job.attempts,
            max_attempts = job.max_attempts,
            "Max retry attempts reached"
        );
        return RetryDecision::Failed;
    }

    let delay_ms = job.retry_policy().delay_after(job.attempts);

    info!(
        job_id = %job.id,
        attempt = job.attempts,
        max_attempts = job.max_attempts,
        delay_ms,
        "Scheduling retry"
    );

    RetryDecision::Retry(delay_ms)
}
