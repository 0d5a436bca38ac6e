// SQLite QueueBackend Implementation (durable adapter)

use crate::error::map_sqlx_error;
use async_trait::async_trait;
use conductor_core::application::retry::{evaluate, RetryDecision};
use conductor_core::domain::{Job, JobId, JobPayload, JobState, NewJob};
use conductor_core::error::{AppError, Result};
use conductor_core::port::{
    BackendKind, FailureOutcome, IdProvider, PruneStats, QueueBackend, QueueSignals, QueueStats,
    RetentionPolicy, TimeProvider,
};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const WAITING: &str = "WAITING";
const ACTIVE: &str = "ACTIVE";
const COMPLETED: &str = "COMPLETED";
const FAILED: &str = "FAILED";

/// Durable queue store shared by every process pointing at the same file
pub struct SqliteQueueBackend {
    pool: SqlitePool,
    id_provider: Arc<dyn IdProvider>,
    time_provider: Arc<dyn TimeProvider>,
    signals: QueueSignals,
}

impl SqliteQueueBackend {
    pub fn new(
        pool: SqlitePool,
        id_provider: Arc<dyn IdProvider>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            pool,
            id_provider,
            time_provider,
            signals: QueueSignals::new(),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Tell apart "no such job" from "job is not Active" after a 0-row update
    async fn transition_error(&self, job_id: &JobId, target: JobState) -> AppError {
        let current: std::result::Result<Option<String>, sqlx::Error> =
            sqlx::query_scalar("SELECT state FROM jobs WHERE id = ?")
                .bind(job_id)
                .fetch_optional(&self.pool)
                .await;

        match current {
            Ok(None) => AppError::NotFound(format!("Job {} not found", job_id)),
            Ok(Some(state)) => AppError::InvalidState(format!(
                "Cannot move job {} from {} to {}",
                job_id, state, target
            )),
            Err(e) => map_sqlx_error(e),
        }
    }

    async fn prune_state(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        state: &str,
        cutoff: i64,
        max_count: i64,
    ) -> Result<u64> {
        // Older than cutoff, or beyond the newest `max_count` of its queue
        let result = sqlx::query(
            r#"
            DELETE FROM jobs
            WHERE state = ?
              AND (
                  COALESCE(finished_at, 0) < ?
                  OR id IN (
                      SELECT id FROM (
                          SELECT id, ROW_NUMBER() OVER (
                              PARTITION BY queue
                              ORDER BY COALESCE(finished_at, 0) DESC, id DESC
                          ) AS rn
                          FROM jobs
                          WHERE state = ?
                      )
                      WHERE rn > ?
                  )
              )
            "#,
        )
        .bind(state)
        .bind(cutoff)
        .bind(state)
        .bind(max_count)
        .execute(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl QueueBackend for SqliteQueueBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Sqlite
    }

    async fn enqueue(&self, new_job: NewJob) -> Result<JobId> {
        let id = self.id_provider.generate_id();
        let job = Job::from_new(id.clone(), self.time_provider.now_millis(), new_job);
        let payload = serde_json::to_string(&job.payload)?;

        sqlx::query(
            r#"
            INSERT INTO jobs (
                id, queue, job_type, payload, priority, state,
                enqueued_at, delay_ms, visible_at,
                attempts, max_attempts, backoff_base_ms
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&job.id)
        .bind(&job.queue)
        .bind(&job.job_type)
        .bind(&payload)
        .bind(job.priority)
        .bind(job.state.to_string())
        .bind(job.enqueued_at)
        .bind(job.delay_ms)
        .bind(job.visible_at)
        .bind(job.attempts)
        .bind(job.max_attempts)
        .bind(job.backoff_base_ms)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        self.signals.notify(&job.queue);
        Ok(id)
    }

    async fn dequeue(&self, queue: &str) -> Result<Option<Job>> {
        let now = self.time_provider.now_millis();

        // Single statement: select + claim is atomic across connections and processes
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            UPDATE jobs
            SET state = ?, started_at = ?, attempts = attempts + 1
            WHERE state = ? AND id = (
                SELECT id FROM jobs
                WHERE queue = ? AND state = ? AND visible_at <= ?
                ORDER BY priority DESC, visible_at ASC, enqueued_at ASC, id ASC
                LIMIT 1
            )
            RETURNING *
            "#,
        )
        .bind(ACTIVE)
        .bind(now)
        .bind(WAITING)
        .bind(queue)
        .bind(WAITING)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.map(JobRow::into_job).transpose()
    }

    async fn complete(&self, job: &Job, result: Option<serde_json::Value>) -> Result<()> {
        let now = self.time_provider.now_millis();
        let result = result.map(|v| v.to_string());

        let updated = sqlx::query(
            r#"
            UPDATE jobs
            SET state = ?, finished_at = ?, result = ?
            WHERE id = ? AND state = ? AND attempts = ?
            "#,
        )
        .bind(COMPLETED)
        .bind(now)
        .bind(&result)
        .bind(&job.id)
        .bind(ACTIVE)
        .bind(job.attempts)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        if updated.rows_affected() == 0 {
            return Err(self.transition_error(&job.id, JobState::Completed).await);
        }
        Ok(())
    }

    async fn fail(&self, job: &Job, error: &str, retryable: bool) -> Result<FailureOutcome> {
        let now = self.time_provider.now_millis();

        // Guarded on (state, attempts): only the attempt that claimed the job may report it
        let (outcome, updated) = match evaluate(job, retryable) {
            RetryDecision::Retry(delay_ms) => {
                let updated = sqlx::query(
                    r#"
                    UPDATE jobs
                    SET state = ?, visible_at = ?, started_at = NULL, last_error = ?
                    WHERE id = ? AND state = ? AND attempts = ?
                    "#,
                )
                .bind(WAITING)
                .bind(now + delay_ms)
                .bind(error)
                .bind(&job.id)
                .bind(ACTIVE)
                .bind(job.attempts)
                .execute(&self.pool)
                .await
                .map_err(map_sqlx_error)?;
                (
                    FailureOutcome::Retried {
                        attempt: job.attempts,
                        delay_ms,
                    },
                    updated.rows_affected(),
                )
            }
            RetryDecision::Failed => {
                let updated = sqlx::query(
                    r#"
                    UPDATE jobs
                    SET state = ?, finished_at = ?, last_error = ?
                    WHERE id = ? AND state = ? AND attempts = ?
                    "#,
                )
                .bind(FAILED)
                .bind(now)
                .bind(error)
                .bind(&job.id)
                .bind(ACTIVE)
                .bind(job.attempts)
                .execute(&self.pool)
                .await
                .map_err(map_sqlx_error)?;
                (
                    FailureOutcome::Failed {
                        attempt: job.attempts,
                    },
                    updated.rows_affected(),
                )
            }
        };

        if updated == 0 {
            return Err(self.transition_error(&job.id, JobState::Failed).await);
        }
        if matches!(outcome, FailureOutcome::Retried { .. }) {
            self.signals.notify(&job.queue);
        }
        Ok(outcome)
    }

    async fn wait_for_jobs(&self, queue: &str, max_wait: Duration) {
        let next_visible: std::result::Result<Option<i64>, sqlx::Error> = sqlx::query_scalar(
            "SELECT MIN(visible_at) FROM jobs WHERE queue = ? AND state = ?",
        )
        .bind(queue)
        .bind(WAITING)
        .fetch_one(&self.pool)
        .await;

        let now = self.time_provider.now_millis();
        let wait = match next_visible {
            Ok(Some(at)) if at <= now => return,
            Ok(Some(at)) => max_wait.min(Duration::from_millis((at - now) as u64)),
            Ok(None) => max_wait,
            Err(e) => {
                debug!(queue = %queue, error = %e, "Next visible lookup failed");
                max_wait
            }
        };
        self.signals.wait(queue, wait).await;
    }

    async fn find(&self, job_id: &JobId) -> Result<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>("SELECT * FROM jobs WHERE id = ?")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.map(JobRow::into_job).transpose()
    }

    async fn pending_count(&self, queue: &str) -> Result<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM jobs WHERE queue = ? AND state = ?")
                .bind(queue)
                .bind(WAITING)
                .fetch_one(&self.pool)
                .await
                .map_err(map_sqlx_error)?;

        Ok(count as u64)
    }

    async fn queue_stats(&self, queue: &str) -> Result<QueueStats> {
        let now = self.time_provider.now_millis();
        let rows: Vec<(String, i64, i64)> = sqlx::query_as(
            r#"
            SELECT state, visible_at > ? AS delayed, COUNT(*)
            FROM jobs
            WHERE queue = ?
            GROUP BY state, delayed
            "#,
        )
        .bind(now)
        .bind(queue)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let mut stats = QueueStats::default();
        for (state, delayed, count) in rows {
            let count = count as u64;
            match state.parse::<JobState>()? {
                JobState::Waiting if delayed != 0 => stats.delayed += count,
                JobState::Waiting => stats.waiting += count,
                JobState::Active => stats.active += count,
                JobState::Completed => stats.completed += count,
                JobState::Failed => stats.failed += count,
            }
        }
        Ok(stats)
    }

    async fn requeue_stale_active(&self, started_before: i64) -> Result<u64> {
        let now = self.time_provider.now_millis();
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET state = ?, visible_at = ?, started_at = NULL
            WHERE state = ? AND (started_at IS NULL OR started_at < ?)
            "#,
        )
        .bind(WAITING)
        .bind(now)
        .bind(ACTIVE)
        .bind(started_before)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let count = result.rows_affected();
        if count > 0 {
            warn!(requeued = count, "Requeued jobs left Active by a previous process");
        }
        Ok(count)
    }

    async fn prune(&self, policy: &RetentionPolicy) -> Result<PruneStats> {
        let now = self.time_provider.now_millis();
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let completed_removed = self
            .prune_state(
                &mut tx,
                COMPLETED,
                now - policy.completed_max_age_ms,
                policy.completed_max_count,
            )
            .await?;
        let failed_removed = self
            .prune_state(
                &mut tx,
                FAILED,
                now - policy.failed_max_age_ms,
                policy.failed_max_count,
            )
            .await?;

        tx.commit().await.map_err(map_sqlx_error)?;

        Ok(PruneStats {
            completed_removed,
            failed_removed,
        })
    }
}

/// SQLite row representation
#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    id: String,
    queue: String,
    job_type: String,
    payload: String,
    priority: i32,
    state: String,
    enqueued_at: i64,
    delay_ms: i64,
    visible_at: i64,
    started_at: Option<i64>,
    finished_at: Option<i64>,
    attempts: i32,
    max_attempts: i32,
    backoff_base_ms: i64,
    last_error: Option<String>,
    result: Option<String>,
}

impl JobRow {
    fn into_job(self) -> Result<Job> {
        let payload: JobPayload = serde_json::from_str(&self.payload)?;
        let result = self
            .result
            .as_deref()
            .map(|raw| serde_json::from_str(raw))
            .transpose()?;

        Ok(Job {
            id: self.id,
            queue: self.queue,
            job_type: self.job_type,
            payload,
            priority: self.priority,
            state: self.state.parse()?,
            enqueued_at: self.enqueued_at,
            delay_ms: self.delay_ms,
            visible_at: self.visible_at,
            started_at: self.started_at,
            finished_at: self.finished_at,
            attempts: self.attempts,
            max_attempts: self.max_attempts,
            backoff_base_ms: self.backoff_base_ms,
            last_error: self.last_error,
            result,
        })
    }
}
