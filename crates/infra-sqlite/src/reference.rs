// Reference domain services
// Bookkeeping-only adapters for local runs and tests: they record that a job
// ran, they do not deliver notifications or compute scores

use async_trait::async_trait;
use conductor_core::domain::{AdHocNotification, NotificationChannel, TemplateNotification};
use conductor_core::port::{
    Actor, ExportJob, ExportService, IdProvider, NotificationService, PrecomputeForTenantInput,
    PrecomputeForUserInput, RecommendationService, ScoreAssessmentInput, ScoringService,
    SendResult, ServiceError, ServiceResult, TimeProvider,
};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::debug;

use crate::records::storage_error;

const STATUS_PENDING: &str = "PENDING";
const STATUS_COMPLETED: &str = "COMPLETED";
/// Notification stored, never handed to a delivery channel
pub const STATUS_RECORDED: &str = "RECORDED";

fn channel_name(channel: NotificationChannel) -> &'static str {
    match channel {
        NotificationChannel::Email => "EMAIL",
        NotificationChannel::Sms => "SMS",
        NotificationChannel::Push => "PUSH",
        NotificationChannel::InApp => "IN_APP",
    }
}

/// Export, notification, scoring and recommendation services that only write
/// bookkeeping rows
pub struct ReferenceServices {
    pool: SqlitePool,
    id_provider: Arc<dyn IdProvider>,
    time_provider: Arc<dyn TimeProvider>,
}

impl ReferenceServices {
    pub fn new(
        pool: SqlitePool,
        id_provider: Arc<dyn IdProvider>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            pool,
            id_provider,
            time_provider,
        }
    }

    /// Register an export request; `export-run` later executes it
    pub async fn create_export_job(&self, tenant_id: &str) -> ServiceResult<String> {
        let id = self.id_provider.generate_id();
        sqlx::query(
            "INSERT INTO export_jobs (id, tenant_id, status, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(tenant_id)
        .bind(STATUS_PENDING)
        .bind(self.time_provider.now_millis())
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;
        Ok(id)
    }

    async fn insert_notifications(
        &self,
        tenant_id: &str,
        channel: NotificationChannel,
        template_id: Option<&str>,
        recipients: &[String],
        payload: Option<String>,
    ) -> ServiceResult<SendResult> {
        let now = self.time_provider.now_millis();
        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        for recipient in recipients {
            sqlx::query(
                r#"
                INSERT INTO notifications
                    (id, tenant_id, channel, template_id, recipient, status, payload, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(self.id_provider.generate_id())
            .bind(tenant_id)
            .bind(channel_name(channel))
            .bind(template_id)
            .bind(recipient)
            .bind(STATUS_RECORDED)
            .bind(&payload)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?;
        }

        tx.commit().await.map_err(storage_error)?;

        debug!(tenant_id, recorded = recipients.len(), "Notifications recorded, not delivered");
        Ok(SendResult {
            delivered: 0,
            failed: 0,
            channel: Some(channel),
        })
    }
}

#[async_trait]
impl ExportService for ReferenceServices {
    async fn run_export_job(
        &self,
        tenant_id: &str,
        export_job_id: &str,
        actor: &Actor,
    ) -> ServiceResult<ExportJob> {
        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM export_jobs WHERE id = ? AND tenant_id = ?")
                .bind(export_job_id)
                .bind(tenant_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(storage_error)?;

        let status = status.ok_or_else(|| {
            ServiceError::NotFound(format!("export job {} of tenant {}", export_job_id, tenant_id))
        })?;

        // Redelivery of an already finished export is a no-op
        if status != STATUS_COMPLETED {
            let row_count: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM assessment_scores WHERE tenant_id = ?")
                    .bind(tenant_id)
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(storage_error)?;

            sqlx::query(
                "UPDATE export_jobs SET status = ?, finished_at = ?, row_count = ? WHERE id = ?",
            )
            .bind(STATUS_COMPLETED)
            .bind(self.time_provider.now_millis())
            .bind(row_count)
            .bind(export_job_id)
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?;
        }

        let row_count: Option<i64> =
            sqlx::query_scalar("SELECT row_count FROM export_jobs WHERE id = ?")
                .bind(export_job_id)
                .fetch_one(&mut *tx)
                .await
                .map_err(storage_error)?;

        tx.commit().await.map_err(storage_error)?;

        debug!(export_job_id, actor = %actor.id, "Export job run");
        Ok(ExportJob {
            id: export_job_id.to_string(),
            tenant_id: tenant_id.to_string(),
            status: STATUS_COMPLETED.to_string(),
            row_count: row_count.map(|n| n as u64),
        })
    }
}

#[async_trait]
impl NotificationService for ReferenceServices {
    async fn send_by_template(
        &self,
        input: TemplateNotification,
        _actor: &Actor,
    ) -> ServiceResult<SendResult> {
        let recipients = input.user_ids.clone().unwrap_or_default();
        if recipients.is_empty() {
            return Err(ServiceError::Rejected(
                "template notification resolved to no recipients".to_string(),
            ));
        }

        let payload = input
            .variables
            .as_ref()
            .map(|v| serde_json::Value::Object(v.clone()).to_string());

        self.insert_notifications(
            &input.tenant_id,
            NotificationChannel::InApp,
            Some(&input.template_id),
            &recipients,
            payload,
        )
        .await
    }

    async fn send_ad_hoc(
        &self,
        input: AdHocNotification,
        _actor: &Actor,
    ) -> ServiceResult<SendResult> {
        self.insert_notifications(
            &input.tenant_id,
            input.channel,
            None,
            &input.user_ids,
            Some(input.payload.to_string()),
        )
        .await
    }
}

#[async_trait]
impl ScoringService for ReferenceServices {
    async fn score_assessment(
        &self,
        input: ScoreAssessmentInput,
        _actor: &Actor,
    ) -> ServiceResult<()> {
        sqlx::query(
            r#"
            INSERT INTO assessment_scores (tenant_id, assessment_id, options, scored_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (tenant_id, assessment_id)
            DO UPDATE SET options = excluded.options, scored_at = excluded.scored_at
            "#,
        )
        .bind(&input.tenant_id)
        .bind(&input.assessment_id)
        .bind(input.options.to_string())
        .bind(self.time_provider.now_millis())
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;
        Ok(())
    }
}

#[async_trait]
impl RecommendationService for ReferenceServices {
    async fn precompute_for_user(
        &self,
        input: PrecomputeForUserInput,
        _actor: &Actor,
    ) -> ServiceResult<()> {
        sqlx::query(
            "INSERT INTO recommendation_runs (tenant_id, user_id, options, computed_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&input.tenant_id)
        .bind(&input.user_id)
        .bind(input.options.to_string())
        .bind(self.time_provider.now_millis())
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;
        Ok(())
    }

    async fn precompute_for_tenant(
        &self,
        input: PrecomputeForTenantInput,
        _actor: &Actor,
    ) -> ServiceResult<()> {
        sqlx::query(
            "INSERT INTO recommendation_runs (tenant_id, user_id, options, computed_at) VALUES (?, NULL, ?, ?)",
        )
        .bind(&input.tenant_id)
        .bind(input.options.to_string())
        .bind(self.time_provider.now_millis())
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::test_support::temp_pool;
    use conductor_core::port::id_provider::SequentialIdProvider;
    use conductor_core::port::time_provider::mocks::ManualTimeProvider;
    use conductor_core::port::SYSTEM_ACTOR;
    use serde_json::json;

    async fn services() -> ReferenceServices {
        ReferenceServices::new(
            temp_pool().await,
            Arc::new(SequentialIdProvider::new("rec")),
            Arc::new(ManualTimeProvider::new(1_000_000)),
        )
    }

    #[tokio::test]
    async fn test_export_run_is_idempotent() {
        let store = services().await;
        let id = store.create_export_job("t1").await.unwrap();

        let first = store.run_export_job("t1", &id, &SYSTEM_ACTOR).await.unwrap();
        let second = store.run_export_job("t1", &id, &SYSTEM_ACTOR).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.status, STATUS_COMPLETED);

        let err = store
            .run_export_job("t2", &id, &SYSTEM_ACTOR)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_notifications_one_row_per_recipient() {
        let store = services().await;
        let sent = store
            .send_ad_hoc(
                AdHocNotification {
                    tenant_id: "t1".to_string(),
                    channel: NotificationChannel::Email,
                    user_ids: vec!["u1".to_string(), "u2".to_string()],
                    payload: json!({"subject": "hi"}),
                },
                &SYSTEM_ACTOR,
            )
            .await
            .unwrap();
        // Recorded per recipient, nothing delivered
        assert_eq!(sent.delivered, 0);
        let recorded: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM notifications WHERE status = ?")
                .bind(STATUS_RECORDED)
                .fetch_one(&store.pool)
                .await
                .unwrap();
        assert_eq!(recorded, 2);

        let err = store
            .send_by_template(
                TemplateNotification {
                    tenant_id: "t1".to_string(),
                    template_id: "welcome".to_string(),
                    user_ids: None,
                    audience_json: None,
                    variables: None,
                },
                &SYSTEM_ACTOR,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Rejected(_)));
    }

    #[tokio::test]
    async fn test_scoring_upserts() {
        let store = services().await;
        for _ in 0..2 {
            store
                .score_assessment(
                    ScoreAssessmentInput {
                        tenant_id: "t1".to_string(),
                        assessment_id: "a1".to_string(),
                        options: json!({}),
                    },
                    &SYSTEM_ACTOR,
                )
                .await
                .unwrap();
        }
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM assessment_scores")
            .fetch_one(&store.pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }
}
