use super::{HandlerError, HandlerResult, JobHandler};
use crate::domain::catalog::MAINTENANCE_CLEANUP;
use crate::domain::JobPayload;
use crate::port::{RecordRetention, TimeProvider, SYSTEM_ACTOR};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// `maintenance-cleanup`: purge failed notifications and exports past retention
pub struct MaintenanceCleanupHandler {
    retention: Arc<dyn RecordRetention>,
    time_provider: Arc<dyn TimeProvider>,
}

impl MaintenanceCleanupHandler {
    pub fn new(retention: Arc<dyn RecordRetention>, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            retention,
            time_provider,
        }
    }
}

#[async_trait]
impl JobHandler for MaintenanceCleanupHandler {
    fn job_type(&self) -> &'static str {
        MAINTENANCE_CLEANUP
    }

    async fn handle(&self, payload: &JobPayload) -> HandlerResult<serde_json::Value> {
        let JobPayload::MaintenanceCleanup(p) = payload else {
            return Err(HandlerError::wrong_variant(MAINTENANCE_CLEANUP, payload));
        };

        let days = p.params.retention_days();
        if days < 0 {
            return Err(HandlerError::InvalidPayload(format!(
                "cleanupBeforeDays must not be negative (got {})",
                days
            )));
        }
        let cutoff = self.time_provider.now_millis() - days.saturating_mul(MILLIS_PER_DAY);

        let purged = self
            .retention
            .purge_failed_records(&p.tenant_id, cutoff, &SYSTEM_ACTOR)
            .await?;

        info!(
            tenant_id = %p.tenant_id,
            cutoff,
            notifications = purged.notifications,
            export_jobs = purged.export_jobs,
            "Failed records purged"
        );

        Ok(json!({
            "cutoff": cutoff,
            "notifications": purged.notifications,
            "exportJobs": purged.export_jobs,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CleanupParams, MaintenanceCleanupPayload};
    use crate::port::domain_services::MockRecordRetention;
    use crate::port::time_provider::mocks::ManualTimeProvider;
    use crate::port::PurgeCounts;

    const NOW: i64 = 200 * MILLIS_PER_DAY;

    fn payload(days: Option<i64>) -> JobPayload {
        JobPayload::MaintenanceCleanup(MaintenanceCleanupPayload {
            tenant_id: "t1".to_string(),
            params: CleanupParams {
                cleanup_before_days: days,
            },
        })
    }

    #[tokio::test]
    async fn test_default_cutoff_is_ninety_days() {
        let mut retention = MockRecordRetention::new();
        retention
            .expect_purge_failed_records()
            .withf(|tenant, cutoff, actor| {
                tenant == "t1" && *cutoff == NOW - 90 * MILLIS_PER_DAY && actor.is_system()
            })
            .times(1)
            .returning(|_, _, _| {
                Ok(PurgeCounts {
                    notifications: 4,
                    export_jobs: 2,
                })
            });

        let handler =
            MaintenanceCleanupHandler::new(Arc::new(retention), Arc::new(ManualTimeProvider::new(NOW)));
        let result = handler.handle(&payload(None)).await.unwrap();

        assert_eq!(result["notifications"], 4);
        assert_eq!(result["exportJobs"], 2);
    }

    #[tokio::test]
    async fn test_custom_window() {
        let mut retention = MockRecordRetention::new();
        retention
            .expect_purge_failed_records()
            .withf(|_, cutoff, _| *cutoff == NOW - 7 * MILLIS_PER_DAY)
            .times(1)
            .returning(|_, _, _| Ok(PurgeCounts::default()));

        let handler =
            MaintenanceCleanupHandler::new(Arc::new(retention), Arc::new(ManualTimeProvider::new(NOW)));
        handler.handle(&payload(Some(7))).await.unwrap();
    }

    #[tokio::test]
    async fn test_negative_window_rejected() {
        let mut retention = MockRecordRetention::new();
        retention.expect_purge_failed_records().never();

        let handler =
            MaintenanceCleanupHandler::new(Arc::new(retention), Arc::new(ManualTimeProvider::new(NOW)));
        let err = handler.handle(&payload(Some(-1))).await.unwrap_err();
        assert!(!err.is_retryable());
    }
}
