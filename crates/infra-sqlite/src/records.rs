// SQLite record retention store
// Backs the maintenance-cleanup job: purges stale failed domain records

use async_trait::async_trait;
use conductor_core::port::{Actor, PurgeCounts, RecordRetention, Role, ServiceError, ServiceResult};
use sqlx::SqlitePool;
use tracing::info;

pub(crate) const STATUS_FAILED: &str = "FAILED";

pub(crate) fn storage_error(err: sqlx::Error) -> ServiceError {
    ServiceError::Storage(err.to_string())
}

/// Failed notifications and export jobs, purged per tenant
pub struct SqliteRecordStore {
    pool: SqlitePool,
}

impl SqliteRecordStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecordRetention for SqliteRecordStore {
    async fn purge_failed_records(
        &self,
        tenant_id: &str,
        cutoff_millis: i64,
        actor: &Actor,
    ) -> ServiceResult<PurgeCounts> {
        if actor.role < Role::Admin {
            return Err(ServiceError::Forbidden(format!(
                "{} may not purge records",
                actor.id
            )));
        }

        // Both deletions commit together or not at all
        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        let notifications = sqlx::query(
            "DELETE FROM notifications WHERE tenant_id = ? AND status = ? AND created_at < ?",
        )
        .bind(tenant_id)
        .bind(STATUS_FAILED)
        .bind(cutoff_millis)
        .execute(&mut *tx)
        .await
        .map_err(storage_error)?
        .rows_affected();

        let export_jobs = sqlx::query(
            "DELETE FROM export_jobs WHERE tenant_id = ? AND status = ? AND created_at < ?",
        )
        .bind(tenant_id)
        .bind(STATUS_FAILED)
        .bind(cutoff_millis)
        .execute(&mut *tx)
        .await
        .map_err(storage_error)?
        .rows_affected();

        tx.commit().await.map_err(storage_error)?;

        info!(
            tenant_id,
            cutoff_millis,
            notifications,
            export_jobs,
            "Purged failed records"
        );
        Ok(PurgeCounts {
            notifications,
            export_jobs,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::test_support::temp_pool;
    use conductor_core::port::SYSTEM_ACTOR;

    const DAY: i64 = 24 * 60 * 60 * 1000;
    const NOW: i64 = 365 * DAY;

    async fn insert_failed(pool: &SqlitePool, tenant: &str, created_at: i64) {
        sqlx::query(
            "INSERT INTO notifications (id, tenant_id, channel, recipient, status, created_at) VALUES (?, ?, 'EMAIL', 'u1', 'FAILED', ?)",
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(tenant)
        .bind(created_at)
        .execute(pool)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO export_jobs (id, tenant_id, status, created_at) VALUES (?, ?, 'FAILED', ?)",
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(tenant)
        .bind(created_at)
        .execute(pool)
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_purge_removes_only_old_failed_rows_of_tenant() {
        let pool = temp_pool().await;
        let store = SqliteRecordStore::new(pool.clone());
        insert_failed(&pool, "t1", NOW - 100 * DAY).await;
        insert_failed(&pool, "t1", NOW - 10 * DAY).await;
        insert_failed(&pool, "t2", NOW - 100 * DAY).await;

        let counts = store
            .purge_failed_records("t1", NOW - 90 * DAY, &SYSTEM_ACTOR)
            .await
            .unwrap();

        assert_eq!(
            counts,
            PurgeCounts {
                notifications: 1,
                export_jobs: 1
            }
        );
        let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM export_jobs")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(remaining, 2);
    }

    #[tokio::test]
    async fn test_purge_requires_admin() {
        let store = SqliteRecordStore::new(temp_pool().await);
        let err = store
            .purge_failed_records("t1", 0, &Actor::new("u1", Role::Member))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));
    }
}
