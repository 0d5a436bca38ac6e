//! Shared fixtures: a fresh SQLite queue per test and polling helpers

#![allow(dead_code)]

use conductor_core::domain::{Job, JobId};
use conductor_core::port::id_provider::UuidProvider;
use conductor_core::port::time_provider::SystemTimeProvider;
use conductor_core::port::{IdProvider, QueueBackend, TimeProvider};
use conductor_infra_sqlite::{create_pool, run_migrations, SqlitePool, SqliteQueueBackend};
use std::sync::Arc;
use std::time::Duration;

pub const DAY_MS: i64 = 24 * 60 * 60 * 1000;

pub struct Harness {
    pub pool: SqlitePool,
    pub backend: Arc<SqliteQueueBackend>,
    pub id_provider: Arc<dyn IdProvider>,
    pub time_provider: Arc<dyn TimeProvider>,
}

impl Harness {
    pub async fn new() -> Self {
        let path = std::env::temp_dir().join(format!("conductor-it-{}.db", uuid::Uuid::new_v4()));
        let pool = create_pool(&format!("sqlite://{}", path.display()))
            .await
            .unwrap();
        run_migrations(&pool).await.unwrap();

        let id_provider: Arc<dyn IdProvider> = Arc::new(UuidProvider);
        let time_provider: Arc<dyn TimeProvider> = Arc::new(SystemTimeProvider);
        let backend = Arc::new(SqliteQueueBackend::new(
            pool.clone(),
            id_provider.clone(),
            time_provider.clone(),
        ));

        Self {
            pool,
            backend,
            id_provider,
            time_provider,
        }
    }

    pub fn queue_backend(&self) -> Arc<dyn QueueBackend> {
        self.backend.clone()
    }

    pub fn now(&self) -> i64 {
        self.time_provider.now_millis()
    }

    /// Poll until the job reaches Completed or Failed
    pub async fn wait_terminal(&self, job_id: &JobId, timeout: Duration) -> Job {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let job = self.backend.find(job_id).await.unwrap().unwrap();
            if job.state.is_terminal() {
                return job;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "job {} still {} after {:?}",
                job_id,
                job.state,
                timeout
            );
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}
