//! Queue backend selection at boot

use anyhow::{Context, Result};
use conductor_core::config::{BackendSelection, NoopReason};
use conductor_core::error::AppError;
use conductor_core::port::{IdProvider, NoopQueueBackend, QueueBackend, TimeProvider};
use conductor_infra_sqlite::{create_pool, run_migrations, SqlitePool, SqliteQueueBackend};
use std::sync::Arc;
use tracing::{error, info, warn};

/// The backend the process runs with, fixed for its lifetime
pub enum ActiveBackend {
    Durable {
        url: String,
        backend: Arc<SqliteQueueBackend>,
    },
    Noop(NoopReason),
}

impl std::fmt::Debug for ActiveBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActiveBackend::Durable { url, .. } => {
                f.debug_struct("Durable").field("url", url).finish()
            }
            ActiveBackend::Noop(reason) => f.debug_tuple("Noop").field(reason).finish(),
        }
    }
}

impl ActiveBackend {
    pub fn queue_backend(&self) -> Arc<dyn QueueBackend> {
        match self {
            ActiveBackend::Durable { backend, .. } => backend.clone(),
            ActiveBackend::Noop(_) => Arc::new(NoopQueueBackend::new()),
        }
    }
}

/// Accept plain paths and `~` in SQLite connection strings
pub fn normalize_sqlite_url(raw: &str) -> String {
    if let Some(path) = raw.strip_prefix("sqlite://") {
        format!("sqlite://{}", shellexpand::tilde(path))
    } else if raw.starts_with("sqlite:") {
        raw.to_string()
    } else {
        format!("sqlite://{}", shellexpand::tilde(raw))
    }
}

/// Open and migrate a SQLite store
pub async fn open_store(url: &str) -> conductor_core::Result<SqlitePool> {
    let pool = create_pool(url).await?;
    run_migrations(&pool).await?;
    Ok(pool)
}

/// Resolve the configured selection into a running backend
///
/// An unreachable durable store fails startup unless degraded mode is
/// allowed, in which case the process continues with the no-op backend.
pub async fn connect(
    selection: BackendSelection,
    id_provider: Arc<dyn IdProvider>,
    time_provider: Arc<dyn TimeProvider>,
) -> Result<ActiveBackend> {
    let (url, allow_degraded) = match selection {
        BackendSelection::Noop(reason) => {
            warn!(%reason, "Background jobs will be accepted but never executed");
            return Ok(ActiveBackend::Noop(reason));
        }
        BackendSelection::Durable {
            url,
            allow_degraded,
        } => (normalize_sqlite_url(&url), allow_degraded),
    };

    match open_store(&url).await {
        Ok(pool) => {
            info!(url = %url, "Durable queue backend connected");
            Ok(ActiveBackend::Durable {
                url,
                backend: Arc::new(SqliteQueueBackend::new(pool, id_provider, time_provider)),
            })
        }
        Err(AppError::BackendUnavailable(reason)) if allow_degraded => {
            error!(
                url = %url,
                error = %reason,
                "Durable queue backend unreachable, running degraded: jobs will NOT be executed"
            );
            Ok(ActiveBackend::Noop(NoopReason::Unreachable))
        }
        Err(e) => Err(e).with_context(|| format!("Queue backend at {} unavailable", url)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_core::port::id_provider::UuidProvider;
    use conductor_core::port::time_provider::SystemTimeProvider;
    use conductor_core::port::BackendKind;

    const UNREACHABLE: &str = "sqlite:///nonexistent-dir/conductor/queue.db";

    async fn connect_to(selection: BackendSelection) -> Result<ActiveBackend> {
        connect(selection, Arc::new(UuidProvider), Arc::new(SystemTimeProvider)).await
    }

    #[test]
    fn test_normalize_sqlite_url() {
        assert_eq!(normalize_sqlite_url("sqlite::memory:"), "sqlite::memory:");
        assert_eq!(
            normalize_sqlite_url("sqlite:///var/lib/q.db"),
            "sqlite:///var/lib/q.db"
        );
        assert_eq!(normalize_sqlite_url("/tmp/q.db"), "sqlite:///tmp/q.db");
        assert!(!normalize_sqlite_url("sqlite://~/q.db").contains('~'));
    }

    #[tokio::test]
    async fn test_unreachable_store_fails_startup() {
        let result = connect_to(BackendSelection::Durable {
            url: UNREACHABLE.to_string(),
            allow_degraded: false,
        })
        .await;
        tokio_test::assert_err!(result);
    }

    #[tokio::test]
    async fn test_unreachable_store_degrades_when_allowed() {
        let active = connect_to(BackendSelection::Durable {
            url: UNREACHABLE.to_string(),
            allow_degraded: true,
        })
        .await
        .unwrap();
        assert!(matches!(active, ActiveBackend::Noop(NoopReason::Unreachable)));
        assert_eq!(format!("{:?}", active), "Noop(Unreachable)");
        assert_eq!(active.queue_backend().kind(), BackendKind::Noop);
    }

    #[tokio::test]
    async fn test_reachable_store_is_durable() {
        let path = std::env::temp_dir().join(format!("conductor-daemon-{}.db", uuid::Uuid::new_v4()));
        let active = connect_to(BackendSelection::Durable {
            url: path.display().to_string(),
            allow_degraded: false,
        })
        .await
        .unwrap();
        assert!(active.queue_backend().is_durable());
    }
}
