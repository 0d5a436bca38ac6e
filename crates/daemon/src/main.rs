//! Conductor - background job orchestrator daemon

mod backend;
mod telemetry;

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use backend::{connect, normalize_sqlite_url, open_store, ActiveBackend};
use conductor_api_rpc::{RpcHandler, RpcServer, RpcServerConfig};
use conductor_core::application::handlers::MaintenanceCleanupHandler;
use conductor_core::application::worker::constants::{
    DEFAULT_PRUNE_INTERVAL, DEFAULT_STALE_SWEEP_WINDOW_MS,
};
use conductor_core::application::{
    shutdown_channel, DomainServices, Dispatcher, HandlerRegistry, HealthReporter,
    RecoveryService, RetentionScheduler, WorkerRuntime,
};
use conductor_core::config::QueueSettings;
use conductor_core::port::id_provider::UuidProvider;
use conductor_core::port::time_provider::SystemTimeProvider;
use conductor_core::port::{IdProvider, RetentionPolicy, TimeProvider};
use conductor_infra_sqlite::{
    ReferenceServices, SqlitePool, SqliteQueueBackend, SqliteRecordStore,
};

const ENV_RECORDS_URL: &str = "CONDUCTOR_RECORDS_URL";
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    let _log_guard = telemetry::init(telemetry::LogFormat::from_env())?;
    info!("Conductor v{} starting...", conductor_core::VERSION);

    // 1. Configuration (read once)
    let settings = QueueSettings::from_env().context("Invalid queue configuration")?;
    let registry = Arc::new(settings.registry().context("Invalid job registry")?);
    let rpc_config = RpcServerConfig::from_env().context("Invalid RPC configuration")?;

    let time_provider: Arc<dyn TimeProvider> = Arc::new(SystemTimeProvider);
    let id_provider: Arc<dyn IdProvider> = Arc::new(UuidProvider);

    // 2. Queue backend
    let active = connect(
        settings.backend_selection(),
        id_provider.clone(),
        time_provider.clone(),
    )
    .await?;
    let queue_backend = active.queue_backend();

    let dispatcher = Arc::new(Dispatcher::new(registry.clone(), queue_backend.clone()));
    let health = Arc::new(HealthReporter::new(registry.clone(), queue_backend.clone()));
    let retention = RetentionPolicy::default();

    // 3. Consumers (durable mode only)
    let (shutdown_tx, shutdown_rx) = shutdown_channel();
    let mut scheduler_handle = None;
    let runtime = match &active {
        ActiveBackend::Durable { url, backend } => {
            let records = record_pool(url, backend).await?;
            let handlers = Arc::new(build_handlers(
                settings.reference_services,
                records,
                id_provider.clone(),
                time_provider.clone(),
            ));

            info!("Running crash recovery...");
            let recovery = RecoveryService::new(queue_backend.clone(), time_provider.clone(), None);
            match recovery.recover_orphaned_jobs().await {
                Ok(count) => info!(recovered_jobs = count, "Crash recovery completed"),
                Err(e) => error!(error = ?e, "Crash recovery failed"),
            }

            // Jobs whose ack never landed are reclaimed without a restart
            let scheduler = RetentionScheduler::new(
                queue_backend.clone(),
                retention.clone(),
                DEFAULT_PRUNE_INTERVAL,
            )
            .with_stale_sweep(RecoveryService::new(
                queue_backend.clone(),
                time_provider.clone(),
                Some(DEFAULT_STALE_SWEEP_WINDOW_MS),
            ));
            scheduler_handle = Some(tokio::spawn(scheduler.run(shutdown_rx.clone())));

            WorkerRuntime::start(&registry, queue_backend.clone(), handlers)
        }
        ActiveBackend::Noop(reason) => {
            warn!(%reason, "No worker pools started");
            WorkerRuntime::start(&registry, queue_backend.clone(), Arc::new(HandlerRegistry::new()))
        }
    };

    // 4. JSON-RPC server
    let handler = RpcHandler::new(
        dispatcher,
        health,
        retention,
        rpc_config.rate_limit_burst,
        rpc_config.rate_limit_per_sec,
    );
    let (rpc_addr, rpc_handle) = RpcServer::new(rpc_config, handler)
        .start()
        .await
        .context("RPC server start failed")?;

    info!(
        rpc = %rpc_addr,
        backend = %queue_backend.kind(),
        workers = runtime.worker_count(),
        "System ready"
    );

    // 5. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, finishing jobs in hand...");

    shutdown_tx.shutdown();
    if let Err(e) = rpc_handle.stop() {
        warn!(error = %e, "RPC server already stopped");
    }
    if tokio::time::timeout(SHUTDOWN_GRACE, runtime.shutdown())
        .await
        .is_err()
    {
        warn!(grace_secs = SHUTDOWN_GRACE.as_secs(), "Workers did not stop in time");
    }
    if let Some(handle) = scheduler_handle {
        join_logged("retention-scheduler", handle).await;
    }

    info!("Shutdown complete.");
    Ok(())
}

/// Wait for a background task; a panic or cancellation is logged, not propagated
async fn join_logged(task: &'static str, handle: JoinHandle<()>) -> bool {
    match handle.await {
        Ok(()) => true,
        Err(e) => {
            warn!(task, error = %e, panicked = e.is_panic(), "Background task failed");
            false
        }
    }
}

/// Domain records live next to the queue unless `CONDUCTOR_RECORDS_URL` says otherwise
async fn record_pool(queue_url: &str, queue_backend: &SqliteQueueBackend) -> Result<SqlitePool> {
    let records_url = std::env::var(ENV_RECORDS_URL)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(|v| normalize_sqlite_url(v.trim()));

    match records_url {
        Some(url) if url != queue_url => {
            info!(url = %url, "Opening record store");
            open_store(&url)
                .await
                .with_context(|| format!("Record store at {} unavailable", url))
        }
        _ => Ok(queue_backend.pool().clone()),
    }
}

/// Handlers the durable daemon runs
///
/// Cleanup always runs against the record store. The other job types are only
/// registered with the bookkeeping-only reference services; without them they
/// fail as "no handler registered" instead of reporting work that never happened.
fn build_handlers(
    reference_services: bool,
    records: SqlitePool,
    id_provider: Arc<dyn IdProvider>,
    time_provider: Arc<dyn TimeProvider>,
) -> HandlerRegistry {
    let retention = Arc::new(SqliteRecordStore::new(records.clone()));

    if reference_services {
        warn!(
            "Reference domain services active: export, notification, scoring and \
             recommendation jobs only write bookkeeping rows"
        );
        let reference = Arc::new(ReferenceServices::new(
            records,
            id_provider,
            time_provider.clone(),
        ));
        let services = DomainServices {
            exports: reference.clone(),
            notifications: reference.clone(),
            scoring: reference.clone(),
            recommendations: reference,
            retention,
        };
        return HandlerRegistry::standard(services, time_provider);
    }

    let mut handlers = HandlerRegistry::new();
    handlers.register(Arc::new(MaintenanceCleanupHandler::new(retention, time_provider)));
    warn!(
        registered = ?handlers.job_types(),
        "No domain services wired for the remaining job types; their jobs will fail"
    );
    handlers
}
