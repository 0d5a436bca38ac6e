// Worker pools - one per queue, `concurrency` workers each

use super::shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};
use super::Worker;
use crate::application::handlers::HandlerRegistry;
use crate::application::registry::JobRegistry;
use crate::domain::QueueDefinition;
use crate::error::Result;
use crate::port::QueueBackend;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Consumers of a single queue
pub struct WorkerPool {
    queue: QueueDefinition,
    backend: Arc<dyn QueueBackend>,
    handlers: Arc<HandlerRegistry>,
}

impl WorkerPool {
    pub fn new(
        queue: QueueDefinition,
        backend: Arc<dyn QueueBackend>,
        handlers: Arc<HandlerRegistry>,
    ) -> Self {
        Self {
            queue,
            backend,
            handlers,
        }
    }

    pub fn queue(&self) -> &QueueDefinition {
        &self.queue
    }

    /// Spawn exactly `concurrency` workers
    pub fn spawn(&self, shutdown: &ShutdownToken) -> Vec<JoinHandle<Result<()>>> {
        info!(
            queue = %self.queue.name,
            concurrency = self.queue.concurrency,
            "Starting worker pool"
        );
        (0..self.queue.concurrency)
            .map(|slot| {
                let worker = Worker::new(
                    self.queue.name.clone(),
                    slot,
                    self.backend.clone(),
                    self.handlers.clone(),
                );
                let token = shutdown.clone();
                tokio::spawn(async move { worker.run(token).await })
            })
            .collect()
    }
}

/// All worker pools of the process
pub struct WorkerRuntime {
    shutdown: ShutdownSender,
    handles: Vec<(String, JoinHandle<Result<()>>)>,
}

impl WorkerRuntime {
    /// Start one pool per registry queue
    ///
    /// With a non-durable backend nothing would ever be dequeued, so no
    /// pools are started and the runtime is empty.
    pub fn start(
        registry: &JobRegistry,
        backend: Arc<dyn QueueBackend>,
        handlers: Arc<HandlerRegistry>,
    ) -> Self {
        let (shutdown, token) = shutdown_channel();
        let mut handles = Vec::new();

        if !backend.is_durable() {
            warn!(
                backend = %backend.kind(),
                "Queue backend is not durable, worker pools not started"
            );
            return Self { shutdown, handles };
        }

        for queue in registry.queues() {
            let pool = WorkerPool::new(queue.clone(), backend.clone(), handlers.clone());
            handles.extend(
                pool.spawn(&token)
                    .into_iter()
                    .map(|h| (queue.name.clone(), h)),
            );
        }

        info!(
            pools = registry.queues().len(),
            workers = handles.len(),
            backend = %backend.kind(),
            "Worker runtime started"
        );
        Self { shutdown, handles }
    }

    /// Number of running workers across all queues
    pub fn worker_count(&self) -> usize {
        self.handles.len()
    }

    /// Signal every worker and wait for jobs in hand to finish
    pub async fn shutdown(self) {
        self.shutdown.shutdown();
        for (queue, handle) in self.handles {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(queue = %queue, error = %e, "Worker exited with error"),
                Err(e) => error!(queue = %queue, error = %e, "Worker task failed"),
            }
        }
        info!("Worker runtime stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::handlers::{HandlerResult, JobHandler};
    use crate::domain::catalog::SCORING_RUN;
    use crate::domain::{JobPayload, JobState, NewJob, RetryPolicy, ScoringRunPayload};
    use crate::port::id_provider::SequentialIdProvider;
    use crate::port::queue_backend::mocks::MemoryQueueBackend;
    use crate::port::time_provider::mocks::ManualTimeProvider;
    use crate::port::NoopQueueBackend;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Sleeps while tracking how many invocations overlap
    #[derive(Default)]
    struct SlowHandler {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        done: AtomicUsize,
    }

    #[async_trait]
    impl JobHandler for SlowHandler {
        fn job_type(&self) -> &'static str {
            SCORING_RUN
        }

        async fn handle(&self, _payload: &JobPayload) -> HandlerResult<serde_json::Value> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(30)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.done.fetch_add(1, Ordering::SeqCst);
            Ok(serde_json::Value::Null)
        }
    }

    fn scoring_job() -> NewJob {
        NewJob {
            queue: "scoring".to_string(),
            payload: JobPayload::ScoringRun(ScoringRunPayload {
                tenant_id: "t1".to_string(),
                assessment_id: "a1".to_string(),
                options: serde_json::Value::Null,
            }),
            delay_ms: 0,
            priority: 0,
            retry: RetryPolicy::exponential(1, 0),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_pool_never_exceeds_concurrency() {
        let backend = Arc::new(MemoryQueueBackend::new(
            Arc::new(SequentialIdProvider::new("job")),
            Arc::new(ManualTimeProvider::new(0)),
        ));
        for _ in 0..12 {
            backend.enqueue(scoring_job()).await.unwrap();
        }

        let handler = Arc::new(SlowHandler::default());
        let mut handlers = HandlerRegistry::new();
        handlers.register(handler.clone());

        let registry = JobRegistry::builder()
            .queue("scoring", 3)
            .job_type(SCORING_RUN, "scoring")
            .build()
            .unwrap();
        let runtime = WorkerRuntime::start(&registry, backend.clone(), Arc::new(handlers));
        assert_eq!(runtime.worker_count(), 3);

        tokio::time::timeout(Duration::from_secs(10), async {
            while handler.done.load(Ordering::SeqCst) < 12 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        runtime.shutdown().await;

        let max = handler.max_in_flight.load(Ordering::SeqCst);
        assert!(max <= 3, "observed {} concurrent jobs", max);
        assert!(max >= 2);
        assert!(backend
            .all_jobs()
            .iter()
            .all(|j| j.state == JobState::Completed));
    }

    #[tokio::test]
    async fn test_noop_backend_starts_no_workers() {
        let runtime = WorkerRuntime::start(
            &JobRegistry::standard(),
            Arc::new(NoopQueueBackend::new()),
            Arc::new(HandlerRegistry::new()),
        );
        assert_eq!(runtime.worker_count(), 0);
        runtime.shutdown().await;
    }

    #[tokio::test]
    async fn test_standard_runtime_worker_count() {
        let backend = Arc::new(MemoryQueueBackend::new(
            Arc::new(SequentialIdProvider::new("job")),
            Arc::new(ManualTimeProvider::new(0)),
        ));
        let runtime = WorkerRuntime::start(
            &JobRegistry::standard(),
            backend,
            Arc::new(HandlerRegistry::new()),
        );
        // 2 + 5 + 4 + 2 + 1
        assert_eq!(runtime.worker_count(), 14);
        tokio::time::timeout(Duration::from_secs(3), runtime.shutdown())
            .await
            .unwrap();
    }
}
