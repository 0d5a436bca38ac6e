//! Retry behaviour against the SQLite backend with real workers

mod common;

use async_trait::async_trait;
use common::Harness;
use conductor_core::application::handlers::{HandlerError, HandlerResult, JobHandler};
use conductor_core::application::{
    Dispatcher, EnqueueOptions, HandlerRegistry, JobRegistry, WorkerRuntime,
};
use conductor_core::domain::catalog::SCORING_RUN;
use conductor_core::domain::{JobPayload, JobState};
use conductor_core::port::ServiceError;
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const TIMEOUT: Duration = Duration::from_secs(15);

/// Fails the first `failures` invocations, then succeeds
struct FlakyHandler {
    failures: usize,
    permanent: bool,
    invocations: Mutex<Vec<Instant>>,
}

impl FlakyHandler {
    fn new(failures: usize) -> Arc<Self> {
        Arc::new(Self {
            failures,
            permanent: false,
            invocations: Mutex::new(Vec::new()),
        })
    }

    fn rejecting() -> Arc<Self> {
        Arc::new(Self {
            failures: usize::MAX,
            permanent: true,
            invocations: Mutex::new(Vec::new()),
        })
    }

    fn invocations(&self) -> Vec<Instant> {
        self.invocations.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobHandler for FlakyHandler {
    fn job_type(&self) -> &'static str {
        SCORING_RUN
    }

    async fn handle(&self, _payload: &JobPayload) -> HandlerResult<serde_json::Value> {
        let attempt = {
            let mut calls = self.invocations.lock().unwrap();
            calls.push(Instant::now());
            calls.len()
        };
        if self.permanent {
            return Err(HandlerError::InvalidPayload("unsupported options".into()));
        }
        if attempt <= self.failures {
            return Err(ServiceError::Upstream(format!("attempt {} failed", attempt)).into());
        }
        Ok(json!({"attempt": attempt}))
    }
}

async fn run_one(
    h: &Harness,
    handler: Arc<FlakyHandler>,
    options: EnqueueOptions,
) -> conductor_core::domain::Job {
    let mut handlers = HandlerRegistry::new();
    handlers.register(handler);

    let registry = Arc::new(JobRegistry::standard());
    let runtime = WorkerRuntime::start(&registry, h.queue_backend(), Arc::new(handlers));
    let dispatcher = Dispatcher::new(registry.clone(), h.queue_backend());

    let handle = dispatcher
        .enqueue(
            SCORING_RUN,
            json!({"tenantId": "t1", "assessmentId": "a1"}),
            options,
        )
        .await
        .unwrap();

    let job = h.wait_terminal(&handle.job_id, TIMEOUT).await;
    runtime.shutdown().await;
    job
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_k_failures_then_success() {
    let h = Harness::new().await;
    let handler = FlakyHandler::new(2);

    let job = run_one(
        &h,
        handler.clone(),
        EnqueueOptions {
            max_attempts: Some(5),
            backoff_base_ms: Some(100),
            ..EnqueueOptions::default()
        },
    )
    .await;

    assert_eq!(job.state, JobState::Completed);
    assert_eq!(job.attempts, 3);
    assert_eq!(job.result, Some(json!({"attempt": 3})));

    let calls = handler.invocations();
    assert_eq!(calls.len(), 3);
    let first_gap = calls[1] - calls[0];
    let second_gap = calls[2] - calls[1];
    assert!(first_gap >= Duration::from_millis(100), "{:?}", first_gap);
    assert!(second_gap >= Duration::from_millis(200), "{:?}", second_gap);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_exhausted_attempts_fail_terminally() {
    let h = Harness::new().await;
    let handler = FlakyHandler::new(usize::MAX);

    let job = run_one(
        &h,
        handler.clone(),
        EnqueueOptions {
            backoff_base_ms: Some(20),
            ..EnqueueOptions::default()
        },
    )
    .await;

    assert_eq!(job.state, JobState::Failed);
    assert_eq!(job.attempts, 3);
    assert_eq!(handler.invocations().len(), 3);
    assert!(job.last_error.unwrap().contains("attempt 3 failed"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_invalid_payload_is_not_retried() {
    let h = Harness::new().await;
    let handler = FlakyHandler::rejecting();

    let job = run_one(&h, handler.clone(), EnqueueOptions::default()).await;

    assert_eq!(job.state, JobState::Failed);
    assert_eq!(job.attempts, 1);
    assert_eq!(handler.invocations().len(), 1);
}

#[tokio::test]
async fn test_job_without_handler_fails_once() {
    let h = Harness::new().await;
    let registry = Arc::new(JobRegistry::standard());
    let runtime = WorkerRuntime::start(
        &registry,
        h.queue_backend(),
        Arc::new(HandlerRegistry::new()),
    );
    let dispatcher = Dispatcher::new(registry.clone(), h.queue_backend());

    let handle = dispatcher
        .enqueue(
            SCORING_RUN,
            json!({"tenantId": "t1", "assessmentId": "a1"}),
            EnqueueOptions::default(),
        )
        .await
        .unwrap();

    let job = h.wait_terminal(&handle.job_id, TIMEOUT).await;
    runtime.shutdown().await;

    assert_eq!(job.state, JobState::Failed);
    assert_eq!(job.attempts, 1);
}
