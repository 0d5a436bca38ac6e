//! RPC Request/Response Types
//!
//! Parameters and results of the JSON-RPC methods.

use conductor_core::application::{EnqueueOptions, HealthSnapshot};
use conductor_core::domain::Priority;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// jobs.enqueue.v1 - Enqueue a job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnqueueRequest {
    pub job_type: String,
    pub payload: serde_json::Value,
    #[serde(default)]
    pub delay_ms: i64,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff_base_ms: Option<i64>,
}

impl EnqueueRequest {
    pub fn options(&self) -> EnqueueOptions {
        EnqueueOptions {
            delay_ms: self.delay_ms,
            priority: self.priority,
            max_attempts: self.max_attempts,
            backoff_base_ms: self.backoff_base_ms,
        }
    }
}

/// jobs.get.v1 - Look up one job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetJobRequest {
    pub job_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobView {
    pub job_id: String,
    pub queue: String,
    pub job_type: String,
    pub state: String,
    pub attempts: i32,
    pub max_attempts: i32,
    pub priority: Priority,
    pub enqueued_at: i64,
    pub visible_at: i64,
    pub started_at: Option<i64>,
    pub finished_at: Option<i64>,
    pub last_error: Option<String>,
    pub result: Option<serde_json::Value>,
}

/// admin.health.v1 - Queue depths and backend mode
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Pending jobs per queue
    pub pending: BTreeMap<String, u64>,
    #[serde(flatten)]
    pub snapshot: HealthSnapshot,
}

/// admin.prune.v1 - Apply the retention policy now
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PruneResponse {
    pub completed_removed: u64,
    pub failed_removed: u64,
}
