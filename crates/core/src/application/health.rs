// Health Reporter - read-only view of queue depths

use crate::application::registry::JobRegistry;
use crate::port::{BackendKind, QueueBackend, QueueStats};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

/// Detailed state of one queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueHealth {
    pub name: String,
    pub concurrency: usize,
    pub pending: u64,
    pub stats: QueueStats,
}

/// Backend kind plus every queue, for `admin.health.v1`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub backend: BackendKind,
    pub durable: bool,
    pub queues: Vec<QueueHealth>,
}

pub struct HealthReporter {
    registry: Arc<JobRegistry>,
    backend: Arc<dyn QueueBackend>,
}

impl HealthReporter {
    pub fn new(registry: Arc<JobRegistry>, backend: Arc<dyn QueueBackend>) -> Self {
        Self { registry, backend }
    }

    /// Pending count per defined queue
    ///
    /// Never fails: a queue the backend cannot answer for reports 0.
    pub async fn report(&self) -> BTreeMap<String, u64> {
        let mut report = BTreeMap::new();
        for queue in self.registry.queues() {
            let pending = match self.backend.pending_count(&queue.name).await {
                Ok(n) => n,
                Err(e) => {
                    warn!(queue = %queue.name, error = %e, "Pending count unavailable");
                    0
                }
            };
            report.insert(queue.name.clone(), pending);
        }
        report
    }

    pub async fn snapshot(&self) -> HealthSnapshot {
        let mut queues = Vec::with_capacity(self.registry.queues().len());
        for queue in self.registry.queues() {
            let stats = match self.backend.queue_stats(&queue.name).await {
                Ok(stats) => stats,
                Err(e) => {
                    warn!(queue = %queue.name, error = %e, "Queue stats unavailable");
                    QueueStats::default()
                }
            };
            queues.push(QueueHealth {
                name: queue.name.clone(),
                concurrency: queue.concurrency,
                pending: stats.pending(),
                stats,
            });
        }

        HealthSnapshot {
            backend: self.backend.kind(),
            durable: self.backend.is_durable(),
            queues,
        }
    }
}
