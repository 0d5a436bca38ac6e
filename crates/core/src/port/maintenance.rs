// Retention of finished jobs on the queue backend

use serde::{Deserialize, Serialize};

/// How long finished jobs are kept for inspection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    /// Completed jobs older than this are removed (ms)
    pub completed_max_age_ms: i64,
    /// At most this many completed jobs are kept per queue
    pub completed_max_count: i64,
    /// Failed jobs older than this are removed (ms)
    pub failed_max_age_ms: i64,
    /// At most this many failed jobs are kept per queue
    pub failed_max_count: i64,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            completed_max_age_ms: 60 * 60 * 1000, // 1 hour
            completed_max_count: 1000,
            failed_max_age_ms: 24 * 60 * 60 * 1000, // 24 hours
            failed_max_count: 500,
        }
    }
}

/// Outcome of a prune pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PruneStats {
    pub completed_removed: u64,
    pub failed_removed: u64,
}

impl PruneStats {
    pub fn total(&self) -> u64 {
        self.completed_removed + self.failed_removed
    }
}
