// Retry Policy value object

use serde::{Deserialize, Serialize};

/// Upper bound for a single backoff delay (1 hour)
pub const MAX_BACKOFF_DELAY_MS: i64 = 60 * 60 * 1000;

/// Backoff strategy between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Backoff {
    /// delay(k) = base_delay_ms * 2^(k-1)
    Exponential { base_delay_ms: i64 },
}

/// How often a failing job is attempted and how long to wait in between
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: i32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn exponential(max_attempts: i32, base_delay_ms: i64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: Backoff::Exponential {
                base_delay_ms: base_delay_ms.max(0),
            },
        }
    }

    pub fn base_delay_ms(&self) -> i64 {
        match self.backoff {
            Backoff::Exponential { base_delay_ms } => base_delay_ms,
        }
    }

    /// Delay between attempt `attempt` and `attempt + 1` (attempts are 1-based)
    pub fn delay_after(&self, attempt: i32) -> i64 {
        match self.backoff {
            Backoff::Exponential { base_delay_ms } => {
                let exponent = (attempt.max(1) - 1).min(62);
                let delay = base_delay_ms as f64 * 2f64.powi(exponent);
                delay.min(MAX_BACKOFF_DELAY_MS as f64) as i64
            }
        }
    }
}
