// Worker constants (no magic values)
use std::time::Duration;

/// Longest an idle worker waits before pulling again (1s)
/// Local enqueues wake it earlier; the bound covers producers in other processes
pub const MAX_IDLE_WAIT: Duration = Duration::from_secs(1);

/// Sleep duration after worker error before retry (1s)
pub const ERROR_RECOVERY_SLEEP_DURATION: Duration = Duration::from_secs(1);

/// Acks tried before the attempt is handed back to the queue
pub const ACK_MAX_ATTEMPTS: u32 = 3;

/// Delay before the first ack retry, doubled each time (50ms)
pub const ACK_RETRY_BASE_DELAY: Duration = Duration::from_millis(50);

/// Default recovery window for orphaned jobs (5 minutes)
pub const DEFAULT_RECOVERY_WINDOW_MS: i64 = 5 * 60 * 1000;

/// Window for the periodic stale-job sweep of a running daemon (30 minutes)
pub const DEFAULT_STALE_SWEEP_WINDOW_MS: i64 = 30 * 60 * 1000;

/// Default interval between retention prune passes (10 minutes)
pub const DEFAULT_PRUNE_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Error recorded on a job whose type has no handler
pub const NO_HANDLER_ERROR: &str = "no handler registered for job type";

/// Error prefix recorded when a successful run could not be acknowledged
pub const ACK_FAILED_ERROR: &str = "acknowledgement failed";
