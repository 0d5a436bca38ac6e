// Well-known queue and job type names

pub const QUEUE_EXPORT: &str = "export";
pub const QUEUE_NOTIFICATION: &str = "notification";
pub const QUEUE_SCORING: &str = "scoring";
pub const QUEUE_RECOMMENDATION: &str = "recommendation";
pub const QUEUE_MAINTENANCE: &str = "maintenance";

pub const EXPORT_RUN: &str = "export-run";
pub const NOTIFICATION_SEND: &str = "notification-send";
pub const SCORING_RUN: &str = "scoring-run";
pub const RECOMMENDATION_PRECOMPUTE: &str = "recommendation-precompute";
pub const MAINTENANCE_CLEANUP: &str = "maintenance-cleanup";

/// (queue, concurrency) for the standard catalog
pub const STANDARD_QUEUES: [(&str, usize); 5] = [
    (QUEUE_EXPORT, 2),
    (QUEUE_NOTIFICATION, 5),
    (QUEUE_SCORING, 4),
    (QUEUE_RECOMMENDATION, 2),
    (QUEUE_MAINTENANCE, 1),
];

/// (job type, queue) for the standard catalog
pub const STANDARD_JOB_TYPES: [(&str, &str); 5] = [
    (EXPORT_RUN, QUEUE_EXPORT),
    (NOTIFICATION_SEND, QUEUE_NOTIFICATION),
    (SCORING_RUN, QUEUE_SCORING),
    (RECOMMENDATION_PRECOMPUTE, QUEUE_RECOMMENDATION),
    (MAINTENANCE_CLEANUP, QUEUE_MAINTENANCE),
];

pub const DEFAULT_MAX_ATTEMPTS: i32 = 3;
pub const DEFAULT_RETRY_BASE_DELAY_MS: i64 = 1000;

/// Retention window for the maintenance-cleanup job
pub const DEFAULT_CLEANUP_BEFORE_DAYS: i64 = 90;
