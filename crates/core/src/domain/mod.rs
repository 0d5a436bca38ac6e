// Domain Layer - Jobs, queues, payloads and retry policy

pub mod catalog;
pub mod error;
pub mod job;
pub mod payload;
pub mod queue;
pub mod retry;

// Re-exports
pub use error::DomainError;
pub use job::{Job, JobId, JobState, NewJob, Priority};
pub use payload::{
    AdHocNotification, CleanupParams, ExportRunPayload, JobPayload, MaintenanceCleanupPayload,
    NotificationChannel, NotificationSendPayload, RecommendationPrecomputePayload,
    ScoringRunPayload, TemplateNotification,
};
pub use queue::{JobTypeDefinition, QueueDefinition};
pub use retry::{Backoff, RetryPolicy};
