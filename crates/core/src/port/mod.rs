// Port Layer - Interfaces for external dependencies

pub mod domain_services;
pub mod id_provider; // For deterministic testing
pub mod maintenance;
pub mod queue_backend;
pub mod time_provider;

// Re-exports
pub use domain_services::{
    Actor, ExportJob, ExportService, NotificationService, PrecomputeForTenantInput,
    PrecomputeForUserInput, PurgeCounts, RecommendationService, RecordRetention, Role,
    ScoreAssessmentInput, ScoringService, SendResult, ServiceError, ServiceResult, SYSTEM_ACTOR,
};
pub use id_provider::IdProvider;
pub use maintenance::{PruneStats, RetentionPolicy};
pub use queue_backend::{
    BackendKind, FailureOutcome, NoopQueueBackend, QueueBackend, QueueSignals, QueueStats,
};
pub use time_provider::TimeProvider;
