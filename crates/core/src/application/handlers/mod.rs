// Job Handlers - one per job type, each calls exactly one domain service

mod export;
mod maintenance;
mod notification;
mod recommendation;
mod scoring;

pub use export::ExportRunHandler;
pub use maintenance::MaintenanceCleanupHandler;
pub use notification::NotificationSendHandler;
pub use recommendation::RecommendationPrecomputeHandler;
pub use scoring::ScoringRunHandler;

use crate::domain::JobPayload;
use crate::port::{
    ExportService, NotificationService, RecommendationService, RecordRetention, ScoringService,
    ServiceError, TimeProvider,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Why a handler invocation failed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandlerError {
    /// The domain service failed; the attempt may succeed later
    #[error("{0}")]
    Service(#[from] ServiceError),

    /// The payload cannot be processed by this handler at all
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

impl HandlerError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, HandlerError::Service(_))
    }

    fn wrong_variant(expected: &str, payload: &JobPayload) -> Self {
        HandlerError::InvalidPayload(format!(
            "{} handler received a {} payload",
            expected,
            payload.job_type()
        ))
    }
}

pub type HandlerResult<T> = std::result::Result<T, HandlerError>;

/// Executes one job type
///
/// Returns a JSON summary that is stored as the job result.
#[async_trait]
pub trait JobHandler: Send + Sync {
    fn job_type(&self) -> &'static str;

    async fn handle(&self, payload: &JobPayload) -> HandlerResult<serde_json::Value>;
}

/// Domain services the standard handlers call
#[derive(Clone)]
pub struct DomainServices {
    pub exports: Arc<dyn ExportService>,
    pub notifications: Arc<dyn NotificationService>,
    pub scoring: Arc<dyn ScoringService>,
    pub recommendations: Arc<dyn RecommendationService>,
    pub retention: Arc<dyn RecordRetention>,
}

/// Job type name -> handler
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<&'static str, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handlers for the five standard job types
    pub fn standard(services: DomainServices, time_provider: Arc<dyn TimeProvider>) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(ExportRunHandler::new(services.exports)));
        registry.register(Arc::new(NotificationSendHandler::new(
            services.notifications,
        )));
        registry.register(Arc::new(ScoringRunHandler::new(services.scoring)));
        registry.register(Arc::new(RecommendationPrecomputeHandler::new(
            services.recommendations,
        )));
        registry.register(Arc::new(MaintenanceCleanupHandler::new(
            services.retention,
            time_provider,
        )));
        registry
    }

    /// Register (or replace) the handler for its job type
    pub fn register(&mut self, handler: Arc<dyn JobHandler>) -> &mut Self {
        self.handlers.insert(handler.job_type(), handler);
        self
    }

    pub fn get(&self, job_type: &str) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(job_type).cloned()
    }

    pub fn job_types(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.handlers.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::catalog::*;
    use crate::port::domain_services::{
        MockExportService, MockNotificationService, MockRecommendationService,
        MockRecordRetention, MockScoringService,
    };
    use crate::port::time_provider::mocks::ManualTimeProvider;

    #[test]
    fn test_standard_registry_covers_catalog() {
        let services = DomainServices {
            exports: Arc::new(MockExportService::new()),
            notifications: Arc::new(MockNotificationService::new()),
            scoring: Arc::new(MockScoringService::new()),
            recommendations: Arc::new(MockRecommendationService::new()),
            retention: Arc::new(MockRecordRetention::new()),
        };
        let registry = HandlerRegistry::standard(services, Arc::new(ManualTimeProvider::new(0)));

        for (job_type, _) in STANDARD_JOB_TYPES {
            let handler = registry.get(job_type).unwrap();
            assert_eq!(handler.job_type(), job_type);
        }
        assert_eq!(registry.job_types().len(), 5);
        assert!(registry.get("unknown").is_none());
    }

    #[test]
    fn test_retryability() {
        assert!(HandlerError::Service(ServiceError::Storage("down".into())).is_retryable());
        assert!(!HandlerError::InvalidPayload("bad".into()).is_retryable());
    }
}
