// Domain Service Ports - implemented by the platform, consumed by job handlers

use crate::domain::{
    AdHocNotification, NotificationChannel, TemplateNotification,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use thiserror::Error;

#[cfg(test)]
use mockall::automock;

/// Authorization role of a caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Member,
    Manager,
    Admin,
    SuperAdmin,
}

/// Principal on whose behalf a domain operation runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: Cow<'static, str>,
    pub role: Role,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: Cow::Owned(id.into()),
            role,
        }
    }

    pub fn is_system(&self) -> bool {
        self == &SYSTEM_ACTOR
    }
}

/// Synthetic principal used by background jobs
pub const SYSTEM_ACTOR: Actor = Actor {
    id: Cow::Borrowed("system"),
    role: Role::SuperAdmin,
};

/// Failure reported by a domain service
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Rejected by business rules: {0}")]
    Rejected(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Upstream provider error: {0}")]
    Upstream(String),
}

pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

/// Export job state after a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportJob {
    pub id: String,
    pub tenant_id: String,
    pub status: String,
    pub row_count: Option<u64>,
}

/// Delivery summary of a notification send
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendResult {
    pub delivered: u32,
    pub failed: u32,
    pub channel: Option<NotificationChannel>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreAssessmentInput {
    pub tenant_id: String,
    pub assessment_id: String,
    pub options: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrecomputeForUserInput {
    pub tenant_id: String,
    pub user_id: String,
    pub options: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrecomputeForTenantInput {
    pub tenant_id: String,
    pub options: serde_json::Value,
}

/// Rows removed by a record retention purge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgeCounts {
    pub notifications: u64,
    pub export_jobs: u64,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ExportService: Send + Sync {
    /// Run the named export job to completion
    async fn run_export_job(
        &self,
        tenant_id: &str,
        export_job_id: &str,
        actor: &Actor,
    ) -> ServiceResult<ExportJob>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait NotificationService: Send + Sync {
    async fn send_by_template(
        &self,
        input: TemplateNotification,
        actor: &Actor,
    ) -> ServiceResult<SendResult>;

    async fn send_ad_hoc(&self, input: AdHocNotification, actor: &Actor)
        -> ServiceResult<SendResult>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ScoringService: Send + Sync {
    /// Compute and persist scores for one assessment
    async fn score_assessment(
        &self,
        input: ScoreAssessmentInput,
        actor: &Actor,
    ) -> ServiceResult<()>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait RecommendationService: Send + Sync {
    async fn precompute_for_user(
        &self,
        input: PrecomputeForUserInput,
        actor: &Actor,
    ) -> ServiceResult<()>;

    async fn precompute_for_tenant(
        &self,
        input: PrecomputeForTenantInput,
        actor: &Actor,
    ) -> ServiceResult<()>;
}

/// Deletion of stale failed records
///
/// Implementations delete both kinds in one transaction: either both
/// deletions are applied or neither is.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RecordRetention: Send + Sync {
    /// Remove failed notifications and failed export jobs of `tenant_id`
    /// created before `cutoff_millis`
    async fn purge_failed_records(
        &self,
        tenant_id: &str,
        cutoff_millis: i64,
        actor: &Actor,
    ) -> ServiceResult<PurgeCounts>;
}
