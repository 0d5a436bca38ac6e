// Job Payloads - one closed variant per job type

use crate::domain::catalog;
use crate::domain::error::{DomainError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Payload of a job, tagged by job type name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum JobPayload {
    #[serde(rename = "export-run")]
    ExportRun(ExportRunPayload),
    #[serde(rename = "notification-send")]
    NotificationSend(NotificationSendPayload),
    #[serde(rename = "scoring-run")]
    ScoringRun(ScoringRunPayload),
    #[serde(rename = "recommendation-precompute")]
    RecommendationPrecompute(RecommendationPrecomputePayload),
    #[serde(rename = "maintenance-cleanup")]
    MaintenanceCleanup(MaintenanceCleanupPayload),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRunPayload {
    pub tenant_id: String,
    pub job_id: String,
}

/// Notification payloads come in two shapes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NotificationSendPayload {
    ByTemplate(TemplateNotification),
    AdHoc(AdHocNotification),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateNotification {
    pub tenant_id: String,
    pub template_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audience_json: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<serde_json::Map<String, Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdHocNotification {
    pub tenant_id: String,
    pub channel: NotificationChannel,
    pub user_ids: Vec<String>,
    pub payload: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationChannel {
    Email,
    Sms,
    Push,
    InApp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoringRunPayload {
    pub tenant_id: String,
    pub assessment_id: String,
    #[serde(default)]
    pub options: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationPrecomputePayload {
    pub tenant_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub options: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceCleanupPayload {
    pub tenant_id: String,
    #[serde(default)]
    pub params: CleanupParams,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cleanup_before_days: Option<i64>,
}

impl CleanupParams {
    pub fn retention_days(&self) -> i64 {
        self.cleanup_before_days
            .unwrap_or(catalog::DEFAULT_CLEANUP_BEFORE_DAYS)
    }
}

impl JobPayload {
    /// Parse a producer-supplied JSON object for the named job type
    pub fn from_json(job_type: &str, data: Value) -> Result<Self> {
        let tagged = serde_json::json!({ "type": job_type, "data": data });
        let payload: JobPayload =
            serde_json::from_value(tagged).map_err(|e| DomainError::InvalidPayload {
                job_type: job_type.to_string(),
                reason: e.to_string(),
            })?;
        payload.validate()?;
        Ok(payload)
    }

    pub fn job_type(&self) -> &'static str {
        match self {
            JobPayload::ExportRun(_) => catalog::EXPORT_RUN,
            JobPayload::NotificationSend(_) => catalog::NOTIFICATION_SEND,
            JobPayload::ScoringRun(_) => catalog::SCORING_RUN,
            JobPayload::RecommendationPrecompute(_) => catalog::RECOMMENDATION_PRECOMPUTE,
            JobPayload::MaintenanceCleanup(_) => catalog::MAINTENANCE_CLEANUP,
        }
    }

    pub fn tenant_id(&self) -> &str {
        match self {
            JobPayload::ExportRun(p) => &p.tenant_id,
            JobPayload::NotificationSend(NotificationSendPayload::ByTemplate(p)) => &p.tenant_id,
            JobPayload::NotificationSend(NotificationSendPayload::AdHoc(p)) => &p.tenant_id,
            JobPayload::ScoringRun(p) => &p.tenant_id,
            JobPayload::RecommendationPrecompute(p) => &p.tenant_id,
            JobPayload::MaintenanceCleanup(p) => &p.tenant_id,
        }
    }

    /// Shape checks serde cannot express
    pub fn validate(&self) -> Result<()> {
        require_non_empty(self.job_type(), "tenantId", self.tenant_id())?;

        match self {
            JobPayload::ExportRun(p) => require_non_empty(self.job_type(), "jobId", &p.job_id),
            JobPayload::NotificationSend(NotificationSendPayload::ByTemplate(p)) => {
                require_non_empty(self.job_type(), "templateId", &p.template_id)
            }
            JobPayload::NotificationSend(NotificationSendPayload::AdHoc(p)) => {
                if p.user_ids.is_empty() {
                    return Err(invalid(self.job_type(), "userIds must not be empty"));
                }
                Ok(())
            }
            JobPayload::ScoringRun(p) => {
                require_non_empty(self.job_type(), "assessmentId", &p.assessment_id)
            }
            JobPayload::RecommendationPrecompute(p) => match &p.user_id {
                Some(user_id) => require_non_empty(self.job_type(), "userId", user_id),
                None => Ok(()),
            },
            JobPayload::MaintenanceCleanup(p) => {
                if p.params.retention_days() < 0 {
                    return Err(invalid(
                        self.job_type(),
                        "cleanupBeforeDays must not be negative",
                    ));
                }
                Ok(())
            }
        }
    }
}

fn invalid(job_type: &str, reason: &str) -> DomainError {
    DomainError::InvalidPayload {
        job_type: job_type.to_string(),
        reason: reason.to_string(),
    }
}

fn require_non_empty(job_type: &str, field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(invalid(job_type, &format!("{} must not be empty", field)));
    }
    Ok(())
}
