use super::{HandlerError, HandlerResult, JobHandler};
use crate::domain::catalog::EXPORT_RUN;
use crate::domain::JobPayload;
use crate::port::{ExportService, SYSTEM_ACTOR};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

/// `export-run`: runs a previously created export job
pub struct ExportRunHandler {
    exports: Arc<dyn ExportService>,
}

impl ExportRunHandler {
    pub fn new(exports: Arc<dyn ExportService>) -> Self {
        Self { exports }
    }
}

#[async_trait]
impl JobHandler for ExportRunHandler {
    fn job_type(&self) -> &'static str {
        EXPORT_RUN
    }

    async fn handle(&self, payload: &JobPayload) -> HandlerResult<serde_json::Value> {
        let JobPayload::ExportRun(p) = payload else {
            return Err(HandlerError::wrong_variant(EXPORT_RUN, payload));
        };

        let export = self
            .exports
            .run_export_job(&p.tenant_id, &p.job_id, &SYSTEM_ACTOR)
            .await?;

        info!(
            tenant_id = %p.tenant_id,
            export_job_id = %export.id,
            status = %export.status,
            "Export finished"
        );

        Ok(json!({
            "exportJobId": export.id,
            "status": export.status,
            "rowCount": export.row_count,
        }))
    }
}
