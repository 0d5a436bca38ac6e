use super::{HandlerError, HandlerResult, JobHandler};
use crate::domain::catalog::SCORING_RUN;
use crate::domain::JobPayload;
use crate::port::{ScoreAssessmentInput, ScoringService, SYSTEM_ACTOR};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

pub struct ScoringRunHandler {
    scoring: Arc<dyn ScoringService>,
}

impl ScoringRunHandler {
    pub fn new(scoring: Arc<dyn ScoringService>) -> Self {
        Self { scoring }
    }
}

#[async_trait]
impl JobHandler for ScoringRunHandler {
    fn job_type(&self) -> &'static str {
        SCORING_RUN
    }

    async fn handle(&self, payload: &JobPayload) -> HandlerResult<serde_json::Value> {
        let JobPayload::ScoringRun(p) = payload else {
            return Err(HandlerError::wrong_variant(SCORING_RUN, payload));
        };

        self.scoring
            .score_assessment(
                ScoreAssessmentInput {
                    tenant_id: p.tenant_id.clone(),
                    assessment_id: p.assessment_id.clone(),
                    options: p.options.clone(),
                },
                &SYSTEM_ACTOR,
            )
            .await?;

        Ok(json!({ "assessmentId": p.assessment_id }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ScoringRunPayload;
    use crate::port::domain_services::MockScoringService;
    use crate::port::ServiceError;

    #[tokio::test]
    async fn test_scores_assessment() {
        let mut scoring = MockScoringService::new();
        scoring
            .expect_score_assessment()
            .withf(|input, actor| {
                input.assessment_id == "a1" && input.options["recompute"] == true && actor.is_system()
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let handler = ScoringRunHandler::new(Arc::new(scoring));
        let result = handler
            .handle(&JobPayload::ScoringRun(ScoringRunPayload {
                tenant_id: "t1".to_string(),
                assessment_id: "a1".to_string(),
                options: json!({"recompute": true}),
            }))
            .await
            .unwrap();

        assert_eq!(result["assessmentId"], "a1");
    }

    #[tokio::test]
    async fn test_not_found_is_reported() {
        let mut scoring = MockScoringService::new();
        scoring
            .expect_score_assessment()
            .returning(|_, _| Err(ServiceError::NotFound("assessment a1".to_string())));

        let handler = ScoringRunHandler::new(Arc::new(scoring));
        let err = handler
            .handle(&JobPayload::ScoringRun(ScoringRunPayload {
                tenant_id: "t1".to_string(),
                assessment_id: "a1".to_string(),
                options: serde_json::Value::Null,
            }))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            HandlerError::Service(ServiceError::NotFound("assessment a1".to_string()))
        );
    }
}
