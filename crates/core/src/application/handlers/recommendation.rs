use super::{HandlerError, HandlerResult, JobHandler};
use crate::domain::catalog::RECOMMENDATION_PRECOMPUTE;
use crate::domain::JobPayload;
use crate::port::{
    PrecomputeForTenantInput, PrecomputeForUserInput, RecommendationService, SYSTEM_ACTOR,
};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

/// `recommendation-precompute`: one user when `userId` is set, else the whole tenant
pub struct RecommendationPrecomputeHandler {
    recommendations: Arc<dyn RecommendationService>,
}

impl RecommendationPrecomputeHandler {
    pub fn new(recommendations: Arc<dyn RecommendationService>) -> Self {
        Self { recommendations }
    }
}

#[async_trait]
impl JobHandler for RecommendationPrecomputeHandler {
    fn job_type(&self) -> &'static str {
        RECOMMENDATION_PRECOMPUTE
    }

    async fn handle(&self, payload: &JobPayload) -> HandlerResult<serde_json::Value> {
        let JobPayload::RecommendationPrecompute(p) = payload else {
            return Err(HandlerError::wrong_variant(RECOMMENDATION_PRECOMPUTE, payload));
        };

        match &p.user_id {
            Some(user_id) => {
                self.recommendations
                    .precompute_for_user(
                        PrecomputeForUserInput {
                            tenant_id: p.tenant_id.clone(),
                            user_id: user_id.clone(),
                            options: p.options.clone(),
                        },
                        &SYSTEM_ACTOR,
                    )
                    .await?;
                Ok(json!({ "scope": "user", "userId": user_id }))
            }
            None => {
                self.recommendations
                    .precompute_for_tenant(
                        PrecomputeForTenantInput {
                            tenant_id: p.tenant_id.clone(),
                            options: p.options.clone(),
                        },
                        &SYSTEM_ACTOR,
                    )
                    .await?;
                Ok(json!({ "scope": "tenant" }))
            }
        }
    }
}
