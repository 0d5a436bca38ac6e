use super::{HandlerError, HandlerResult, JobHandler};
use crate::domain::catalog::NOTIFICATION_SEND;
use crate::domain::{JobPayload, NotificationSendPayload};
use crate::port::{NotificationService, SYSTEM_ACTOR};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// `notification-send`: template-based or ad-hoc, sent immediately
pub struct NotificationSendHandler {
    notifications: Arc<dyn NotificationService>,
}

impl NotificationSendHandler {
    pub fn new(notifications: Arc<dyn NotificationService>) -> Self {
        Self { notifications }
    }
}

#[async_trait]
impl JobHandler for NotificationSendHandler {
    fn job_type(&self) -> &'static str {
        NOTIFICATION_SEND
    }

    async fn handle(&self, payload: &JobPayload) -> HandlerResult<serde_json::Value> {
        let JobPayload::NotificationSend(p) = payload else {
            return Err(HandlerError::wrong_variant(NOTIFICATION_SEND, payload));
        };

        let (mode, sent) = match p {
            NotificationSendPayload::ByTemplate(input) => (
                "template",
                self.notifications
                    .send_by_template(input.clone(), &SYSTEM_ACTOR)
                    .await?,
            ),
            NotificationSendPayload::AdHoc(input) => (
                "adHoc",
                self.notifications
                    .send_ad_hoc(input.clone(), &SYSTEM_ACTOR)
                    .await?,
            ),
        };

        info!(
            tenant_id = %payload.tenant_id(),
            mode,
            delivered = sent.delivered,
            failed = sent.failed,
            "Notification sent"
        );

        Ok(serde_json::json!({
            "mode": mode,
            "delivered": sent.delivered,
            "failed": sent.failed,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AdHocNotification, NotificationChannel, TemplateNotification};
    use crate::port::domain_services::MockNotificationService;
    use crate::port::SendResult;
    use serde_json::json;

    #[tokio::test]
    async fn test_template_notification() {
        let mut notifications = MockNotificationService::new();
        notifications
            .expect_send_by_template()
            .withf(|input, actor| input.template_id == "welcome" && actor.is_system())
            .times(1)
            .returning(|_, _| {
                Ok(SendResult {
                    delivered: 3,
                    ..Default::default()
                })
            });
        notifications.expect_send_ad_hoc().never();

        let handler = NotificationSendHandler::new(Arc::new(notifications));
        let payload = JobPayload::NotificationSend(NotificationSendPayload::ByTemplate(
            TemplateNotification {
                tenant_id: "t1".to_string(),
                template_id: "welcome".to_string(),
                user_ids: Some(vec!["u1".into(), "u2".into(), "u3".into()]),
                audience_json: None,
                variables: None,
            },
        ));

        let result = handler.handle(&payload).await.unwrap();
        assert_eq!(result["mode"], "template");
        assert_eq!(result["delivered"], 3);
    }

    #[tokio::test]
    async fn test_ad_hoc_notification() {
        let mut notifications = MockNotificationService::new();
        notifications.expect_send_by_template().never();
        notifications
            .expect_send_ad_hoc()
            .withf(|input, _| input.channel == NotificationChannel::Sms && input.user_ids.len() == 1)
            .times(1)
            .returning(|input, _| {
                Ok(SendResult {
                    delivered: 1,
                    failed: 0,
                    channel: Some(input.channel),
                })
            });

        let handler = NotificationSendHandler::new(Arc::new(notifications));
        let payload = JobPayload::NotificationSend(NotificationSendPayload::AdHoc(
            AdHocNotification {
                tenant_id: "t1".to_string(),
                channel: NotificationChannel::Sms,
                user_ids: vec!["u1".to_string()],
                payload: json!({"body": "hello"}),
            },
        ));

        let result = handler.handle(&payload).await.unwrap();
        assert_eq!(result["mode"], "adHoc");
    }
}
