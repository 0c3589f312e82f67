use crate::entities::{
    EventKind, integration_entity as integrations, raw_event_entity as raw_events,
    submission_entity as submissions,
};
use crate::error::AppResult;
use crate::models::{BatchOutcome, JobPayload, SubmittedFields};
use crate::services::{JobService, PrizeService};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, QuerySelect,
};
use serde_json::json;
use uuid::Uuid;

/// 管道编排器: 消费原始事件, 决定其隐含的领域动作并入队集成 job。
///
/// 副作用是 at-most-once: 单个事件的处理抛错只记日志并照常置位
/// processed, 不阻塞整批 (用整体可用性换重放)。
#[derive(Clone)]
pub struct OrchestratorService {
    pool: DatabaseConnection,
    prize_service: PrizeService,
    job_service: JobService,
    batch_size: u64,
    max_batches: u32,
}

impl OrchestratorService {
    pub fn new(
        pool: DatabaseConnection,
        prize_service: PrizeService,
        job_service: JobService,
        batch_size: u64,
        max_batches: u32,
    ) -> Self {
        Self {
            pool,
            prize_service,
            job_service,
            batch_size,
            max_batches,
        }
    }

    /// One pass over at most `batch_size` unorchestrated events in timestamp
    /// order. Every event ends up marked processed exactly once, whether its
    /// handler succeeded or not.
    pub async fn run_once(&self) -> AppResult<BatchOutcome> {
        let events = raw_events::Entity::find()
            .filter(raw_events::Column::Processed.eq(false))
            .order_by_asc(raw_events::Column::OccurredAt)
            .limit(self.batch_size)
            .all(&self.pool)
            .await?;

        if events.is_empty() {
            return Ok(BatchOutcome::default());
        }

        let mut outcome = BatchOutcome::default();
        for event in &events {
            match self.process_event(event).await {
                Ok(()) => outcome.processed += 1,
                Err(e) => {
                    log::error!(
                        "Orchestration failed for event {} ({}): {e:?}; skipping",
                        event.id,
                        event.kind
                    );
                    outcome.failed += 1;
                }
            }
            // 成败都推进游标, 失败事件不会卡住后续批次
            raw_events::Entity::update_many()
                .col_expr(raw_events::Column::Processed, Expr::value(true))
                .filter(raw_events::Column::Id.eq(event.id))
                .exec(&self.pool)
                .await?;
        }

        Ok(outcome)
    }

    pub async fn drain(&self) -> AppResult<BatchOutcome> {
        let mut outcome = BatchOutcome::default();
        for _ in 0..self.max_batches {
            let batch = self.run_once().await?;
            let advanced = batch.processed + batch.failed > 0;
            outcome.merge(batch);
            if !advanced {
                break;
            }
        }
        Ok(outcome)
    }

    /// Map one event onto integration jobs (and, for game_finish, a prize
    /// draw). Campaign-scoped and tenant-wide integrations both apply.
    pub async fn process_event(&self, event: &raw_events::Model) -> AppResult<()> {
        let active = integrations::Entity::find()
            .filter(integrations::Column::TenantId.eq(event.tenant_id))
            .filter(integrations::Column::IsActive.eq(true))
            .filter(
                Condition::any()
                    .add(integrations::Column::CampaignId.is_null())
                    .add(integrations::Column::CampaignId.eq(event.campaign_id)),
            )
            .all(&self.pool)
            .await?;

        let contact_capable: Vec<&integrations::Model> = active
            .iter()
            .filter(|i| i.kind.is_contact_capable())
            .collect();

        match event.kind {
            EventKind::FormSubmit => {
                let fields = SubmittedFields::from_payload(event.payload.as_ref());
                if let Some(email) = fields.email {
                    for integration in &contact_capable {
                        self.job_service
                            .enqueue(
                                integration.id,
                                JobPayload::SyncContact {
                                    campaign_id: event.campaign_id,
                                    email: email.clone(),
                                    name: fields.name.clone(),
                                    consent: fields.consent,
                                    fields: event.payload.clone(),
                                    submitted_at: event.occurred_at,
                                },
                            )
                            .await?;
                        self.job_service
                            .enqueue(
                                integration.id,
                                JobPayload::AddTag {
                                    campaign_id: event.campaign_id,
                                    email: email.clone(),
                                    tag: campaign_tag(event.campaign_id),
                                },
                            )
                            .await?;
                    }
                } else {
                    log::debug!("form_submit event {} has no usable email", event.id);
                }
            }
            EventKind::GameFinish => {
                self.handle_game_finish(event, &contact_capable).await?;
            }
            EventKind::PrizeAwarded => {
                if let Some(email) = self.session_email(event).await? {
                    let properties = event.payload.clone().unwrap_or_else(|| json!({}));
                    for integration in &contact_capable {
                        self.job_service
                            .enqueue(
                                integration.id,
                                JobPayload::SendEvent {
                                    email: email.clone(),
                                    event: "Prize Awarded".to_string(),
                                    properties: properties.clone(),
                                },
                            )
                            .await?;
                    }
                }
            }
            EventKind::CtaClick => {
                if let Some(email) = self.session_email(event).await? {
                    let properties = json!({
                        "url": event.payload.as_ref().and_then(|p| p.get("url")).cloned(),
                        "label": event.payload.as_ref().and_then(|p| p.get("label")).cloned(),
                    });
                    for integration in &contact_capable {
                        self.job_service
                            .enqueue(
                                integration.id,
                                JobPayload::SendEvent {
                                    email: email.clone(),
                                    event: "CTA Clicked".to_string(),
                                    properties: properties.clone(),
                                },
                            )
                            .await?;
                    }
                }
            }
            EventKind::Impression | EventKind::Open | EventKind::GameStart => {}
        }

        // 所有事件不分类型镜像给每个 webhook 集成
        for integration in active.iter().filter(|i| !i.kind.is_contact_capable()) {
            self.job_service
                .enqueue(
                    integration.id,
                    JobPayload::WebhookDelivery {
                        event: event.kind.to_string(),
                        body: webhook_body(event),
                    },
                )
                .await?;
        }

        Ok(())
    }

    /// game_finish: the session's most recent prize-less submission gets a
    /// draw; a win with a known contact email notifies the ESPs.
    async fn handle_game_finish(
        &self,
        event: &raw_events::Model,
        contact_capable: &[&integrations::Model],
    ) -> AppResult<()> {
        let submission = submissions::Entity::find()
            .filter(submissions::Column::CampaignId.eq(event.campaign_id))
            .filter(submissions::Column::SessionId.eq(event.session_id.clone()))
            .filter(submissions::Column::PrizeName.is_null())
            .order_by_desc(submissions::Column::CreatedAt)
            .one(&self.pool)
            .await?;

        let Some(submission) = submission else {
            return Ok(());
        };

        let draw = self
            .prize_service
            .assign_prize_to_submission(submission.id, event.campaign_id)
            .await?;

        if let (Some(draw), Some(email)) = (draw, submission.email) {
            for integration in contact_capable {
                self.job_service
                    .enqueue(
                        integration.id,
                        JobPayload::SendEvent {
                            email: email.clone(),
                            event: "Prize Won".to_string(),
                            properties: json!({
                                "prizeName": draw.name,
                                "couponCode": draw.code,
                                "isConsolation": draw.is_consolation,
                            }),
                        },
                    )
                    .await?;
            }
        }

        Ok(())
    }

    async fn session_email(&self, event: &raw_events::Model) -> AppResult<Option<String>> {
        let submission = submissions::Entity::find()
            .filter(submissions::Column::CampaignId.eq(event.campaign_id))
            .filter(submissions::Column::SessionId.eq(event.session_id.clone()))
            .filter(submissions::Column::Email.is_not_null())
            .order_by_desc(submissions::Column::CreatedAt)
            .one(&self.pool)
            .await?;
        Ok(submission.and_then(|s| s.email))
    }
}

/// Campaign-scoped contact tag.
pub fn campaign_tag(campaign_id: Uuid) -> String {
    format!("campaign:{campaign_id}")
}

/// Outbound mirror of one raw event for webhook delivery.
pub fn webhook_body(event: &raw_events::Model) -> serde_json::Value {
    json!({
        "id": event.id,
        "type": event.kind,
        "tenantId": event.tenant_id,
        "campaignId": event.campaign_id,
        "sessionId": event.session_id,
        "timestamp": event.occurred_at.timestamp_millis(),
        "data": event.payload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_webhook_body_mirrors_event() {
        let campaign = Uuid::new_v4();
        let event = raw_events::Model {
            id: 42,
            tenant_id: Uuid::nil(),
            campaign_id: campaign,
            session_id: "sess-1".into(),
            kind: EventKind::CtaClick,
            occurred_at: chrono::Utc.with_ymd_and_hms(2026, 8, 30, 12, 0, 0).unwrap(),
            payload: Some(json!({"url": "https://example.com"})),
            aggregated: false,
            processed: false,
            created_at: None,
        };

        let body = webhook_body(&event);
        assert_eq!(body["type"], "cta_click");
        assert_eq!(body["sessionId"], "sess-1");
        assert_eq!(body["data"]["url"], "https://example.com");
        assert_eq!(body["timestamp"], event.occurred_at.timestamp_millis());
    }

    #[test]
    fn test_campaign_tag_shape() {
        let id = Uuid::nil();
        assert_eq!(campaign_tag(id), format!("campaign:{id}"));
    }
}
