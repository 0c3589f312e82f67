use crate::entities::{
    EventKind, campaign_entity as campaigns, raw_event_entity as raw_events,
    submission_entity as submissions,
};
use crate::error::{AppError, AppResult};
use crate::models::{IncomingEvent, IngestBatchRequest, MAX_BATCH_EVENTS, SubmittedFields};
use crate::utils::is_valid_email;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryFilter,
    QueryOrder, Set,
};
use std::collections::HashMap;
use uuid::Uuid;

/// Hard cap check for one client batch; an oversize batch is rejected
/// wholesale before any row is written.
fn validate_batch_size(len: usize) -> AppResult<()> {
    if len > MAX_BATCH_EVENTS {
        return Err(AppError::ValidationError(format!(
            "Batch exceeds {MAX_BATCH_EVENTS} events"
        )));
    }
    Ok(())
}

/// 接入网关: 校验批次、解析 campaign、落地原始事件。
/// 处理成本保持 O(batch size), 任何重计算都留给异步批处理。
#[derive(Clone)]
pub struct IngestionService {
    pool: DatabaseConnection,
}

impl IngestionService {
    pub fn new(pool: DatabaseConnection) -> Self {
        Self { pool }
    }

    /// Validate and append one client batch; returns the number of accepted
    /// events. Events for unknown or inactive campaigns are stale widget
    /// noise and are dropped without failing the batch.
    pub async fn ingest_batch(
        &self,
        batch: IngestBatchRequest,
        session_id: &str,
    ) -> AppResult<usize> {
        validate_batch_size(batch.events.len())?;

        // 一次性解析本批次涉及的 campaign -> tenant 映射
        let mut campaign_ids: Vec<Uuid> = batch.events.iter().map(|e| e.campaign_id).collect();
        campaign_ids.sort_unstable();
        campaign_ids.dedup();

        let tenant_by_campaign: HashMap<Uuid, Uuid> = if campaign_ids.is_empty() {
            HashMap::new()
        } else {
            campaigns::Entity::find()
                .filter(campaigns::Column::Id.is_in(campaign_ids))
                .filter(campaigns::Column::IsActive.eq(true))
                .all(&self.pool)
                .await?
                .into_iter()
                .map(|c| (c.id, c.tenant_id))
                .collect()
        };

        let mut rows = Vec::with_capacity(batch.events.len());
        let mut dropped = 0usize;

        for event in &batch.events {
            let Some(&tenant_id) = tenant_by_campaign.get(&event.campaign_id) else {
                dropped += 1;
                continue;
            };

            rows.push(raw_events::ActiveModel {
                tenant_id: Set(tenant_id),
                campaign_id: Set(event.campaign_id),
                session_id: Set(session_id.to_string()),
                kind: Set(event.kind),
                occurred_at: Set(event.occurred_at()),
                payload: Set(event.data.clone()),
                aggregated: Set(false),
                processed: Set(false),
                ..Default::default()
            });

            // 表单提交同步建档, lead capture 不等异步管道
            if event.kind == EventKind::FormSubmit {
                self.upsert_submission(tenant_id, event, session_id).await?;
            }
        }

        let accepted = rows.len();
        if !rows.is_empty() {
            raw_events::Entity::insert_many(rows).exec(&self.pool).await?;
        }
        if dropped > 0 {
            log::debug!("Ingest batch dropped {dropped} events for unknown campaigns");
        }

        Ok(accepted)
    }

    /// One submission per (campaign, session); a repeat form_submit refreshes
    /// the contact fields but never touches an existing prize assignment.
    async fn upsert_submission(
        &self,
        tenant_id: Uuid,
        event: &IncomingEvent,
        session_id: &str,
    ) -> AppResult<()> {
        let fields = SubmittedFields::from_payload(event.data.as_ref());
        let email = fields.email.filter(|e| is_valid_email(e));

        let existing = submissions::Entity::find()
            .filter(submissions::Column::CampaignId.eq(event.campaign_id))
            .filter(submissions::Column::SessionId.eq(session_id))
            .order_by_desc(submissions::Column::CreatedAt)
            .one(&self.pool)
            .await?;

        match existing {
            Some(model) => {
                let mut am = model.into_active_model();
                if email.is_some() {
                    am.email = Set(email);
                }
                if fields.name.is_some() {
                    am.name = Set(fields.name);
                }
                am.consent = Set(fields.consent);
                am.form_data = Set(event.data.clone());
                am.updated_at = Set(Some(Utc::now()));
                am.update(&self.pool).await?;
            }
            None => {
                submissions::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    tenant_id: Set(tenant_id),
                    campaign_id: Set(event.campaign_id),
                    session_id: Set(session_id.to_string()),
                    email: Set(email),
                    name: Set(fields.name),
                    consent: Set(fields.consent),
                    form_data: Set(event.data.clone()),
                    ..Default::default()
                }
                .insert(&self.pool)
                .await?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_cap_boundary() {
        assert!(validate_batch_size(0).is_ok());
        assert!(validate_batch_size(MAX_BATCH_EVENTS).is_ok());
        assert!(matches!(
            validate_batch_size(MAX_BATCH_EVENTS + 1),
            Err(AppError::ValidationError(_))
        ));
    }
}
