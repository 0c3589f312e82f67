use crate::entities::{JobStatus, integration_job_entity as jobs};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Side-effect payload, one variant per job type. Stored as tagged JSON on
/// the job row and dispatched by matching the tag; the tag doubles as the
/// row's `job_type` column for operator queries.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobPayload {
    /// Mirror a raw event to a signed webhook endpoint
    WebhookDelivery {
        event: String,
        body: serde_json::Value,
    },
    /// Upsert a contact into an ESP/CRM audience
    SyncContact {
        campaign_id: Uuid,
        email: String,
        name: Option<String>,
        consent: bool,
        fields: Option<serde_json::Value>,
        submitted_at: DateTime<Utc>,
    },
    /// Tag a contact with a campaign-scoped label
    AddTag {
        campaign_id: Uuid,
        email: String,
        tag: String,
    },
    /// Send a named custom event about a contact
    SendEvent {
        email: String,
        event: String,
        properties: serde_json::Value,
    },
}

impl JobPayload {
    pub fn job_type(&self) -> &'static str {
        match self {
            JobPayload::WebhookDelivery { .. } => "webhook_delivery",
            JobPayload::SyncContact { .. } => "sync_contact",
            JobPayload::AddTag { .. } => "add_tag",
            JobPayload::SendEvent { .. } => "send_event",
        }
    }
}

/// Operator-facing job log entry; the raw payload stays out of the listing.
#[derive(Debug, Serialize, ToSchema)]
pub struct JobView {
    pub id: i64,
    pub integration_id: Uuid,
    pub job_type: String,
    pub status: JobStatus,
    pub attempts: i32,
    pub max_attempts: i32,
    pub scheduled_for: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl From<jobs::Model> for JobView {
    fn from(m: jobs::Model) -> Self {
        Self {
            id: m.id,
            integration_id: m.integration_id,
            job_type: m.job_type,
            status: m.status,
            attempts: m.attempts,
            max_attempts: m.max_attempts,
            scheduled_for: m.scheduled_for,
            completed_at: m.completed_at,
            last_error: m.last_error,
            created_at: m.created_at,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct JobLogQuery {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
    /// pending / running / retrying / completed / failed
    pub status: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_tag_round_trip() {
        let payload = JobPayload::AddTag {
            campaign_id: Uuid::nil(),
            email: "jane@example.com".into(),
            tag: "campaign:summer-spin".into(),
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["type"], "add_tag");
        assert_eq!(payload.job_type(), "add_tag");

        let back: JobPayload = serde_json::from_value(value).unwrap();
        assert!(matches!(back, JobPayload::AddTag { .. }));
    }

    #[test]
    fn test_unknown_tag_is_rejected() {
        let raw = json!({"type": "launch_rocket", "email": "x@y.z"});
        assert!(serde_json::from_value::<JobPayload>(raw).is_err());
    }
}
