use crate::entities::EventKind;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Hard cap on one ingestion batch; larger batches are rejected wholesale.
pub const MAX_BATCH_EVENTS: usize = 100;

#[derive(Debug, Deserialize, ToSchema)]
pub struct IngestBatchRequest {
    pub events: Vec<IncomingEvent>,
}

/// One widget-reported event. An unknown `type` string fails serde and
/// therefore rejects the whole batch (schema error, not noise).
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IncomingEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub campaign_id: Uuid,
    /// Client clock, epoch milliseconds
    pub timestamp: i64,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

impl IncomingEvent {
    /// 客户端时间戳解析失败时回退为服务端当前时间
    pub fn occurred_at(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.timestamp)
            .single()
            .unwrap_or_else(Utc::now)
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct IngestResponse {
    pub success: bool,
    /// Accepted events; silently dropped unknown-campaign events are not counted
    pub count: usize,
}

/// Contact fields pulled out of a form_submit payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubmittedFields {
    pub email: Option<String>,
    pub name: Option<String>,
    pub consent: bool,
}

impl SubmittedFields {
    pub fn from_payload(payload: Option<&serde_json::Value>) -> Self {
        let Some(data) = payload else {
            return Self::default();
        };
        Self {
            email: data
                .get("email")
                .and_then(|v| v.as_str())
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty()),
            name: data
                .get("name")
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .filter(|s| !s.is_empty()),
            consent: data
                .get("consent")
                .and_then(|v| v.as_bool())
                .unwrap_or(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_kind_parses_from_wire_names() {
        let raw = json!({
            "type": "game_finish",
            "campaignId": "7b4a0bb4-9c2e-4a6b-9a58-0f6e9a3a2d11",
            "timestamp": 1724949000000i64
        });
        let ev: IncomingEvent = serde_json::from_value(raw).unwrap();
        assert_eq!(ev.kind, EventKind::GameFinish);
        assert_eq!(ev.occurred_at().timestamp_millis(), 1724949000000);
    }

    #[test]
    fn test_unknown_event_kind_is_a_schema_error() {
        let raw = json!({
            "type": "teleport",
            "campaignId": "7b4a0bb4-9c2e-4a6b-9a58-0f6e9a3a2d11",
            "timestamp": 0
        });
        assert!(serde_json::from_value::<IncomingEvent>(raw).is_err());
    }

    #[test]
    fn test_submitted_fields_normalizes_email() {
        let data = json!({"email": "  Jane@Example.COM ", "name": "Jane", "consent": true});
        let fields = SubmittedFields::from_payload(Some(&data));
        assert_eq!(fields.email.as_deref(), Some("jane@example.com"));
        assert_eq!(fields.name.as_deref(), Some("Jane"));
        assert!(fields.consent);
    }

    #[test]
    fn test_submitted_fields_empty_payload() {
        let fields = SubmittedFields::from_payload(None);
        assert!(fields.email.is_none());
        assert!(!fields.consent);
    }
}
