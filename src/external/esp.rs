use crate::config::OutboundConfig;
use crate::entities::{IntegrationKind, integration_entity as integrations};
use crate::error::{AppError, AppResult};
use crate::models::JobPayload;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

/// Config JSON shape for ESP/CRM integrations (`kind = mailchimp | brevo`).
#[derive(Debug, Deserialize)]
pub struct EspConfig {
    pub api_key: String,
    /// Mailchimp audience id / Brevo list id
    pub list_id: Option<String>,
    /// Override for tests; derived from the api key (Mailchimp) or the
    /// provider default (Brevo) when absent
    pub base_url: Option<String>,
}

impl EspConfig {
    /// Mailchimp keys carry their datacenter as a suffix ("...-us21").
    fn mailchimp_base(&self) -> String {
        if let Some(base) = &self.base_url {
            return base.clone();
        }
        let dc = self.api_key.rsplit('-').next().unwrap_or("us1");
        format!("https://{dc}.api.mailchimp.com/3.0")
    }

    fn brevo_base(&self) -> String {
        self.base_url
            .clone()
            .unwrap_or_else(|| "https://api.brevo.com".to_string())
    }
}

/// Routes contact sync / tagging / custom events to the provider behind an
/// integration. Webhook jobs never reach this client.
#[derive(Clone)]
pub struct EspClient {
    client: Client,
}

impl EspClient {
    pub fn new(config: &OutboundConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();
        Self { client }
    }

    pub async fn execute(
        &self,
        integration: &integrations::Model,
        payload: &JobPayload,
    ) -> AppResult<()> {
        let cfg: EspConfig = serde_json::from_value(integration.config.clone()).map_err(|e| {
            AppError::ExternalApiError(format!(
                "ESP integration {} has invalid config: {e}",
                integration.id
            ))
        })?;

        match integration.kind {
            IntegrationKind::Mailchimp => self.execute_mailchimp(&cfg, payload).await,
            IntegrationKind::Brevo => self.execute_brevo(&cfg, payload).await,
            IntegrationKind::Webhook => Err(AppError::InternalError(format!(
                "Webhook integration {} routed to ESP client",
                integration.id
            ))),
        }
    }

    async fn execute_mailchimp(&self, cfg: &EspConfig, payload: &JobPayload) -> AppResult<()> {
        let base = cfg.mailchimp_base();
        let list_id = cfg.list_id.as_deref().ok_or_else(|| {
            AppError::ExternalApiError("Mailchimp integration missing list_id".to_string())
        })?;

        let response = match payload {
            JobPayload::SyncContact {
                email,
                name,
                consent,
                ..
            } => {
                let hash = member_hash(email);
                let status = if *consent { "subscribed" } else { "unsubscribed" };
                self.client
                    .put(format!("{base}/lists/{list_id}/members/{hash}"))
                    .basic_auth("anystring", Some(&cfg.api_key))
                    .json(&json!({
                        "email_address": email,
                        "status_if_new": status,
                        "merge_fields": { "FNAME": name.clone().unwrap_or_default() },
                    }))
                    .send()
                    .await?
            }
            JobPayload::AddTag { email, tag, .. } => {
                let hash = member_hash(email);
                self.client
                    .post(format!("{base}/lists/{list_id}/members/{hash}/tags"))
                    .basic_auth("anystring", Some(&cfg.api_key))
                    .json(&json!({ "tags": [{ "name": tag, "status": "active" }] }))
                    .send()
                    .await?
            }
            JobPayload::SendEvent {
                email,
                event,
                properties,
            } => {
                let hash = member_hash(email);
                self.client
                    .post(format!("{base}/lists/{list_id}/members/{hash}/events"))
                    .basic_auth("anystring", Some(&cfg.api_key))
                    .json(&json!({ "name": event, "properties": properties }))
                    .send()
                    .await?
            }
            JobPayload::WebhookDelivery { .. } => {
                return Err(AppError::InternalError(
                    "Webhook payload routed to Mailchimp".to_string(),
                ));
            }
        };

        check_provider_response("Mailchimp", response).await
    }

    async fn execute_brevo(&self, cfg: &EspConfig, payload: &JobPayload) -> AppResult<()> {
        let base = cfg.brevo_base();

        let response = match payload {
            JobPayload::SyncContact { email, name, .. } => {
                let mut body = json!({
                    "email": email,
                    "updateEnabled": true,
                    "attributes": { "FIRSTNAME": name.clone().unwrap_or_default() },
                });
                if let Some(list) = cfg.list_id.as_deref().and_then(|l| l.parse::<i64>().ok()) {
                    body["listIds"] = json!([list]);
                }
                self.client
                    .post(format!("{base}/v3/contacts"))
                    .header("api-key", &cfg.api_key)
                    .json(&body)
                    .send()
                    .await?
            }
            JobPayload::AddTag { email, tag, .. } => {
                // Brevo 没有独立的 tag 端点, 以 updateEnabled upsert 写入 TAG 属性
                self.client
                    .post(format!("{base}/v3/contacts"))
                    .header("api-key", &cfg.api_key)
                    .json(&json!({
                        "email": email,
                        "updateEnabled": true,
                        "attributes": { "LAST_TAG": tag },
                    }))
                    .send()
                    .await?
            }
            JobPayload::SendEvent {
                email,
                event,
                properties,
            } => {
                self.client
                    .post(format!("{base}/v3/events"))
                    .header("api-key", &cfg.api_key)
                    .json(&json!({
                        "event_name": event,
                        "identifiers": { "email_id": email },
                        "event_properties": properties,
                    }))
                    .send()
                    .await?
            }
            JobPayload::WebhookDelivery { .. } => {
                return Err(AppError::InternalError(
                    "Webhook payload routed to Brevo".to_string(),
                ));
            }
        };

        check_provider_response("Brevo", response).await
    }
}

/// Mailchimp addresses members by the md5 of the lowercased email.
fn member_hash(email: &str) -> String {
    format!("{:x}", md5::compute(email.trim().to_lowercase()))
}

async fn check_provider_response(provider: &str, response: reqwest::Response) -> AppResult<()> {
    if response.status().is_success() {
        return Ok(());
    }
    let status = response.status();
    let error_text = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    Err(AppError::ExternalApiError(format!(
        "{provider} request failed with {status}: {error_text}"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member_hash_is_case_insensitive() {
        assert_eq!(member_hash("Jane@Example.com "), member_hash("jane@example.com"));
    }

    #[test]
    fn test_mailchimp_base_derived_from_key_suffix() {
        let cfg = EspConfig {
            api_key: "abc123-us21".into(),
            list_id: Some("l1".into()),
            base_url: None,
        };
        assert_eq!(cfg.mailchimp_base(), "https://us21.api.mailchimp.com/3.0");
    }
}
