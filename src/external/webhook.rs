use crate::config::OutboundConfig;
use crate::entities::integration_entity as integrations;
use crate::error::{AppError, AppResult};
use crate::utils::sign_payload;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

/// Config JSON shape for `kind = webhook` integrations.
#[derive(Debug, Deserialize)]
pub struct WebhookConfig {
    pub url: String,
    pub secret: String,
}

pub const SIGNATURE_HEADER: &str = "X-Integration-Signature";
pub const EVENT_HEADER: &str = "X-Integration-Event";

#[derive(Clone)]
pub struct WebhookClient {
    client: Client,
}

impl WebhookClient {
    pub fn new(config: &OutboundConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();
        Self { client }
    }

    /// POST the raw event payload to the configured endpoint, signed with the
    /// integration's shared secret. Anything other than 2xx is an error and
    /// the caller (job dispatcher) treats it as retryable; a timeout
    /// surfaces as a reqwest error the same way.
    pub async fn deliver(
        &self,
        integration: &integrations::Model,
        event: &str,
        body: &serde_json::Value,
    ) -> AppResult<()> {
        let cfg: WebhookConfig =
            serde_json::from_value(integration.config.clone()).map_err(|e| {
                AppError::ExternalApiError(format!(
                    "Webhook integration {} has invalid config: {e}",
                    integration.id
                ))
            })?;

        // 签名必须针对将要发送的字节计算, 不能重新序列化
        let raw = serde_json::to_vec(body)?;
        let signature = sign_payload(&cfg.secret, &raw);

        let response = self
            .client
            .post(&cfg.url)
            .header("Content-Type", "application/json")
            .header(SIGNATURE_HEADER, signature)
            .header(EVENT_HEADER, event)
            .body(raw)
            .send()
            .await?;

        if response.status().is_success() {
            log::debug!(
                "Webhook delivered: integration={} event={event}",
                integration.id
            );
            Ok(())
        } else {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            Err(AppError::ExternalApiError(format!(
                "Webhook delivery failed with {status}: {error_text}"
            )))
        }
    }
}
