//! Evolution API gateway client.
//!
//! Outbound text goes to `POST {base}/message/sendText/{instance}`. The same
//! gateway can hand back decrypted media as base64 when direct download fails.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tally_core::{
    config::GatewayConfig, error::TallyError, message::OutgoingMessage, traits::ReplySender,
};
use tracing::{debug, warn};

/// HTTP client bound to one gateway instance.
pub struct EvolutionClient {
    client: reqwest::Client,
    base_url: String,
    instance: String,
    api_key: String,
}

#[derive(Deserialize)]
struct Base64Response {
    base64: Option<String>,
}

impl EvolutionClient {
    pub fn new(config: &GatewayConfig, timeout: Duration) -> Result<Self, TallyError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TallyError::Channel(format!("gateway client build failed: {e}")))?;
        Ok(Self::with_client(client, config))
    }

    pub fn with_client(client: reqwest::Client, config: &GatewayConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            instance: config.instance.clone(),
            api_key: config.api_key.clone(),
        }
    }

    /// Whether an instance name and key are set.
    pub fn is_configured(&self) -> bool {
        !self.instance.is_empty() && !self.api_key.is_empty()
    }

    /// Ask the gateway to download and decrypt the media of `message_id`.
    pub async fn media_base64(&self, message_id: &str) -> Result<Vec<u8>, TallyError> {
        let url = format!(
            "{}/chat/getBase64FromMediaMessage/{}",
            self.base_url, self.instance
        );
        let body = json!({
            "message": { "key": { "id": message_id } },
            "convertToMp4": false,
        });

        let resp = self
            .client
            .post(&url)
            .header("apikey", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| TallyError::Channel(format!("gateway media request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(TallyError::Channel(format!(
                "gateway media error {status}: {text}"
            )));
        }

        let parsed: Base64Response = resp
            .json()
            .await
            .map_err(|e| TallyError::Channel(format!("gateway media parse failed: {e}")))?;

        let encoded = parsed
            .base64
            .filter(|b| !b.is_empty())
            .ok_or_else(|| TallyError::Channel("gateway returned no media".into()))?;

        // Some gateway builds prefix a data URI.
        let encoded = encoded
            .split_once(";base64,")
            .map(|(_, data)| data)
            .unwrap_or(&encoded);

        STANDARD
            .decode(encoded.trim())
            .map_err(|e| TallyError::Channel(format!("gateway media base64 invalid: {e}")))
    }
}

#[async_trait]
impl ReplySender for EvolutionClient {
    async fn send_text(&self, message: &OutgoingMessage) -> Result<(), TallyError> {
        let url = format!("{}/message/sendText/{}", self.base_url, self.instance);
        debug!("gateway: sending {} chars to {}", message.text.len(), message.number);

        let resp = self
            .client
            .post(&url)
            .header("apikey", &self.api_key)
            .json(message)
            .send()
            .await
            .map_err(|e| TallyError::ReplyDelivery(format!("gateway send failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            warn!("gateway: sendText returned {status}");
            return Err(TallyError::ReplyDelivery(format!(
                "gateway send error {status}: {text}"
            )));
        }
        Ok(())
    }
}
