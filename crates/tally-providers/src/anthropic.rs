//! Anthropic Messages API provider.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tally_core::{
    context::{Completion, CompletionMetadata, Context},
    error::TallyError,
    traits::Provider,
};
use tracing::{debug, warn};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic Messages API provider.
pub struct AnthropicProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl AnthropicProvider {
    /// Create from config values.
    pub fn from_config(client: reqwest::Client, api_key: String, model: String) -> Self {
        Self {
            client,
            base_url: ANTHROPIC_API_URL.to_string(),
            api_key,
            model,
        }
    }

    /// Point at a different endpoint.
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }
}

#[derive(Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "String::is_empty")]
    system: String,
    messages: Vec<AnthropicMessage>,
}

#[derive(Serialize)]
struct AnthropicMessage {
    role: &'static str,
    content: Vec<ContentBlock>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text { text: String },
    Image { source: ImageSource },
}

#[derive(Serialize)]
struct ImageSource {
    #[serde(rename = "type")]
    kind: &'static str,
    media_type: String,
    data: String,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Option<Vec<AnthropicContentBlock>>,
    model: Option<String>,
    usage: Option<AnthropicUsage>,
}

#[derive(Deserialize)]
struct AnthropicContentBlock {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct AnthropicUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

fn build_request(context: &Context, model: &str) -> AnthropicRequest {
    let mut content = Vec::with_capacity(2);
    if let Some(image) = &context.image {
        content.push(ContentBlock::Image {
            source: ImageSource {
                kind: "base64",
                media_type: image.mime_type.clone(),
                data: STANDARD.encode(&image.data),
            },
        });
    }
    let mut text = context.user_message.clone();
    if context.json_output {
        text.push_str("\n\nRespond with a single JSON object only.");
    }
    content.push(ContentBlock::Text { text });

    AnthropicRequest {
        model: model.to_string(),
        max_tokens: 1024,
        system: context.system_prompt.clone(),
        messages: vec![AnthropicMessage {
            role: "user",
            content,
        }],
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn supports_vision(&self) -> bool {
        true
    }

    async fn complete(&self, context: &Context) -> Result<Completion, TallyError> {
        let effective_model = context.model.as_deref().unwrap_or(&self.model);
        let start = Instant::now();
        let body = build_request(context, effective_model);

        let url = format!("{}/messages", self.base_url);
        debug!("anthropic: POST {url} model={effective_model}");

        let resp = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| TallyError::Provider(format!("anthropic request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(TallyError::Provider(format!(
                "anthropic returned {status}: {text}"
            )));
        }

        let parsed: AnthropicResponse = resp.json().await.map_err(|e| {
            TallyError::Provider(format!("anthropic: failed to parse response: {e}"))
        })?;

        let text = parsed
            .content
            .as_ref()
            .map(|blocks| blocks.iter().map(|b| b.text.as_str()).collect::<String>())
            .unwrap_or_default();

        Ok(Completion {
            text,
            metadata: CompletionMetadata {
                provider_used: "anthropic".to_string(),
                tokens_used: parsed
                    .usage
                    .as_ref()
                    .map(|u| u.input_tokens + u.output_tokens),
                processing_time_ms: start.elapsed().as_millis() as u64,
                model: parsed.model,
            },
        })
    }

    async fn is_available(&self) -> bool {
        if self.api_key.is_empty() {
            warn!("anthropic: no API key configured");
            return false;
        }
        // No lightweight health endpoint; we trust the key is valid.
        true
    }
}
