//! OpenAI-compatible API provider.
//!
//! Works with OpenAI's API and any compatible endpoint. Images are sent as
//! `image_url` parts carrying a base64 data URI.

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

/// OpenAI-compatible provider.
pub struct OpenAiProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiProvider {
    /// Create from config values.
    pub fn from_config(
        client: reqwest::Client,
        base_url: String,
        api_key: String,
        model: String,
    ) -> Self {
        Self {
            client,
            base_url,
            api_key,
            model,
        }
    }
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: MessageContent,
}

#[derive(Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Option<Vec<ChatChoice>>,
    model: Option<String>,
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: Option<ChoiceMessage>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatUsage {
    total_tokens: Option<u64>,
}

fn build_request(context: &Context, model: &str) -> ChatCompletionRequest {
    let mut messages = Vec::with_capacity(2);
    if !context.system_prompt.is_empty() {
        messages.push(ChatMessage {
            role: "system",
            content: MessageContent::Text(context.system_prompt.clone()),
        });
    }

    let user_content = match &context.image {
        Some(image) => {
            let mut parts = Vec::with_capacity(2);
            if !context.user_message.is_empty() {
                parts.push(ContentPart::Text {
                    text: context.user_message.clone(),
                });
            }
            parts.push(ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: format!(
                        "data:{};base64,{}",
                        image.mime_type,
                        STANDARD.encode(&image.data)
                    ),
                },
            });
            MessageContent::Parts(parts)
        }
        None => MessageContent::Text(context.user_message.clone()),
    };
    messages.push(ChatMessage {
        role: "user",
        content: user_content,
    });

    ChatCompletionRequest {
        model: model.to_string(),
        messages,
        temperature: 0.0,
        response_format: context
            .json_output
            .then_some(ResponseFormat { kind: "json_object" }),
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn supports_vision(&self) -> bool {
        true
    }

    async fn complete(&self, context: &Context) -> Result<Completion, TallyError> {
        let effective_model = context.model.as_deref().unwrap_or(&self.model);
        let start = Instant::now();

        let body = build_request(context, effective_model);
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        debug!("openai: POST {url} model={effective_model}");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| TallyError::Provider(format!("openai request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(TallyError::Provider(format!(
                "openai returned {status}: {text}"
            )));
        }

        let parsed: ChatCompletionResponse = resp
            .json()
            .await
            .map_err(|e| TallyError::Provider(format!("openai: failed to parse response: {e}")))?;

        let text = parsed
            .choices
            .as_ref()
            .and_then(|c| c.first())
            .and_then(|c| c.message.as_ref())
            .and_then(|m| m.content.clone())
            .unwrap_or_default();

        Ok(Completion {
            text,
            metadata: CompletionMetadata {
                provider_used: "openai".to_string(),
                tokens_used: parsed.usage.as_ref().and_then(|u| u.total_tokens),
                processing_time_ms: start.elapsed().as_millis() as u64,
                model: parsed.model,
            },
        })
    }

    async fn is_available(&self) -> bool {
        if self.api_key.is_empty() {
            warn!("openai: no API key configured");
            return false;
        }
        let url = format!("{}/models", self.base_url.trim_end_matches('/'));
        match self.client.get(&url).bearer_auth(&self.api_key).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                warn!("openai not available: {e}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(base_url: &str) -> OpenAiProvider {
        OpenAiProvider::from_config(
            reqwest::Client::new(),
            base_url.to_string(),
            "sk-test".into(),
            "gpt-4o-mini".into(),
        )
    }

    #[test]
    fn test_text_request_shape() {
        let ctx = Context::new("classify", "spent 50 on lunch");
        let json = serde_json::to_value(build_request(&ctx, "gpt-4o-mini")).unwrap();
        assert_eq!(json["model"], "gpt-4o-mini");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "spent 50 on lunch");
        assert_eq!(json["response_format"]["type"], "json_object");
        assert_eq!(json["temperature"], 0.0);
    }

    #[test]
    fn test_image_request_uses_data_uri_part() {
        let ctx = Context::new("read receipt", "market").with_image("image/jpeg", vec![1, 2, 3]);
        let json = serde_json::to_value(build_request(&ctx, "gpt-4o")).unwrap();
        let parts = &json["messages"][1]["content"];
        assert_eq!(parts[0]["type"], "text");
        assert_eq!(parts[0]["text"], "market");
        assert_eq!(parts[1]["type"], "image_url");
        assert_eq!(parts[1]["image_url"]["url"], "data:image/jpeg;base64,AQID");
    }

    #[test]
    fn test_free_text_omits_response_format() {
        let mut ctx = Context::new("", "hi");
        ctx.json_output = false;
        let json = serde_json::to_value(build_request(&ctx, "m")).unwrap();
        assert!(json.get("response_format").is_none());
        assert_eq!(json["messages"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_complete_parses_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "model": "gpt-4o-mini-2024",
                "choices": [{"message": {"role": "assistant", "content": "{\"type\":\"expense\"}"}}],
                "usage": {"total_tokens": 42}
            })))
            .mount(&server)
            .await;

        let out = provider(&server.uri())
            .complete(&Context::new("s", "u"))
            .await
            .unwrap();
        assert_eq!(out.text, "{\"type\":\"expense\"}");
        assert_eq!(out.metadata.tokens_used, Some(42));
        assert_eq!(out.metadata.provider_used, "openai");
    }

    #[tokio::test]
    async fn test_complete_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let err = provider(&server.uri())
            .complete(&Context::new("s", "u"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("429"));
    }

    #[tokio::test]
    async fn test_is_available_without_key() {
        let p = OpenAiProvider::from_config(
            reqwest::Client::new(),
            "http://127.0.0.1:9".into(),
            String::new(),
            "m".into(),
        );
        assert!(!p.is_available().await);
    }
}
