use serde::{Deserialize, Serialize};

/// An image handed to a vision-capable provider.
#[derive(Debug, Clone)]
pub struct ImageInput {
    /// MIME type, e.g. `image/jpeg`.
    pub mime_type: String,
    pub data: Vec<u8>,
}

/// A single-turn request passed to an AI provider.
#[derive(Debug, Clone)]
pub struct Context {
    /// System instruction prepended to the request.
    pub system_prompt: String,
    /// The user text (message, transcript, or image caption).
    pub user_message: String,
    /// Optional image for vision requests.
    pub image: Option<ImageInput>,
    /// Ask the provider for a JSON-only answer when it supports it.
    pub json_output: bool,
    /// Override the provider's default model.
    pub model: Option<String>,
}

impl Context {
    /// Create a JSON-output context from a system instruction and a user message.
    pub fn new(system_prompt: &str, user_message: &str) -> Self {
        Self {
            system_prompt: system_prompt.to_string(),
            user_message: user_message.to_string(),
            image: None,
            json_output: true,
            model: None,
        }
    }

    /// Attach an image.
    pub fn with_image(mut self, mime_type: &str, data: Vec<u8>) -> Self {
        self.image = Some(ImageInput {
            mime_type: mime_type.to_string(),
            data,
        });
        self
    }
}

/// What a provider returned.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Completion {
    pub text: String,
    pub metadata: CompletionMetadata,
}

/// Metadata about how a completion was generated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionMetadata {
    /// Which provider produced this response.
    pub provider_used: String,
    /// Token count (if available from the provider).
    pub tokens_used: Option<u64>,
    /// Wall-clock processing time in milliseconds.
    pub processing_time_ms: u64,
    /// Model identifier (if applicable).
    pub model: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_new_defaults_to_json_without_image() {
        let ctx = Context::new("rules", "spent 50");
        assert!(ctx.json_output);
        assert!(ctx.image.is_none());
        assert_eq!(ctx.user_message, "spent 50");
    }

    #[test]
    fn test_with_image() {
        let ctx = Context::new("rules", "").with_image("image/png", vec![1, 2]);
        let img = ctx.image.unwrap();
        assert_eq!(img.mime_type, "image/png");
        assert_eq!(img.data, vec![1, 2]);
    }
}
