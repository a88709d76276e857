//! Voice note transcription via the OpenAI Whisper API.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tally_core::{config::TranscriptionConfig, error::TallyError, traits::Transcriber};

/// Whisper API response.
#[derive(Deserialize)]
struct WhisperResponse {
    text: String,
}

/// Whisper-backed [`Transcriber`].
pub struct WhisperTranscriber {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    language: String,
}

impl WhisperTranscriber {
    /// `api_key` is passed separately since it may come from the OpenAI provider section.
    pub fn new(
        config: &TranscriptionConfig,
        api_key: &str,
        timeout: Duration,
    ) -> Result<Self, TallyError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TallyError::Transcription(format!("whisper client build failed: {e}")))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: config.model.clone(),
            language: config.language.clone(),
        })
    }
}

/// Upload file name for a mime type. Whisper infers the codec from the extension.
fn file_name_for(mime_type: &str) -> &'static str {
    let base = mime_type.split(';').next().unwrap_or("").trim();
    match base {
        "audio/mpeg" | "audio/mp3" => "voice.mp3",
        "audio/mp4" | "audio/m4a" | "audio/x-m4a" | "audio/aac" => "voice.m4a",
        "audio/wav" | "audio/x-wav" => "voice.wav",
        "audio/webm" => "voice.webm",
        _ => "voice.ogg",
    }
}

#[async_trait]
impl Transcriber for WhisperTranscriber {
    async fn transcribe(&self, audio: &[u8], mime_type: &str) -> Result<String, TallyError> {
        let mime = mime_type.split(';').next().unwrap_or("audio/ogg").trim();
        let part = reqwest::multipart::Part::bytes(audio.to_vec())
            .file_name(file_name_for(mime_type))
            .mime_str(if mime.is_empty() { "audio/ogg" } else { mime })
            .map_err(|e| TallyError::Transcription(format!("whisper mime error: {e}")))?;

        let mut form = reqwest::multipart::Form::new()
            .text("model", self.model.clone())
            .part("file", part);
        if !self.language.is_empty() {
            form = form.text("language", self.language.clone());
        }

        let resp = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| TallyError::Transcription(format!("whisper request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(TallyError::Transcription(format!(
                "whisper API error {status}: {body}"
            )));
        }

        let result: WhisperResponse = resp
            .json()
            .await
            .map_err(|e| TallyError::Transcription(format!("whisper response parse failed: {e}")))?;

        let text = result.text.trim().to_string();
        if text.is_empty() {
            return Err(TallyError::Transcription("empty transcription".into()));
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn transcriber(base_url: &str) -> WhisperTranscriber {
        let config = TranscriptionConfig {
            base_url: base_url.to_string(),
            ..Default::default()
        };
        WhisperTranscriber::new(&config, "sk-test", Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_file_name_for_mime() {
        assert_eq!(file_name_for("audio/ogg; codecs=opus"), "voice.ogg");
        assert_eq!(file_name_for("audio/mpeg"), "voice.mp3");
        assert_eq!(file_name_for("audio/mp4"), "voice.m4a");
        assert_eq!(file_name_for(""), "voice.ogg");
    }

    #[tokio::test]
    async fn test_transcribe_returns_trimmed_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/audio/transcriptions"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"text": " gastei 50 no mercado \n"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let text = transcriber(&server.uri())
            .transcribe(b"OggS", "audio/ogg; codecs=opus")
            .await
            .unwrap();
        assert_eq!(text, "gastei 50 no mercado");
    }

    #[tokio::test]
    async fn test_transcribe_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/audio/transcriptions"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad audio"))
            .mount(&server)
            .await;

        let err = transcriber(&server.uri())
            .transcribe(b"garbage", "audio/ogg")
            .await
            .unwrap_err();
        assert!(matches!(err, TallyError::Transcription(_)));
        assert!(err.to_string().contains("bad audio"));
    }

    #[tokio::test]
    async fn test_transcribe_empty_text_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"text": "  "})))
            .mount(&server)
            .await;

        let err = transcriber(&server.uri())
            .transcribe(b"OggS", "audio/ogg")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("empty"));
    }
}
