//! Media resolution: ordered fallback strategies that each try to turn a
//! media descriptor into decrypted bytes.

use crate::crypto::{self, MediaKind};
use crate::evolution::EvolutionClient;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tally_core::{error::TallyError, message::MediaDescriptor};
use tracing::{debug, info, warn};

/// What a strategy gets to work with.
#[derive(Debug, Clone, Copy)]
pub struct MediaRequest<'a> {
    pub message_id: &'a str,
    pub descriptor: &'a MediaDescriptor,
    pub kind: MediaKind,
}

/// One way of obtaining decrypted media.
#[async_trait]
pub trait MediaStrategy: Send + Sync {
    /// Short label used in aggregated error messages.
    fn name(&self) -> &str;

    async fn fetch(&self, request: &MediaRequest<'_>) -> Result<Vec<u8>, TallyError>;
}

/// Strategy A: download the encrypted blob and decrypt it locally.
pub struct DirectDownload {
    client: reqwest::Client,
    verify_mac: bool,
}

impl DirectDownload {
    pub fn new(timeout: Duration, verify_mac: bool) -> Result<Self, TallyError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TallyError::Channel(format!("media client build failed: {e}")))?;
        Ok(Self { client, verify_mac })
    }
}

#[async_trait]
impl MediaStrategy for DirectDownload {
    fn name(&self) -> &str {
        "direct"
    }

    async fn fetch(&self, request: &MediaRequest<'_>) -> Result<Vec<u8>, TallyError> {
        let descriptor = request.descriptor;
        let (Some(url), Some(media_key)) = (descriptor.url.as_deref(), descriptor.media_key.as_deref())
        else {
            return Err(TallyError::Decryption("no url or media key".into()));
        };
        if !descriptor.is_direct_capable() {
            return Err(TallyError::Decryption("unusable url or media key".into()));
        }

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| TallyError::Decryption(format!("download failed: {e}")))?;
        if !resp.status().is_success() {
            return Err(TallyError::Decryption(format!(
                "download returned {}",
                resp.status()
            )));
        }
        let blob = resp
            .bytes()
            .await
            .map_err(|e| TallyError::Decryption(format!("download body failed: {e}")))?;

        let keys = crypto::derive_keys(media_key, request.kind)?;
        if self.verify_mac {
            crypto::verify_mac(&blob, &keys)?;
        }
        crypto::decrypt_with_keys(&blob, &keys)
    }
}

/// Strategy B: let the gateway decrypt and return base64.
pub struct GatewayConversion {
    gateway: Arc<EvolutionClient>,
}

impl GatewayConversion {
    pub fn new(gateway: Arc<EvolutionClient>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl MediaStrategy for GatewayConversion {
    fn name(&self) -> &str {
        "gateway"
    }

    async fn fetch(&self, request: &MediaRequest<'_>) -> Result<Vec<u8>, TallyError> {
        let bytes = self.gateway.media_base64(request.message_id).await?;
        if bytes.is_empty() {
            return Err(TallyError::Channel("gateway returned empty media".into()));
        }
        Ok(bytes)
    }
}

/// Runs strategies in order and returns the first success.
pub struct MediaDecryptor {
    strategies: Vec<Box<dyn MediaStrategy>>,
}

impl MediaDecryptor {
    pub fn new(strategies: Vec<Box<dyn MediaStrategy>>) -> Self {
        Self { strategies }
    }

    /// Direct download first, gateway conversion second.
    pub fn standard(
        gateway: Arc<EvolutionClient>,
        timeout: Duration,
        verify_mac: bool,
    ) -> Result<Self, TallyError> {
        Ok(Self::new(vec![
            Box::new(DirectDownload::new(timeout, verify_mac)?),
            Box::new(GatewayConversion::new(gateway)),
        ]))
    }

    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    pub async fn fetch_and_decrypt(
        &self,
        descriptor: &MediaDescriptor,
        kind: MediaKind,
        message_id: &str,
    ) -> Result<Vec<u8>, TallyError> {
        let request = MediaRequest {
            message_id,
            descriptor,
            kind,
        };

        let mut failures = Vec::with_capacity(self.strategies.len());
        for strategy in &self.strategies {
            match strategy.fetch(&request).await {
                Ok(bytes) => {
                    info!(
                        "media: {} {} resolved via {} ({} bytes)",
                        kind.as_str(),
                        message_id,
                        strategy.name(),
                        bytes.len()
                    );
                    return Ok(bytes);
                }
                Err(e) => {
                    debug!("media: strategy {} failed for {message_id}: {e}", strategy.name());
                    failures.push(format!("{}: {e}", strategy.name()));
                }
            }
        }

        if failures.is_empty() {
            failures.push("no strategies configured".to_string());
        }
        let reason = failures.join("; ");
        warn!("media: all strategies failed for {message_id}: {reason}");
        Err(TallyError::MediaDecryption(reason))
    }
}
