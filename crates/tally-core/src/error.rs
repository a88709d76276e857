use thiserror::Error;

/// Top-level error type for Tally.
#[derive(Debug, Error)]
pub enum TallyError {
    /// Error from an AI provider.
    #[error("provider error: {0}")]
    Provider(String),

    /// Error from the messaging gateway.
    #[error("channel error: {0}")]
    Channel(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(String),

    /// A single media payload could not be decrypted.
    #[error("decryption failure: {0}")]
    Decryption(String),

    /// Every media strategy failed. Carries the per-strategy reasons.
    #[error("media decryption failure: {0}")]
    MediaDecryption(String),

    /// Speech-to-text failed.
    #[error("transcription failure: {0}")]
    Transcription(String),

    /// Image intent extraction failed.
    #[error("vision failure: {0}")]
    Vision(String),

    /// The language model returned nothing usable.
    #[error("classification failure: {0}")]
    Classification(String),

    /// The ledger rejected or failed a read/write.
    #[error("transaction failure: {0}")]
    Transaction(String),

    /// The outbound reply could not be delivered.
    #[error("reply delivery failure: {0}")]
    ReplyDelivery(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TallyError {
    /// Whether the failure happened before any ledger side effect, i.e. the
    /// user gets an apology and the webhook still answers 200.
    pub fn is_pre_side_effect(&self) -> bool {
        matches!(
            self,
            Self::Decryption(_)
                | Self::MediaDecryption(_)
                | Self::Transcription(_)
                | Self::Vision(_)
                | Self::Classification(_)
        )
    }
}
