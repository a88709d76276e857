use crate::{
    context::{Completion, Context},
    error::TallyError,
    intent::IntentKind,
    ledger::{
        Account, AccountKind, Category, IdentityLink, LedgerWrite, LogUpdate, StatementEntry,
        TransactionOutcome,
    },
    message::{MessageKind, OutgoingMessage},
};
use async_trait::async_trait;
use rust_decimal::Decimal;

/// AI provider behind classification and vision.
///
/// Every AI backend (OpenAI, Anthropic, Gemini) implements this trait to
/// provide a uniform interface for classification and vision.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Human-readable provider name.
    fn name(&self) -> &str;

    /// Whether the provider accepts image input.
    fn supports_vision(&self) -> bool {
        false
    }

    /// Send a request to the provider and get a response.
    async fn complete(&self, context: &Context) -> Result<Completion, TallyError>;

    /// Check if the provider is available and ready.
    async fn is_available(&self) -> bool;
}

/// Outbound reply channel (messaging gateway).
#[async_trait]
pub trait ReplySender: Send + Sync {
    /// Send a text message to a phone number.
    async fn send_text(&self, message: &OutgoingMessage) -> Result<(), TallyError>;
}

/// Speech-to-text backend.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: &[u8], mime_type: &str) -> Result<String, TallyError>;
}

/// Idempotency log of inbound messages.
#[async_trait]
pub trait MessageLogRepo: Send + Sync {
    /// Insert a row for `message_id`. Returns `false` when a row already exists.
    async fn insert_if_new(
        &self,
        message_id: &str,
        kind: &MessageKind,
        raw: &serde_json::Value,
    ) -> Result<bool, TallyError>;

    /// Record the final state of a processed message.
    async fn complete(&self, message_id: &str, update: &LogUpdate) -> Result<(), TallyError>;
}

/// Sender identity links (read-mostly).
#[async_trait]
pub trait IdentityLinkRepo: Send + Sync {
    async fn find_by_linked_id(&self, linked_id: &str)
        -> Result<Option<IdentityLink>, TallyError>;

    /// All links whose phone number is one of `phones`, verified first.
    async fn find_by_phones(&self, phones: &[String]) -> Result<Vec<IdentityLink>, TallyError>;

    /// Record a linked-id alias on an existing link.
    async fn set_linked_id(&self, link_id: i64, linked_id: &str) -> Result<(), TallyError>;
}

/// Categories and accounts of a user.
#[async_trait]
pub trait CatalogRepo: Send + Sync {
    /// Case-insensitive exact name match among the user's categories of `kind`.
    async fn find_category(
        &self,
        user_id: &str,
        name: &str,
        kind: IntentKind,
    ) -> Result<Option<Category>, TallyError>;

    /// First category of `kind` whose name contains `marker` (case-insensitive).
    async fn find_category_containing(
        &self,
        user_id: &str,
        marker: &str,
        kind: IntentKind,
    ) -> Result<Option<Category>, TallyError>;

    /// An active account of the given kind, default accounts first.
    async fn find_account_by_kind(
        &self,
        user_id: &str,
        kind: AccountKind,
    ) -> Result<Option<Account>, TallyError>;

    /// The user's active default account.
    async fn find_default_account(&self, user_id: &str) -> Result<Option<Account>, TallyError>;
}

/// Atomic ledger operations.
#[async_trait]
pub trait LedgerRpc: Send + Sync {
    /// Insert a transaction and move the balance in one atomic step.
    async fn process_transaction(
        &self,
        write: &LedgerWrite,
    ) -> Result<TransactionOutcome, TallyError>;

    /// What the user can truly spend right now.
    async fn liquid_balance(&self, user_id: &str) -> Result<Decimal, TallyError>;

    /// Most recent rows of one type, newest first.
    async fn recent_transactions(
        &self,
        user_id: &str,
        kind: IntentKind,
        limit: i64,
    ) -> Result<Vec<StatementEntry>, TallyError>;
}
