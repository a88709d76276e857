//! Gateway: turns one webhook event into at most one ledger write and one reply.
//!
//! Includes: noise filtering, message-id deduplication, identity resolution,
//! media decryption, transcription/vision, classification, category/account
//! resolution, ledger execution and the outbound reply.

mod classifier;
mod executor;
mod identity;
mod pipeline;
mod replies;
mod resolver;


pub(crate) use classifier::{fast_path, parse_intent};
pub use pipeline::WebhookOutcome;

use std::sync::Arc;
use tally_channels::media::MediaDecryptor;
use tally_core::{
    config::{Config, Prompts},
    message::OutgoingMessage,
    traits::{
        CatalogRepo, IdentityLinkRepo, LedgerRpc, MessageLogRepo, Provider, ReplySender,
        Transcriber,
    },
};
use tally_ledger::Store;
use tracing::{debug, warn};

/// Storage seams used by the pipeline.
#[derive(Clone)]
pub struct Repositories {
    pub log: Arc<dyn MessageLogRepo>,
    pub identities: Arc<dyn IdentityLinkRepo>,
    pub catalog: Arc<dyn CatalogRepo>,
    pub ledger: Arc<dyn LedgerRpc>,
}

impl Repositories {
    /// All four seams backed by one SQLite store.
    pub fn from_store(store: Store) -> Self {
        let store = Arc::new(store);
        Self {
            log: store.clone(),
            identities: store.clone(),
            catalog: store.clone(),
            ledger: store,
        }
    }
}

/// AI and media collaborators.
#[derive(Clone)]
pub struct Services {
    /// Text classification.
    pub classifier: Arc<dyn Provider>,
    /// Image intent extraction.
    pub vision: Arc<dyn Provider>,
    pub transcriber: Arc<dyn Transcriber>,
    pub media: Arc<MediaDecryptor>,
    pub replies: Arc<dyn ReplySender>,
}

/// Reply and lookup settings taken from config.
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub deny_message: String,
    pub currency_symbol: String,
    pub misc_category_marker: String,
    pub statement_limit: i64,
}

impl GatewaySettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            deny_message: cfg.auth.deny_message.clone(),
            currency_symbol: cfg.locale.currency_symbol.clone(),
            misc_category_marker: cfg.locale.misc_category_marker.clone(),
            statement_limit: cfg.ledger.statement_limit.max(1),
        }
    }
}

/// The webhook processing gateway. Stateless between calls.
pub struct Gateway {
    pub(super) repos: Repositories,
    pub(super) services: Services,
    pub(super) prompts: Prompts,
    pub(super) settings: GatewaySettings,
}

impl Gateway {
    pub fn new(
        repos: Repositories,
        services: Services,
        prompts: Prompts,
        settings: GatewaySettings,
    ) -> Self {
        Self {
            repos,
            services,
            prompts,
            settings,
        }
    }

    /// Send a reply. Delivery failures are logged and swallowed.
    pub(super) async fn send_reply(&self, number: &str, text: String) {
        let message = OutgoingMessage {
            number: number.to_string(),
            text,
        };
        match self.services.replies.send_text(&message).await {
            Ok(()) => debug!("reply sent to {number}"),
            Err(e) => warn!("reply to {number} failed: {e}"),
        }
    }
}
