//! Message processing pipeline.
//!
//! One webhook call walks an explicit state machine:
//!
//! ```text
//! Received → Deduplicated → Identified → MediaResolved → Classified
//!          → Resolved → Executed → Replied
//! ```
//!
//! Each stage consumes the previous one. Benign exits (noise, duplicate,
//! unauthorized) end the walk early with a [`WebhookOutcome`]; failures are
//! sorted by [`TallyError`] variant into apology replies or infrastructure
//! errors.

use super::{
    classifier, executor,
    identity::{self, Identity, Sender},
    replies,
    resolver::{self, Resolution},
    Gateway,
};
use serde_json::{json, Value};
use tally_channels::crypto::MediaKind;
use tally_core::{
    error::TallyError,
    intent::{FinancialIntent, IntentKind},
    ledger::LogUpdate,
    message::{InboundEvent, MessageKind},
};
use tracing::{debug, error, info, warn};

/// How one webhook call ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// Self-sent, broadcast, group or malformed event.
    Ignored,
    /// The message id was already accepted once.
    Duplicate,
    /// The sender has no verified identity link.
    Unauthorized,
    /// Processed to the end. `error` carries a handled failure.
    Processed { error: Option<String> },
}

/// What the classifier gets to read.
enum Input {
    Text(String),
    Image {
        data: Vec<u8>,
        mime_type: String,
        caption: Option<String>,
    },
}

/// Reply and log payload produced by execution.
struct Completed {
    reply: String,
    result: Value,
}

enum Stage {
    Received,
    Deduplicated,
    Identified(Sender),
    MediaResolved(Sender, Input),
    Classified(Sender, FinancialIntent),
    Resolved(Sender, FinancialIntent, Resolution),
    Executed(Sender, Completed),
}

impl Stage {
    fn name(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Deduplicated => "deduplicated",
            Self::Identified(..) => "identified",
            Self::MediaResolved(..) => "media_resolved",
            Self::Classified(..) => "classified",
            Self::Resolved(..) => "resolved",
            Self::Executed(..) => "executed",
        }
    }
}

enum Step {
    Next(Stage),
    Done(WebhookOutcome),
}

/// Facts learned along the way, needed to report a failure.
#[derive(Default)]
struct Progress {
    logged: bool,
    sender: Option<Sender>,
}

impl Gateway {
    /// Process one webhook body.
    ///
    /// `Err` is reserved for infrastructure failures (storage). Everything
    /// the user can be told about ends in `Ok`.
    pub async fn handle_webhook(&self, body: &Value) -> Result<WebhookOutcome, TallyError> {
        let Some(event) = InboundEvent::from_webhook(body) else {
            debug!("webhook: event without message id or sender, ignored");
            return Ok(WebhookOutcome::Ignored);
        };

        let mut progress = Progress::default();
        let mut stage = Stage::Received;
        loop {
            let from = stage.name();
            match self.advance(stage, &event, &mut progress).await {
                Ok(Step::Next(next)) => {
                    debug!("[{}] {from} -> {}", event.message_id, next.name());
                    stage = next;
                }
                Ok(Step::Done(outcome)) => {
                    debug!("[{}] {from} -> done: {outcome:?}", event.message_id);
                    return Ok(outcome);
                }
                Err(e) => return self.fail(&event, &progress, e).await,
            }
        }
    }

    async fn advance(
        &self,
        stage: Stage,
        event: &InboundEvent,
        progress: &mut Progress,
    ) -> Result<Step, TallyError> {
        match stage {
            Stage::Received => {
                if event.is_noise() {
                    return Ok(Step::Done(WebhookOutcome::Ignored));
                }
                let fresh = self
                    .repos
                    .log
                    .insert_if_new(&event.message_id, &event.kind, &event.raw)
                    .await?;
                if !fresh {
                    info!("[{}] duplicate delivery", event.message_id);
                    return Ok(Step::Done(WebhookOutcome::Duplicate));
                }
                progress.logged = true;
                Ok(Step::Next(Stage::Deduplicated))
            }

            Stage::Deduplicated => match identity::resolve(&*self.repos.identities, event).await? {
                Identity::Verified(sender) => {
                    info!(
                        "[{}] {} from {} ({})",
                        event.message_id,
                        event.kind.as_str(),
                        sender.user_id,
                        event.push_name.as_deref().unwrap_or("unknown")
                    );
                    progress.sender = Some(sender.clone());
                    Ok(Step::Next(Stage::Identified(sender)))
                }
                Identity::Denied { reply_to, reason } => {
                    warn!(
                        "[{}] sender {} denied: {}",
                        event.message_id,
                        event.remote_jid,
                        reason.as_str()
                    );
                    match reply_to {
                        Some(number) => {
                            self.send_reply(&number, self.settings.deny_message.clone())
                                .await
                        }
                        None => warn!("[{}] no phone number to reply to", event.message_id),
                    }
                    self.repos
                        .log
                        .complete(
                            &event.message_id,
                            &LogUpdate {
                                result: Some(json!(reason.as_str())),
                                processed: true,
                                ..Default::default()
                            },
                        )
                        .await?;
                    Ok(Step::Done(WebhookOutcome::Unauthorized))
                }
            },

            Stage::Identified(sender) => {
                let input = match event.kind {
                    MessageKind::Text => {
                        let text = event.text.clone().unwrap_or_default();
                        if text.trim().is_empty() {
                            let intent = FinancialIntent::query(IntentKind::Doubt);
                            return Ok(Step::Next(Stage::Classified(sender, intent)));
                        }
                        Input::Text(text)
                    }
                    MessageKind::Audio => {
                        let descriptor = event.media.clone().unwrap_or_default();
                        let audio = self
                            .services
                            .media
                            .fetch_and_decrypt(&descriptor, MediaKind::Audio, &event.message_id)
                            .await?;
                        let mime = descriptor.mimetype.as_deref().unwrap_or("audio/ogg");
                        let transcript = self.services.transcriber.transcribe(&audio, mime).await?;
                        info!("[{}] transcript: {transcript}", event.message_id);
                        Input::Text(transcript)
                    }
                    MessageKind::Image => {
                        let descriptor = event.media.clone().unwrap_or_default();
                        let data = self
                            .services
                            .media
                            .fetch_and_decrypt(&descriptor, MediaKind::Image, &event.message_id)
                            .await?;
                        Input::Image {
                            data,
                            mime_type: descriptor
                                .mimetype
                                .clone()
                                .unwrap_or_else(|| "image/jpeg".to_string()),
                            caption: descriptor.caption.clone(),
                        }
                    }
                    MessageKind::Other => {
                        return Ok(Step::Next(Stage::Executed(
                            sender,
                            Completed {
                                reply: replies::unsupported_message(),
                                result: Value::Null,
                            },
                        )));
                    }
                };
                Ok(Step::Next(Stage::MediaResolved(sender, input)))
            }

            Stage::MediaResolved(sender, input) => {
                let intent = match input {
                    Input::Text(text) => match classifier::fast_path(&text) {
                        Some(kind) => FinancialIntent::query(kind),
                        None => {
                            classifier::classify_text(
                                &*self.services.classifier,
                                &self.prompts.classifier,
                                &text,
                            )
                            .await?
                        }
                    },
                    Input::Image {
                        data,
                        mime_type,
                        caption,
                    } => {
                        classifier::extract_from_image(
                            &*self.services.vision,
                            &self.prompts.vision,
                            data,
                            &mime_type,
                            caption.as_deref(),
                        )
                        .await?
                    }
                };
                Ok(Step::Next(Stage::Classified(sender, intent)))
            }

            Stage::Classified(sender, intent) => {
                let answerable = intent.is_actionable()
                    || matches!(
                        intent.kind,
                        IntentKind::BalanceQuery | IntentKind::StatementQuery
                    );
                if !answerable {
                    return Ok(Step::Next(Stage::Executed(
                        sender,
                        Completed {
                            reply: replies::clarification(&intent),
                            result: serde_json::to_value(&intent)?,
                        },
                    )));
                }
                let resolution = resolver::resolve(
                    &*self.repos.catalog,
                    &sender.user_id,
                    &intent,
                    &self.settings.misc_category_marker,
                )
                .await?;
                Ok(Step::Next(Stage::Resolved(sender, intent, resolution)))
            }

            Stage::Resolved(sender, intent, resolution) => {
                let symbol = &self.settings.currency_symbol;
                let ledger = &*self.repos.ledger;
                let reply = match intent.kind {
                    IntentKind::BalanceQuery => {
                        replies::balance(symbol, ledger.liquid_balance(&sender.user_id).await?)
                    }
                    IntentKind::StatementQuery => {
                        let entries = executor::statement(
                            ledger,
                            &sender.user_id,
                            self.settings.statement_limit,
                        )
                        .await?;
                        replies::statement(symbol, &entries)
                    }
                    _ => {
                        let outcome = executor::record(
                            ledger,
                            &sender.user_id,
                            &intent,
                            &resolution,
                            &event.message_id,
                        )
                        .await?;
                        replies::transaction_recorded(symbol, &intent, &resolution, &outcome)
                    }
                };
                Ok(Step::Next(Stage::Executed(
                    sender,
                    Completed {
                        reply,
                        result: serde_json::to_value(&intent)?,
                    },
                )))
            }

            Stage::Executed(sender, completed) => {
                self.send_reply(&sender.reply_to, completed.reply).await;
                self.repos
                    .log
                    .complete(
                        &event.message_id,
                        &LogUpdate {
                            user_id: Some(sender.user_id),
                            result: Some(completed.result).filter(|v| !v.is_null()),
                            processed: true,
                            error: None,
                        },
                    )
                    .await?;
                Ok(Step::Done(WebhookOutcome::Processed { error: None }))
            }
        }
    }

    /// Sort a failure into a user-facing apology or an infrastructure error.
    async fn fail(
        &self,
        event: &InboundEvent,
        progress: &Progress,
        err: TallyError,
    ) -> Result<WebhookOutcome, TallyError> {
        let handled = err.is_pre_side_effect() || matches!(err, TallyError::Transaction(_));
        if !handled {
            error!("[{}] pipeline failed: {err}", event.message_id);
            if progress.logged {
                let update = LogUpdate {
                    user_id: progress.sender.as_ref().map(|s| s.user_id.clone()),
                    result: None,
                    processed: false,
                    error: Some(err.to_string()),
                };
                if let Err(e) = self.repos.log.complete(&event.message_id, &update).await {
                    warn!("[{}] could not record failure: {e}", event.message_id);
                }
            }
            return Err(err);
        }

        warn!("[{}] {err}", event.message_id);
        let reply = match (&err, &event.kind) {
            (TallyError::Transaction(_), _) => replies::transaction_failure(),
            (_, MessageKind::Audio) => replies::audio_failure(),
            (_, MessageKind::Image) => replies::image_failure(),
            _ => replies::not_understood(),
        };
        if let Some(sender) = &progress.sender {
            self.send_reply(&sender.reply_to, reply).await;
        }

        let message = err.to_string();
        self.repos
            .log
            .complete(
                &event.message_id,
                &LogUpdate {
                    user_id: progress.sender.as_ref().map(|s| s.user_id.clone()),
                    result: None,
                    processed: true,
                    error: Some(message.clone()),
                },
            )
            .await?;
        Ok(WebhookOutcome::Processed {
            error: Some(message),
        })
    }
}
