//! Inbound webhook events and outbound replies.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Remote id the platform uses for status/broadcast updates.
pub const STATUS_BROADCAST_JID: &str = "status@broadcast";

/// Suffix of opaque linked-id sender identifiers.
pub const LINKED_ID_SUFFIX: &str = "@lid";

/// Suffix of group chats.
pub const GROUP_SUFFIX: &str = "@g.us";

/// What the user sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Audio,
    Image,
    Other,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Audio => "audio",
            Self::Image => "image",
            Self::Other => "other",
        }
    }
}

/// An encrypted attachment referenced by a message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaDescriptor {
    /// Direct download URL of the encrypted blob.
    pub url: Option<String>,
    /// 32-byte media key.
    pub media_key: Option<Vec<u8>>,
    pub mimetype: Option<String>,
    /// Base64 SHA-256 of the plaintext, as sent by the platform.
    pub file_sha256: Option<String>,
    pub caption: Option<String>,
}

impl MediaDescriptor {
    /// Whether the descriptor carries enough to download and decrypt directly.
    pub fn is_direct_capable(&self) -> bool {
        self.url.as_deref().is_some_and(|u| !u.is_empty())
            && self.media_key.as_ref().is_some_and(|k| k.len() == 32)
    }
}

/// A webhook event, parsed once per HTTP call and never mutated.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    /// External message id, the idempotency key.
    pub message_id: String,
    /// Sender identifier: `<digits>@s.whatsapp.net`, `<opaque>@lid`, or a group JID.
    pub remote_jid: String,
    pub from_me: bool,
    pub participant: Option<String>,
    /// Alternate identifier sent next to a linked id (`senderPn` / `remoteJidAlt`).
    pub alt_jid: Option<String>,
    pub push_name: Option<String>,
    pub kind: MessageKind,
    pub text: Option<String>,
    pub media: Option<MediaDescriptor>,
    /// Original `data` object, persisted in the message log.
    pub raw: Value,
}

#[derive(Debug, Deserialize)]
struct WebhookEnvelope {
    data: Option<WebhookData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WebhookData {
    key: Option<WebhookKey>,
    push_name: Option<String>,
    message: Option<Value>,
    message_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WebhookKey {
    remote_jid: Option<String>,
    #[serde(default)]
    from_me: bool,
    id: Option<String>,
    participant: Option<String>,
    sender_pn: Option<String>,
    remote_jid_alt: Option<String>,
}

impl InboundEvent {
    /// Parse a webhook body. Returns `None` when the event has no message id
    /// or remote id, which callers treat as noise.
    pub fn from_webhook(body: &Value) -> Option<Self> {
        let envelope: WebhookEnvelope = serde_json::from_value(body.clone()).ok()?;
        let data = envelope.data?;
        let key = data.key?;
        let message_id = key.id.filter(|s| !s.is_empty())?;
        let remote_jid = key.remote_jid.filter(|s| !s.is_empty())?;

        let message = data.message.unwrap_or(Value::Null);
        let inner = unwrap_message(&message);

        let text = inner
            .get("conversation")
            .and_then(Value::as_str)
            .or_else(|| {
                inner
                    .pointer("/extendedTextMessage/text")
                    .and_then(Value::as_str)
            })
            .map(str::to_string);

        let (kind, media) = if let Some(audio) = inner.get("audioMessage") {
            (MessageKind::Audio, Some(media_descriptor(audio)))
        } else if let Some(image) = inner.get("imageMessage") {
            (MessageKind::Image, Some(media_descriptor(image)))
        } else if text.is_some() {
            (MessageKind::Text, None)
        } else {
            match data.message_type.as_deref() {
                Some("conversation") | Some("extendedTextMessage") => (MessageKind::Text, None),
                Some("audioMessage") => (MessageKind::Audio, Some(MediaDescriptor::default())),
                Some("imageMessage") => (MessageKind::Image, Some(MediaDescriptor::default())),
                _ => (MessageKind::Other, None),
            }
        };

        let raw = body.get("data").cloned().unwrap_or(Value::Null);

        Some(Self {
            message_id,
            remote_jid,
            from_me: key.from_me,
            participant: key.participant,
            alt_jid: key.sender_pn.or(key.remote_jid_alt),
            push_name: data.push_name.filter(|s| !s.is_empty()),
            kind,
            text,
            media,
            raw,
        })
    }

    /// Whether the sender identifier is an opaque linked id.
    pub fn is_linked_id(&self) -> bool {
        self.remote_jid.ends_with(LINKED_ID_SUFFIX)
    }

    /// Whether the event is platform noise that must not be processed.
    pub fn is_noise(&self) -> bool {
        self.from_me
            || self.remote_jid == STATUS_BROADCAST_JID
            || self.remote_jid.ends_with(GROUP_SUFFIX)
    }

    /// The linked id carried by the event, either as sender or as alternate.
    pub fn linked_id(&self) -> Option<&str> {
        if self.is_linked_id() {
            return Some(&self.remote_jid);
        }
        self.alt_jid
            .as_deref()
            .filter(|jid| jid.ends_with(LINKED_ID_SUFFIX))
    }

    /// The phone-number JID carried by the event, either as sender or as alternate.
    pub fn phone_jid(&self) -> Option<&str> {
        if !self.is_linked_id() {
            return Some(&self.remote_jid);
        }
        self.alt_jid
            .as_deref()
            .filter(|jid| !jid.ends_with(LINKED_ID_SUFFIX))
    }
}

/// Unwrap ephemeral / view-once / device-sent wrappers.
fn unwrap_message(message: &Value) -> &Value {
    for wrapper in [
        "ephemeralMessage",
        "viewOnceMessage",
        "viewOnceMessageV2",
        "deviceSentMessage",
    ] {
        if let Some(inner) = message.get(wrapper).and_then(|w| w.get("message")) {
            return unwrap_message(inner);
        }
    }
    message
}

fn media_descriptor(node: &Value) -> MediaDescriptor {
    let str_field = |name: &str| {
        node.get(name)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    MediaDescriptor {
        url: str_field("url"),
        media_key: node.get("mediaKey").and_then(key_bytes),
        mimetype: str_field("mimetype"),
        file_sha256: node.get("fileSha256").and_then(|v| match v {
            Value::String(s) => Some(s.clone()),
            other => key_bytes(other).map(|b| BASE64.encode(b)),
        }),
        caption: str_field("caption"),
    }
}

/// Media keys arrive as base64 strings, `{"0":12,"1":34,...}` objects, or
/// `{"type":"Buffer","data":[...]}` objects depending on the gateway version.
fn key_bytes(value: &Value) -> Option<Vec<u8>> {
    match value {
        Value::String(s) => BASE64.decode(s.trim()).ok(),
        Value::Array(items) => items
            .iter()
            .map(|v| v.as_u64().and_then(|n| u8::try_from(n).ok()))
            .collect(),
        Value::Object(map) => {
            if let Some(data) = map.get("data") {
                return key_bytes(data);
            }
            let mut indexed: Vec<(usize, u8)> = map
                .iter()
                .map(|(k, v)| {
                    let idx = k.parse::<usize>().ok()?;
                    let byte = v.as_u64().and_then(|n| u8::try_from(n).ok())?;
                    Some((idx, byte))
                })
                .collect::<Option<_>>()?;
            indexed.sort_by_key(|(i, _)| *i);
            Some(indexed.into_iter().map(|(_, b)| b).collect())
        }
        _ => None,
    }
}

/// An outbound text reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    /// Destination phone number (digits only).
    pub number: String,
    pub text: String,
}
