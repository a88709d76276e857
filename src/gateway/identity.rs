//! Sender identity resolution.
//!
//! A sender arrives either as a phone JID (`5511987654321@s.whatsapp.net`) or
//! as an opaque linked id (`123456789@lid`). Both are mapped to an internal
//! user id through [`IdentityLinkRepo`]. Replies always go to a phone number.

use tally_core::{
    error::TallyError, ledger::IdentityLink, message::InboundEvent, traits::IdentityLinkRepo,
};
use tracing::{debug, info, warn};

/// Brazilian country code.
const BR_COUNTRY_CODE: &str = "55";

/// A verified sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct Sender {
    pub user_id: String,
    /// Phone number (digits only) replies are sent to.
    pub reply_to: String,
}

/// Why a sender was turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum DenyReason {
    /// A link exists but is not verified.
    Unverified,
    /// No link at all.
    Unknown,
}

impl DenyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unverified => "Unverified",
            Self::Unknown => "Unknown sender",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum Identity {
    Verified(Sender),
    Denied {
        reply_to: Option<String>,
        reason: DenyReason,
    },
}

/// Digits of the user part of a JID, dropping any `:device` suffix.
pub(crate) fn jid_digits(jid: &str) -> String {
    let user = jid.split('@').next().unwrap_or(jid);
    let user = user.split(':').next().unwrap_or(user);
    user.chars().filter(char::is_ascii_digit).collect()
}

/// Every spelling of a phone number a link may have been stored under.
///
/// Brazilian mobiles gained a leading `9` after the area code; the platform
/// still reports some of them without it. `55 DD NNNNNNNN` and
/// `55 DD 9 NNNNNNNN` are treated as the same number.
pub(crate) fn phone_variants(digits: &str) -> Vec<String> {
    let mut variants = vec![digits.to_string()];
    if let Some(rest) = digits.strip_prefix(BR_COUNTRY_CODE) {
        match rest.len() {
            // DDD + 8 digits: add the ninth digit.
            10 => {
                let (ddd, number) = rest.split_at(2);
                variants.push(format!("{BR_COUNTRY_CODE}{ddd}9{number}"));
            }
            // DDD + 9 + 8 digits: drop it.
            11 if rest.as_bytes()[2] == b'9' => {
                let (ddd, number) = rest.split_at(2);
                variants.push(format!("{BR_COUNTRY_CODE}{ddd}{}", &number[1..]));
            }
            _ => {}
        }
    }
    variants
}

/// Record a linked id on a link that does not carry it yet. Failures are logged only.
async fn remember_linked_id(repo: &dyn IdentityLinkRepo, link: &IdentityLink, event: &InboundEvent) {
    let Some(linked_id) = event.linked_id() else {
        return;
    };
    if link.linked_id.as_deref() == Some(linked_id) {
        return;
    }
    match repo.set_linked_id(link.id, linked_id).await {
        Ok(()) => info!("identity: linked {linked_id} to user {}", link.user_id),
        Err(e) => warn!("identity: failed to persist linked id {linked_id}: {e}"),
    }
}

/// Resolve the sender of `event`.
pub(super) async fn resolve(
    repo: &dyn IdentityLinkRepo,
    event: &InboundEvent,
) -> Result<Identity, TallyError> {
    let event_phone = event
        .phone_jid()
        .map(jid_digits)
        .filter(|d| !d.is_empty());

    if event.is_linked_id() {
        if let Some(link) = repo.find_by_linked_id(&event.remote_jid).await? {
            let reply_to = event_phone.unwrap_or_else(|| link.phone_number.clone());
            if !link.verified {
                return Ok(Identity::Denied {
                    reply_to: Some(reply_to),
                    reason: DenyReason::Unverified,
                });
            }
            debug!("identity: {} -> {}", event.remote_jid, link.user_id);
            return Ok(Identity::Verified(Sender {
                user_id: link.user_id,
                reply_to,
            }));
        }
        // Unknown linked id: the gateway's alternate phone may still match a link.
        if event_phone.is_none() {
            return Ok(Identity::Denied {
                reply_to: None,
                reason: DenyReason::Unknown,
            });
        }
    }

    let Some(phone) = event_phone else {
        return Ok(Identity::Denied {
            reply_to: None,
            reason: DenyReason::Unknown,
        });
    };

    let links = repo.find_by_phones(&phone_variants(&phone)).await?;
    match links.iter().find(|l| l.verified) {
        Some(link) => {
            remember_linked_id(repo, link, event).await;
            debug!("identity: {phone} -> {}", link.user_id);
            Ok(Identity::Verified(Sender {
                user_id: link.user_id.clone(),
                reply_to: phone,
            }))
        }
        None => Ok(Identity::Denied {
            reply_to: Some(phone),
            reason: if links.is_empty() {
                DenyReason::Unknown
            } else {
                DenyReason::Unverified
            },
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jid_digits() {
        assert_eq!(jid_digits("5511987654321@s.whatsapp.net"), "5511987654321");
        assert_eq!(jid_digits("5511987654321:12@s.whatsapp.net"), "5511987654321");
        assert_eq!(jid_digits("+55 (11) 98765-4321"), "5511987654321");
        assert_eq!(jid_digits("abc@lid"), "");
    }

    #[test]
    fn test_phone_variants_adds_ninth_digit() {
        assert_eq!(
            phone_variants("551187654321"),
            vec!["551187654321".to_string(), "5511987654321".to_string()]
        );
    }

    #[test]
    fn test_phone_variants_drops_ninth_digit() {
        assert_eq!(
            phone_variants("5511987654321"),
            vec!["5511987654321".to_string(), "551187654321".to_string()]
        );
    }

    #[test]
    fn test_phone_variants_leaves_other_numbers() {
        assert_eq!(phone_variants("14155550123"), vec!["14155550123".to_string()]);
        // 11 digits after 55 without a leading 9 is not a mobile variant.
        assert_eq!(phone_variants("5511387654321"), vec!["5511387654321".to_string()]);
    }
}
