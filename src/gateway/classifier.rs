//! Free text / images → [`FinancialIntent`].

use tally_core::{
    context::Context,
    error::TallyError,
    intent::{FinancialIntent, IntentKind},
    traits::Provider,
};
use tracing::{debug, info};

/// Fixed commands answered without a model call.
///
/// The text is trimmed, lower-cased and may carry a leading `/`.
pub(crate) fn fast_path(text: &str) -> Option<IntentKind> {
    let normalized = text.trim().to_lowercase();
    let command = normalized.strip_prefix('/').unwrap_or(&normalized).trim();
    match command {
        "balance" | "saldo" => Some(IntentKind::BalanceQuery),
        "statement" | "extrato" => Some(IntentKind::StatementQuery),
        _ => None,
    }
}

/// Strip a Markdown code fence (```json ... ```) around a model reply.
fn unwrap_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (e.g. `json`) on the opening line.
    let body = rest.split_once('\n').map(|(_, b)| b).unwrap_or("");
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Parse a model reply into a normalized intent.
pub(crate) fn parse_intent(raw: &str) -> Result<FinancialIntent, TallyError> {
    let body = unwrap_fence(raw);
    if body.is_empty() {
        return Err(TallyError::Classification("empty model reply".into()));
    }

    // Some models wrap the object in a sentence anyway.
    let json = match (body.find('{'), body.rfind('}')) {
        (Some(start), Some(end)) if start < end => &body[start..=end],
        _ => body,
    };

    let intent: FinancialIntent = serde_json::from_str(json).map_err(|e| {
        TallyError::Classification(format!("unparseable model reply ({e}): {body}"))
    })?;
    Ok(intent.normalized())
}

/// Classify a text message (or voice transcript).
pub(super) async fn classify_text(
    provider: &dyn Provider,
    system_prompt: &str,
    text: &str,
) -> Result<FinancialIntent, TallyError> {
    let completion = provider
        .complete(&Context::new(system_prompt, text))
        .await
        .map_err(|e| TallyError::Classification(e.to_string()))?;

    debug!(
        "classifier: {} replied in {}ms",
        completion.metadata.provider_used, completion.metadata.processing_time_ms
    );
    let intent = parse_intent(&completion.text)?;
    info!(
        "classifier: {} {} ({:?})",
        intent.kind.as_str(),
        intent.amount,
        intent.completeness
    );
    Ok(intent)
}

/// Read a receipt or screenshot with a vision-capable provider.
pub(super) async fn extract_from_image(
    provider: &dyn Provider,
    system_prompt: &str,
    image: Vec<u8>,
    mime_type: &str,
    caption: Option<&str>,
) -> Result<FinancialIntent, TallyError> {
    if !provider.supports_vision() {
        return Err(TallyError::Vision(format!(
            "provider {} cannot read images",
            provider.name()
        )));
    }

    let user_message = match caption.map(str::trim).filter(|c| !c.is_empty()) {
        Some(caption) => format!("Caption from the user: {caption}"),
        None => "Extract the transaction from this image.".to_string(),
    };
    let context = Context::new(system_prompt, &user_message).with_image(mime_type, image);

    let completion = provider
        .complete(&context)
        .await
        .map_err(|e| TallyError::Vision(e.to_string()))?;

    parse_intent(&completion.text).map_err(|e| TallyError::Vision(e.to_string()))
}
