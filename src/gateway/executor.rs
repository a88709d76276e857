//! Ledger writes and reads for a resolved intent.

use super::resolver::Resolution;
use tally_core::{
    error::TallyError,
    intent::{FinancialIntent, IntentKind},
    ledger::{LedgerWrite, StatementEntry, TransactionOutcome},
    traits::LedgerRpc,
};

/// Ledger `source` recorded on every write from this service.
pub(super) const SOURCE: &str = "whatsapp";

/// Record an income or expense. The message id makes the write idempotent.
pub(super) async fn record(
    ledger: &dyn LedgerRpc,
    user_id: &str,
    intent: &FinancialIntent,
    resolution: &Resolution,
    message_id: &str,
) -> Result<TransactionOutcome, TallyError> {
    let write = LedgerWrite {
        user_id: user_id.to_string(),
        kind: intent.kind,
        amount: intent.amount,
        description: intent.description.clone(),
        category_id: resolution.category_id,
        account_id: resolution.account.as_ref().map(|a| a.id),
        date: None,
        source: SOURCE.to_string(),
        source_message_id: Some(message_id.to_string()),
    };
    ledger.process_transaction(&write).await
}

/// The latest `limit` incomes and expenses, newest first.
///
/// Two independent reads merged in memory; not a consistent snapshot.
pub(super) async fn statement(
    ledger: &dyn LedgerRpc,
    user_id: &str,
    limit: i64,
) -> Result<Vec<StatementEntry>, TallyError> {
    let expenses = ledger
        .recent_transactions(user_id, IntentKind::Expense, limit)
        .await?;
    let incomes = ledger
        .recent_transactions(user_id, IntentKind::Income, limit)
        .await?;

    let mut entries: Vec<StatementEntry> = expenses.into_iter().chain(incomes).collect();
    entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    entries.truncate(usize::try_from(limit).unwrap_or(0));
    Ok(entries)
}
