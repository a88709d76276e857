//! Atomic ledger operations.
//!
//! `process_transaction` inserts the row and moves the account balance inside
//! one SQL transaction, so neither is ever observable without the other.

use super::Store;
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{Sqlite, Transaction};
use tally_core::{
    error::TallyError,
    intent::IntentKind,
    ledger::{from_cents, to_cents, AccountKind, LedgerWrite, StatementEntry, TransactionOutcome},
    traits::LedgerRpc,
};
use tracing::{debug, info};

const LIQUID_BALANCE_SQL: &str = "SELECT COALESCE(SUM(balance_cents), 0) FROM accounts \
     WHERE user_id = ? AND active = 1 AND kind != 'credit_card'";

/// Signed balance change for an account of `kind`.
///
/// Credit cards track the open bill: expenses grow it, incomes (payments) shrink it.
fn balance_delta(kind: IntentKind, account: AccountKind, cents: i64) -> i64 {
    match (account, kind) {
        (AccountKind::CreditCard, IntentKind::Expense) => cents,
        (AccountKind::CreditCard, _) => -cents,
        (_, IntentKind::Income) => cents,
        _ => -cents,
    }
}

fn parse_created_at(raw: &str) -> chrono::DateTime<Utc> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .map(|dt| dt.and_utc())
        .unwrap_or_else(|_| Utc::now())
}

async fn liquid_balance_in(
    tx: &mut Transaction<'_, Sqlite>,
    user_id: &str,
) -> Result<i64, TallyError> {
    sqlx::query_scalar(LIQUID_BALANCE_SQL)
        .bind(user_id)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| TallyError::Transaction(format!("balance query failed: {e}")))
}

#[async_trait]
impl LedgerRpc for Store {
    async fn process_transaction(
        &self,
        write: &LedgerWrite,
    ) -> Result<TransactionOutcome, TallyError> {
        if !write.kind.is_transaction() {
            return Err(TallyError::Transaction(format!(
                "cannot record a {} as a transaction",
                write.kind.as_str()
            )));
        }
        let cents = to_cents(write.amount).ok_or_else(|| {
            TallyError::Transaction(format!("amount out of range: {}", write.amount))
        })?;
        if cents <= 0 {
            return Err(TallyError::Transaction(format!(
                "amount must be positive, got {}",
                write.amount
            )));
        }
        let date = write.date.unwrap_or_else(|| Utc::now().date_naive());

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| TallyError::Transaction(format!("begin failed: {e}")))?;

        let account = match write.account_id {
            Some(account_id) => {
                let row: Option<(String, String)> = sqlx::query_as(
                    "SELECT name, kind FROM accounts WHERE id = ? AND user_id = ? AND active = 1",
                )
                .bind(account_id)
                .bind(&write.user_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| TallyError::Transaction(format!("account lookup failed: {e}")))?;
                let (name, kind) = row.ok_or_else(|| {
                    TallyError::Transaction(format!("account {account_id} not found"))
                })?;
                Some((account_id, name, AccountKind::parse(&kind)))
            }
            None => None,
        };

        sqlx::query(
            "INSERT INTO transactions (user_id, type, amount_cents, description, category_id, \
             account_id, date, source, source_message_id) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&write.user_id)
        .bind(write.kind.as_str())
        .bind(cents)
        .bind(&write.description)
        .bind(write.category_id)
        .bind(write.account_id)
        .bind(date.format("%Y-%m-%d").to_string())
        .bind(&write.source)
        .bind(&write.source_message_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => TallyError::Transaction(
                format!(
                    "transaction already recorded for message {}",
                    write.source_message_id.as_deref().unwrap_or("-")
                ),
            ),
            _ => TallyError::Transaction(format!("insert failed: {e}")),
        })?;

        let outcome = match account {
            Some((account_id, name, kind)) => {
                let delta = balance_delta(write.kind, kind, cents);
                let new_cents: i64 = sqlx::query_scalar(
                    "UPDATE accounts SET balance_cents = balance_cents + ? WHERE id = ? \
                     RETURNING balance_cents",
                )
                .bind(delta)
                .bind(account_id)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| TallyError::Transaction(format!("balance update failed: {e}")))?;

                TransactionOutcome {
                    new_balance: from_cents(new_cents),
                    is_credit_card: kind == AccountKind::CreditCard,
                    destination_name: Some(name),
                }
            }
            None => TransactionOutcome {
                new_balance: from_cents(liquid_balance_in(&mut tx, &write.user_id).await?),
                is_credit_card: false,
                destination_name: None,
            },
        };

        tx.commit()
            .await
            .map_err(|e| TallyError::Transaction(format!("commit failed: {e}")))?;

        info!(
            "ledger: {} of {} recorded for {} (account: {})",
            write.kind.as_str(),
            write.amount,
            write.user_id,
            outcome.destination_name.as_deref().unwrap_or("none")
        );
        Ok(outcome)
    }

    async fn liquid_balance(&self, user_id: &str) -> Result<Decimal, TallyError> {
        let cents: i64 = sqlx::query_scalar(LIQUID_BALANCE_SQL)
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| TallyError::Transaction(format!("balance query failed: {e}")))?;
        Ok(from_cents(cents))
    }

    async fn recent_transactions(
        &self,
        user_id: &str,
        kind: IntentKind,
        limit: i64,
    ) -> Result<Vec<StatementEntry>, TallyError> {
        let rows: Vec<(i64, String, Option<String>, String, String)> = sqlx::query_as(
            "SELECT t.amount_cents, t.description, c.name, t.date, t.created_at \
             FROM transactions t LEFT JOIN categories c ON c.id = t.category_id \
             WHERE t.user_id = ? AND t.type = ? \
             ORDER BY t.created_at DESC, t.id DESC LIMIT ?",
        )
        .bind(user_id)
        .bind(kind.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| TallyError::Transaction(format!("statement query failed: {e}")))?;

        debug!("ledger: {} {} rows for {user_id}", rows.len(), kind.as_str());

        Ok(rows
            .into_iter()
            .map(|(cents, description, category, date, created_at)| {
                let created_at = parse_created_at(&created_at);
                StatementEntry {
                    kind,
                    amount: from_cents(cents),
                    description,
                    category,
                    date: NaiveDate::parse_from_str(&date, "%Y-%m-%d")
                        .unwrap_or_else(|_| created_at.date_naive()),
                    created_at,
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balance_delta_directions() {
        assert_eq!(balance_delta(IntentKind::Expense, AccountKind::Checking, 500), -500);
        assert_eq!(balance_delta(IntentKind::Income, AccountKind::Checking, 500), 500);
        assert_eq!(balance_delta(IntentKind::Expense, AccountKind::CreditCard, 500), 500);
        assert_eq!(balance_delta(IntentKind::Income, AccountKind::CreditCard, 500), -500);
    }

    #[test]
    fn test_parse_created_at_with_millis() {
        let dt = parse_created_at("2026-03-01 12:30:45.123");
        assert_eq!(dt.format("%Y-%m-%d %H:%M:%S").to_string(), "2026-03-01 12:30:45");
    }
}
