//! Structured financial intent produced by classification.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Largest amount, in whole units, a single transaction may carry.
pub const MAX_AMOUNT_UNITS: i64 = 1_000_000_000_000;

/// What the user wants to record or query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    #[serde(alias = "receita")]
    Income,
    #[serde(alias = "despesa")]
    Expense,
    #[serde(alias = "duvida")]
    Doubt,
    #[serde(alias = "balance", alias = "balance-query", alias = "saldo")]
    BalanceQuery,
    #[serde(alias = "statement", alias = "statement-query", alias = "extrato")]
    StatementQuery,
}

impl IntentKind {
    /// Whether this kind writes to the ledger.
    pub fn is_transaction(&self) -> bool {
        matches!(self, Self::Income | Self::Expense)
    }

    /// Ledger `type` column value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Income => "income",
            Self::Expense => "expense",
            Self::Doubt => "doubt",
            Self::BalanceQuery => "balance_query",
            Self::StatementQuery => "statement_query",
        }
    }
}

/// How the money moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[serde(alias = "pix")]
    InstantTransfer,
    Debit,
    Credit,
    #[serde(alias = "dinheiro")]
    Cash,
    #[serde(alias = "boleto")]
    Bill,
    #[default]
    #[serde(other)]
    Undetermined,
}

/// Whether the intent carries everything needed to write a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Completeness {
    #[default]
    Ok,
    #[serde(alias = "incompleto")]
    Incomplete,
}

/// The classifier's output. Lives only for the duration of one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialIntent {
    #[serde(rename = "type")]
    pub kind: IntentKind,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub amount: Decimal,
    #[serde(default)]
    pub description: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub category: String,
    #[serde(default)]
    pub payment_method: PaymentMethod,
    #[serde(default, rename = "status")]
    pub completeness: Completeness,
}

impl FinancialIntent {
    /// A query intent (balance or statement) with no amount or description.
    pub fn query(kind: IntentKind) -> Self {
        Self {
            kind,
            amount: Decimal::ZERO,
            description: String::new(),
            category: String::new(),
            payment_method: PaymentMethod::Undetermined,
            completeness: Completeness::Ok,
        }
    }

    /// Enforce the completeness rules regardless of what the model claimed.
    ///
    /// - income/expense without at least one cent is incomplete
    /// - amounts above [`MAX_AMOUNT_UNITS`] are incomplete
    /// - income/expense never has an empty description
    /// - queries carry amount 0 and no description
    pub fn normalized(mut self) -> Self {
        match self.kind {
            IntentKind::Income | IntentKind::Expense => {
                if self.amount.is_sign_negative() {
                    self.amount = self.amount.abs();
                }
                if self.amount.round_dp(2).is_zero()
                    || self.amount > Decimal::from(MAX_AMOUNT_UNITS)
                {
                    self.completeness = Completeness::Incomplete;
                }
                let trimmed = self.description.trim();
                self.description = if trimmed.is_empty() {
                    match self.kind {
                        IntentKind::Income => "general income".to_string(),
                        _ => "general expense".to_string(),
                    }
                } else {
                    trimmed.to_string()
                };
                self.category = self.category.trim().to_string();
            }
            IntentKind::BalanceQuery | IntentKind::StatementQuery => {
                self.amount = Decimal::ZERO;
                self.description.clear();
                self.category.clear();
                self.completeness = Completeness::Ok;
            }
            IntentKind::Doubt => {}
        }
        self
    }

    /// Whether a transaction may be written from this intent.
    pub fn is_actionable(&self) -> bool {
        self.kind.is_transaction() && self.completeness == Completeness::Ok
    }
}

/// Accept numbers, numeric strings ("50", "50,90", "R$ 12.30") and null.
fn lenient_amount<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.to_string().parse().unwrap_or(Decimal::ZERO),
        Some(serde_json::Value::String(s)) => parse_amount(&s).unwrap_or(Decimal::ZERO),
        _ => Decimal::ZERO,
    })
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Parse a user-typed amount, tolerating a currency prefix and a decimal comma.
pub fn parse_amount(raw: &str) -> Option<Decimal> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',' || *c == '-')
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    // "1.234,56" → "1234.56"; "50,90" → "50.90"; "1.500" → "1500"
    let normalized = match (cleaned.rfind(','), cleaned.rfind('.')) {
        (Some(c), Some(d)) if c > d => cleaned.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => cleaned.replace(',', ""),
        (Some(_), None) => cleaned.replace(',', "."),
        (None, Some(_)) if is_dot_grouped(&cleaned) => cleaned.replace('.', ""),
        _ => cleaned,
    };
    normalized.parse().ok()
}

/// Whether every `.` separates a group of exactly three digits, as in
/// "1.000" or "12.500.000". A leading zero group ("0.500") stays decimal.
fn is_dot_grouped(s: &str) -> bool {
    let digits = s.strip_prefix('-').unwrap_or(s);
    let mut groups = digits.split('.');
    let Some(head) = groups.next() else {
        return false;
    };
    if head.is_empty() || head.len() > 3 || head.starts_with('0') {
        return false;
    }
    let mut seen = false;
    for group in groups {
        if group.len() != 3 {
            return false;
        }
        seen = true;
    }
    seen
}
