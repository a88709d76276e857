//! Ledger-side records exchanged through the repository traits.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::intent::{IntentKind, PaymentMethod};

/// Maps an external sender identifier to an internal user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityLink {
    pub id: i64,
    pub user_id: String,
    /// Canonical phone number, digits only.
    pub phone_number: String,
    /// Opaque linked-id alias (`...@lid`), once observed.
    pub linked_id: Option<String>,
    pub verified: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    pub id: i64,
    pub name: String,
}

/// Kind of ledger account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountKind {
    Checking,
    Savings,
    CreditCard,
    Cash,
    Other,
}

impl AccountKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Checking => "checking",
            Self::Savings => "savings",
            Self::CreditCard => "credit_card",
            Self::Cash => "cash",
            Self::Other => "other",
        }
    }

    /// Parse the storage representation; unknown values map to `Other`.
    pub fn parse(s: &str) -> Self {
        match s {
            "checking" => Self::Checking,
            "savings" => Self::Savings,
            "credit_card" => Self::CreditCard,
            "cash" => Self::Cash,
            _ => Self::Other,
        }
    }

    /// Preferred account kind for a payment method, if there is a strong one.
    pub fn preferred_for(method: PaymentMethod) -> Option<Self> {
        match method {
            PaymentMethod::Credit => Some(Self::CreditCard),
            PaymentMethod::Cash => Some(Self::Cash),
            PaymentMethod::InstantTransfer | PaymentMethod::Debit | PaymentMethod::Bill => {
                Some(Self::Checking)
            }
            PaymentMethod::Undetermined => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: i64,
    pub name: String,
    pub kind: AccountKind,
}

/// Parameters of one atomic ledger write.
#[derive(Debug, Clone)]
pub struct LedgerWrite {
    pub user_id: String,
    pub kind: IntentKind,
    pub amount: Decimal,
    pub description: String,
    pub category_id: Option<i64>,
    pub account_id: Option<i64>,
    /// Defaults to today when `None`.
    pub date: Option<NaiveDate>,
    /// Origin tag stored on the row (e.g. `whatsapp`).
    pub source: String,
    /// External message id; the ledger refuses a second write for the same id.
    pub source_message_id: Option<String>,
}

/// What the ledger reports back after a write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionOutcome {
    pub new_balance: Decimal,
    pub is_credit_card: bool,
    /// Account name the money moved through, if any.
    pub destination_name: Option<String>,
}

/// One row of a statement reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementEntry {
    pub kind: IntentKind,
    pub amount: Decimal,
    pub description: String,
    pub category: Option<String>,
    pub date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

/// Final state written to a message-log row.
#[derive(Debug, Clone, Default)]
pub struct LogUpdate {
    pub user_id: Option<String>,
    /// Intent JSON, or a short marker such as `"Unverified"`.
    pub result: Option<serde_json::Value>,
    pub processed: bool,
    pub error: Option<String>,
}

/// Convert a decimal amount to integer cents (banker's rounding).
///
/// `None` when the amount does not fit in `i64` cents.
pub fn to_cents(amount: Decimal) -> Option<i64> {
    use rust_decimal::prelude::ToPrimitive;
    amount
        .round_dp(2)
        .checked_mul(Decimal::ONE_HUNDRED)?
        .trunc()
        .to_i64()
}

/// Convert integer cents back to a decimal amount.
pub fn from_cents(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}
