//! Outbound reply templates.

use super::resolver::Resolution;
use rust_decimal::Decimal;
use tally_core::{
    intent::{FinancialIntent, IntentKind},
    ledger::{StatementEntry, TransactionOutcome},
};

/// `R$ 50.00`: symbol, space, two decimals.
pub(crate) fn money(symbol: &str, amount: Decimal) -> String {
    let rounded = amount.round_dp(2);
    if rounded.is_sign_negative() && !rounded.is_zero() {
        format!("-{symbol} {:.2}", rounded.abs())
    } else {
        format!("{symbol} {:.2}", rounded.abs())
    }
}

/// Confirmation after a ledger write.
pub(super) fn transaction_recorded(
    symbol: &str,
    intent: &FinancialIntent,
    resolution: &Resolution,
    outcome: &TransactionOutcome,
) -> String {
    let (icon, title) = match intent.kind {
        IntentKind::Income => ("\u{1f4b0}", "Income recorded"),
        _ => ("\u{1f4b8}", "Expense recorded"),
    };
    let mut lines = vec![
        format!("\u{2705} {title}"),
        String::new(),
        format!(
            "{icon} {} \u{00b7} {}",
            money(symbol, intent.amount),
            intent.description
        ),
    ];
    if let Some(category) = &resolution.category_name {
        lines.push(format!("\u{1f3f7}\u{fe0f} {category}"));
    }
    if let Some(account) = &outcome.destination_name {
        lines.push(format!("\u{1f3e6} {account}"));
    }
    lines.push(String::new());
    if outcome.is_credit_card {
        lines.push(format!(
            "\u{1f4b3} Card bill: {}",
            money(symbol, outcome.new_balance)
        ));
    } else {
        lines.push(format!(
            "\u{1f4b0} Balance: {}",
            money(symbol, outcome.new_balance)
        ));
    }
    lines.join("\n")
}

pub(super) fn balance(symbol: &str, liquid: Decimal) -> String {
    format!(
        "\u{1f4b0} Your available balance is {}",
        money(symbol, liquid)
    )
}

pub(super) fn statement(symbol: &str, entries: &[StatementEntry]) -> String {
    if entries.is_empty() {
        return "\u{1f4cb} No transactions recorded yet.".to_string();
    }
    let mut out = String::from("\u{1f4cb} Latest transactions\n");
    for entry in entries {
        let (dot, sign) = match entry.kind {
            IntentKind::Income => ("\u{1f7e2}", "+"),
            _ => ("\u{1f534}", "-"),
        };
        out.push_str(&format!(
            "\n{dot} {} {} {sign}{}",
            entry.date.format("%d/%m"),
            entry.description,
            money(symbol, entry.amount)
        ));
        if let Some(category) = &entry.category {
            out.push_str(&format!(" ({category})"));
        }
    }
    out
}

/// Ask for what is missing instead of guessing.
pub(super) fn clarification(intent: &FinancialIntent) -> String {
    match intent.kind {
        IntentKind::Income | IntentKind::Expense => format!(
            "\u{1f914} I understood an {} for \"{}\" but not the amount. How much was it?",
            intent.kind.as_str(),
            intent.description
        ),
        _ => "\u{1f914} I couldn't tell what to record. Try something like \"spent 50 on lunch\", \
              \"received 1000 salary\", \"balance\" or \"statement\"."
            .to_string(),
    }
}

pub(super) fn audio_failure() -> String {
    "\u{1f615} Sorry, there was an error processing audio. Please try again or type the transaction."
        .to_string()
}

pub(super) fn image_failure() -> String {
    "\u{1f615} Sorry, I couldn't read that image. Please try again or type the transaction."
        .to_string()
}

pub(super) fn not_understood() -> String {
    "\u{1f615} Sorry, I couldn't understand that message. Try something like \"spent 50 on lunch\"."
        .to_string()
}

pub(super) fn transaction_failure() -> String {
    "\u{26a0}\u{fe0f} I could not confirm the transaction. Check your statement before sending it again."
        .to_string()
}

pub(super) fn unsupported_message() -> String {
    "\u{1f4ac} I can read text messages, voice notes and images of receipts.".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};
    use std::str::FromStr;
    use tally_core::intent::{Completeness, PaymentMethod};

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn expense(amount: &str, description: &str) -> FinancialIntent {
        FinancialIntent {
            kind: IntentKind::Expense,
            amount: dec(amount),
            description: description.into(),
            category: "Food".into(),
            payment_method: PaymentMethod::Debit,
            completeness: Completeness::Ok,
        }
    }

    #[test]
    fn test_money_two_decimals() {
        assert_eq!(money("R$", dec("50")), "R$ 50.00");
        assert_eq!(money("R$", dec("1234.5")), "R$ 1234.50");
        assert_eq!(money("$", dec("0.005")), "$ 0.00");
        assert_eq!(money("R$", dec("-12.3")), "-R$ 12.30");
    }

    #[test]
    fn test_transaction_recorded_checking() {
        let resolution = Resolution {
            category_id: Some(1),
            category_name: Some("Food".into()),
            account: None,
        };
        let outcome = TransactionOutcome {
            new_balance: dec("950"),
            is_credit_card: false,
            destination_name: Some("Bank".into()),
        };
        let text = transaction_recorded("R$", &expense("50", "lunch"), &resolution, &outcome);
        assert!(text.starts_with("\u{2705} Expense recorded"));
        assert!(text.contains("R$ 50.00 \u{00b7} lunch"));
        assert!(text.contains("Food"));
        assert!(text.contains("Bank"));
        assert!(text.contains("Balance: R$ 950.00"));
    }

    #[test]
    fn test_transaction_recorded_credit_card() {
        let outcome = TransactionOutcome {
            new_balance: dec("80.5"),
            is_credit_card: true,
            destination_name: Some("Visa".into()),
        };
        let text = transaction_recorded(
            "R$",
            &expense("30.5", "gas"),
            &Resolution::default(),
            &outcome,
        );
        assert!(text.contains("Card bill: R$ 80.50"));
        assert!(!text.contains("Balance:"));
    }

    #[test]
    fn test_statement_formatting() {
        assert!(statement("R$", &[]).contains("No transactions"));

        let entries = vec![
            StatementEntry {
                kind: IntentKind::Income,
                amount: dec("1000"),
                description: "salary".into(),
                category: Some("Salary".into()),
                date: NaiveDate::from_ymd_opt(2026, 3, 5).unwrap(),
                created_at: Utc.with_ymd_and_hms(2026, 3, 5, 9, 0, 0).unwrap(),
            },
            StatementEntry {
                kind: IntentKind::Expense,
                amount: dec("50"),
                description: "lunch".into(),
                category: None,
                date: NaiveDate::from_ymd_opt(2026, 3, 4).unwrap(),
                created_at: Utc.with_ymd_and_hms(2026, 3, 4, 12, 0, 0).unwrap(),
            },
        ];
        let text = statement("R$", &entries);
        assert!(text.contains("05/03 salary +R$ 1000.00 (Salary)"));
        assert!(text.contains("04/03 lunch -R$ 50.00"));
    }

    #[test]
    fn test_clarification_mentions_description() {
        let mut intent = expense("0", "lunch");
        intent.completeness = Completeness::Incomplete;
        assert!(clarification(&intent).contains("\"lunch\""));
        assert!(clarification(&FinancialIntent::query(IntentKind::Doubt)).contains("balance"));
    }

    #[test]
    fn test_audio_failure_wording() {
        assert!(audio_failure().contains("error processing audio"));
    }
}
