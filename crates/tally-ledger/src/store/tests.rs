use super::Store;
use rust_decimal::Decimal;
use serde_json::json;
use std::str::FromStr;
use tally_core::{
    error::TallyError,
    intent::IntentKind,
    ledger::{AccountKind, LedgerWrite, LogUpdate},
    message::MessageKind,
    traits::{CatalogRepo, IdentityLinkRepo, LedgerRpc, MessageLogRepo},
};

async fn test_store() -> Store {
    Store::in_memory().await.unwrap()
}

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

async fn add_link(store: &Store, user: &str, phone: &str, linked: Option<&str>, verified: bool) -> i64 {
    sqlx::query_scalar(
        "INSERT INTO identity_links (user_id, phone_number, linked_id, verified) \
         VALUES (?, ?, ?, ?) RETURNING id",
    )
    .bind(user)
    .bind(phone)
    .bind(linked)
    .bind(verified)
    .fetch_one(store.pool())
    .await
    .unwrap()
}

async fn add_category(store: &Store, user: &str, name: &str, kind: &str) -> i64 {
    sqlx::query_scalar("INSERT INTO categories (user_id, name, type) VALUES (?, ?, ?) RETURNING id")
        .bind(user)
        .bind(name)
        .bind(kind)
        .fetch_one(store.pool())
        .await
        .unwrap()
}

async fn add_account(
    store: &Store,
    user: &str,
    name: &str,
    kind: &str,
    balance_cents: i64,
    is_default: bool,
) -> i64 {
    sqlx::query_scalar(
        "INSERT INTO accounts (user_id, name, kind, balance_cents, is_default) \
         VALUES (?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(user)
    .bind(name)
    .bind(kind)
    .bind(balance_cents)
    .bind(is_default)
    .fetch_one(store.pool())
    .await
    .unwrap()
}

fn expense(user: &str, amount: &str, account_id: Option<i64>, message_id: &str) -> LedgerWrite {
    LedgerWrite {
        user_id: user.into(),
        kind: IntentKind::Expense,
        amount: dec(amount),
        description: "lunch".into(),
        category_id: None,
        account_id,
        date: None,
        source: "whatsapp".into(),
        source_message_id: Some(message_id.into()),
    }
}

// --- migrations ---

#[tokio::test]
async fn test_migrations_are_idempotent() {
    let store = test_store().await;
    Store::run_migrations(store.pool()).await.unwrap();
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM _migrations")
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(count, 1);
}

// --- message log ---

#[tokio::test]
async fn test_message_log_insert_once() {
    let store = test_store().await;
    let raw = json!({"data": {"key": {"id": "M1"}}});
    assert!(store.insert_if_new("M1", &MessageKind::Text, &raw).await.unwrap());
    assert!(!store.insert_if_new("M1", &MessageKind::Text, &raw).await.unwrap());
    assert!(store.insert_if_new("M2", &MessageKind::Audio, &raw).await.unwrap());

    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM message_log")
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(count, 2);
}

#[tokio::test]
async fn test_concurrent_inserts_admit_exactly_one() {
    let store = test_store().await;
    let raw = json!({});
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = store.clone();
            let raw = raw.clone();
            tokio::spawn(async move {
                store
                    .insert_if_new("RACE", &MessageKind::Text, &raw)
                    .await
                    .unwrap()
            })
        })
        .collect();

    let mut admitted = 0;
    for h in handles {
        if h.await.unwrap() {
            admitted += 1;
        }
    }
    assert_eq!(admitted, 1);
}

#[tokio::test]
async fn test_message_log_complete_records_result_and_error() {
    let store = test_store().await;
    store
        .insert_if_new("M3", &MessageKind::Image, &json!({}))
        .await
        .unwrap();
    store
        .complete(
            "M3",
            &LogUpdate {
                user_id: Some("user-1".into()),
                result: Some(json!({"type": "expense"})),
                processed: true,
                error: Some("vision failure: timeout".into()),
            },
        )
        .await
        .unwrap();

    let (user, result, processed, error, kind): (String, String, bool, String, String) =
        sqlx::query_as(
            "SELECT user_id, result, processed, error, message_type FROM message_log WHERE message_id = 'M3'",
        )
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(user, "user-1");
    assert_eq!(result, r#"{"type":"expense"}"#);
    assert!(processed);
    assert!(error.contains("timeout"));
    assert_eq!(kind, "image");

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.messages, 1);
    assert_eq!(stats.failed_messages, 1);
}

// --- identity ---

#[tokio::test]
async fn test_find_by_phones_prefers_verified() {
    let store = test_store().await;
    add_link(&store, "stale", "5511987654321", None, false).await;
    add_link(&store, "real", "551187654321", None, true).await;
    add_link(&store, "other", "5521999990000", None, true).await;

    let links = store
        .find_by_phones(&["5511987654321".into(), "551187654321".into()])
        .await
        .unwrap();
    assert_eq!(links.len(), 2);
    assert_eq!(links[0].user_id, "real");
    assert!(links[0].verified);
    assert!(!links[1].verified);

    assert!(store.find_by_phones(&[]).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_linked_id_lookup_and_alias_persistence() {
    let store = test_store().await;
    let id = add_link(&store, "u1", "5511987654321", None, true).await;

    assert!(store.find_by_linked_id("123456@lid").await.unwrap().is_none());
    store.set_linked_id(id, "123456@lid").await.unwrap();

    let link = store.find_by_linked_id("123456@lid").await.unwrap().unwrap();
    assert_eq!(link.user_id, "u1");
    assert_eq!(link.linked_id.as_deref(), Some("123456@lid"));
    assert_eq!(store.stats().await.unwrap().verified_links, 1);
}

// --- catalog ---

#[tokio::test]
async fn test_category_match_is_case_insensitive_and_typed() {
    let store = test_store().await;
    let food = add_category(&store, "u1", "Alimentação", "expense").await;
    add_category(&store, "u1", "Salário", "income").await;
    add_category(&store, "u2", "Transporte", "expense").await;

    let found = store
        .find_category("u1", "ALIMENTAÇÃO", IntentKind::Expense)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id, food);

    assert!(store
        .find_category("u1", "salário", IntentKind::Expense)
        .await
        .unwrap()
        .is_none());
    assert!(store
        .find_category("u1", "transporte", IntentKind::Expense)
        .await
        .unwrap()
        .is_none());
    assert!(store
        .find_category("u1", "  ", IntentKind::Expense)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_category_marker_fallback() {
    let store = test_store().await;
    let misc = add_category(&store, "u1", "Misc expenses", "expense").await;
    let found = store
        .find_category_containing("u1", "misc", IntentKind::Expense)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id, misc);
    assert!(store
        .find_category_containing("u1", "misc", IntentKind::Income)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_account_lookup_by_kind_and_default() {
    let store = test_store().await;
    let checking = add_account(&store, "u1", "Bank", "checking", 0, false).await;
    let card = add_account(&store, "u1", "Visa", "credit_card", 0, false).await;
    let wallet = add_account(&store, "u1", "Wallet", "cash", 0, true).await;

    let acc = store
        .find_account_by_kind("u1", AccountKind::CreditCard)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(acc.id, card);
    assert_eq!(acc.kind, AccountKind::CreditCard);

    let acc = store
        .find_account_by_kind("u1", AccountKind::Checking)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(acc.id, checking);

    assert!(store
        .find_account_by_kind("u1", AccountKind::Savings)
        .await
        .unwrap()
        .is_none());

    let default = store.find_default_account("u1").await.unwrap().unwrap();
    assert_eq!(default.id, wallet);
    assert!(store.find_default_account("u2").await.unwrap().is_none());
}

#[tokio::test]
async fn test_inactive_accounts_are_skipped() {
    let store = test_store().await;
    let id = add_account(&store, "u1", "Old bank", "checking", 10_000, true).await;
    sqlx::query("UPDATE accounts SET active = 0 WHERE id = ?")
        .bind(id)
        .execute(store.pool())
        .await
        .unwrap();

    assert!(store.find_default_account("u1").await.unwrap().is_none());
    assert_eq!(store.liquid_balance("u1").await.unwrap(), Decimal::ZERO);
}

// --- ledger ---

#[tokio::test]
async fn test_expense_moves_checking_balance() {
    let store = test_store().await;
    let acc = add_account(&store, "u1", "Bank", "checking", 100_000, true).await;

    let outcome = store
        .process_transaction(&expense("u1", "50", Some(acc), "M1"))
        .await
        .unwrap();
    assert_eq!(outcome.new_balance, dec("950.00"));
    assert!(!outcome.is_credit_card);
    assert_eq!(outcome.destination_name.as_deref(), Some("Bank"));
    assert_eq!(store.liquid_balance("u1").await.unwrap(), dec("950.00"));
}

#[tokio::test]
async fn test_credit_card_expense_grows_bill_and_not_liquid() {
    let store = test_store().await;
    add_account(&store, "u1", "Bank", "checking", 20_000, true).await;
    let card = add_account(&store, "u1", "Visa", "credit_card", 5_000, false).await;

    let outcome = store
        .process_transaction(&expense("u1", "30.50", Some(card), "M1"))
        .await
        .unwrap();
    assert!(outcome.is_credit_card);
    assert_eq!(outcome.new_balance, dec("80.50"));
    assert_eq!(store.liquid_balance("u1").await.unwrap(), dec("200.00"));
}

#[tokio::test]
async fn test_income_without_account_reports_liquid_balance() {
    let store = test_store().await;
    add_account(&store, "u1", "Bank", "checking", 12_345, true).await;

    let mut write = expense("u1", "1000", None, "M1");
    write.kind = IntentKind::Income;
    let outcome = store.process_transaction(&write).await.unwrap();
    assert_eq!(outcome.new_balance, dec("123.45"));
    assert!(outcome.destination_name.is_none());
    assert_eq!(store.stats().await.unwrap().transactions, 1);
}

#[tokio::test]
async fn test_same_message_id_writes_once() {
    let store = test_store().await;
    let acc = add_account(&store, "u1", "Bank", "checking", 10_000, true).await;

    store
        .process_transaction(&expense("u1", "10", Some(acc), "DUP"))
        .await
        .unwrap();
    let err = store
        .process_transaction(&expense("u1", "10", Some(acc), "DUP"))
        .await
        .unwrap_err();
    assert!(matches!(err, TallyError::Transaction(_)));
    assert!(err.to_string().contains("already recorded"));

    // The failed second write rolled back its balance change.
    assert_eq!(store.liquid_balance("u1").await.unwrap(), dec("90.00"));
}

#[tokio::test]
async fn test_rejects_zero_amount_and_queries() {
    let store = test_store().await;
    let err = store
        .process_transaction(&expense("u1", "0", None, "Z"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("positive"));

    let mut write = expense("u1", "10", None, "Q");
    write.kind = IntentKind::BalanceQuery;
    assert!(store.process_transaction(&write).await.is_err());
}

#[tokio::test]
async fn test_rejects_amount_beyond_cents_range() {
    let store = test_store().await;
    let err = store
        .process_transaction(&expense("u1", "79228162514264337593543950335", None, "BIG"))
        .await
        .unwrap_err();
    assert!(matches!(err, TallyError::Transaction(_)));
    assert!(err.to_string().contains("out of range"));
    assert_eq!(store.stats().await.unwrap().transactions, 0);
}

#[tokio::test]
async fn test_foreign_account_is_rejected() {
    let store = test_store().await;
    let acc = add_account(&store, "u2", "Someone else", "checking", 0, true).await;
    let err = store
        .process_transaction(&expense("u1", "10", Some(acc), "X"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("not found"));
    assert_eq!(store.stats().await.unwrap().transactions, 0);
}

#[tokio::test]
async fn test_recent_transactions_newest_first_with_category() {
    let store = test_store().await;
    let food = add_category(&store, "u1", "Food", "expense").await;

    for (i, amount) in ["10", "20", "30"].iter().enumerate() {
        let mut write = expense("u1", amount, None, &format!("M{i}"));
        write.category_id = Some(food);
        write.description = format!("item {i}");
        store.process_transaction(&write).await.unwrap();
    }
    let mut income = expense("u1", "99", None, "INC");
    income.kind = IntentKind::Income;
    store.process_transaction(&income).await.unwrap();

    let rows = store
        .recent_transactions("u1", IntentKind::Expense, 2)
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].description, "item 2");
    assert_eq!(rows[0].amount, dec("30.00"));
    assert_eq!(rows[0].category.as_deref(), Some("Food"));
    assert_eq!(rows[1].description, "item 1");
    assert!(rows.iter().all(|r| r.kind == IntentKind::Expense));

    let incomes = store
        .recent_transactions("u1", IntentKind::Income, 10)
        .await
        .unwrap();
    assert_eq!(incomes.len(), 1);
    assert!(incomes[0].category.is_none());
}
