//! Categories and accounts.

use super::Store;
use async_trait::async_trait;
use tally_core::{
    error::TallyError,
    intent::IntentKind,
    ledger::{Account, AccountKind, Category},
    traits::CatalogRepo,
};

impl Store {
    /// All categories of one type. Names are compared in Rust since SQLite's
    /// `lower()` only folds ASCII.
    async fn categories_of(
        &self,
        user_id: &str,
        kind: IntentKind,
    ) -> Result<Vec<Category>, TallyError> {
        let rows: Vec<(i64, String)> = sqlx::query_as(
            "SELECT id, name FROM categories WHERE user_id = ? AND type = ? ORDER BY id",
        )
        .bind(user_id)
        .bind(kind.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| TallyError::Storage(format!("category query failed: {e}")))?;

        Ok(rows
            .into_iter()
            .map(|(id, name)| Category { id, name })
            .collect())
    }
}

fn to_account((id, name, kind): (i64, String, String)) -> Account {
    Account {
        id,
        name,
        kind: AccountKind::parse(&kind),
    }
}

#[async_trait]
impl CatalogRepo for Store {
    async fn find_category(
        &self,
        user_id: &str,
        name: &str,
        kind: IntentKind,
    ) -> Result<Option<Category>, TallyError> {
        let wanted = name.trim().to_lowercase();
        if wanted.is_empty() {
            return Ok(None);
        }
        Ok(self
            .categories_of(user_id, kind)
            .await?
            .into_iter()
            .find(|c| c.name.trim().to_lowercase() == wanted))
    }

    async fn find_category_containing(
        &self,
        user_id: &str,
        marker: &str,
        kind: IntentKind,
    ) -> Result<Option<Category>, TallyError> {
        let marker = marker.to_lowercase();
        if marker.is_empty() {
            return Ok(None);
        }
        Ok(self
            .categories_of(user_id, kind)
            .await?
            .into_iter()
            .find(|c| c.name.to_lowercase().contains(&marker)))
    }

    async fn find_account_by_kind(
        &self,
        user_id: &str,
        kind: AccountKind,
    ) -> Result<Option<Account>, TallyError> {
        let row: Option<(i64, String, String)> = sqlx::query_as(
            "SELECT id, name, kind FROM accounts WHERE user_id = ? AND kind = ? AND active = 1 \
             ORDER BY is_default DESC, id ASC LIMIT 1",
        )
        .bind(user_id)
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| TallyError::Storage(format!("account query failed: {e}")))?;

        Ok(row.map(to_account))
    }

    async fn find_default_account(&self, user_id: &str) -> Result<Option<Account>, TallyError> {
        let row: Option<(i64, String, String)> = sqlx::query_as(
            "SELECT id, name, kind FROM accounts WHERE user_id = ? AND is_default = 1 \
             AND active = 1 ORDER BY id ASC LIMIT 1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| TallyError::Storage(format!("account query failed: {e}")))?;

        Ok(row.map(to_account))
    }
}
