//! Sender identity links.

use super::Store;
use async_trait::async_trait;
use tally_core::{error::TallyError, ledger::IdentityLink, traits::IdentityLinkRepo};

type LinkRow = (i64, String, String, Option<String>, bool);

fn to_link((id, user_id, phone_number, linked_id, verified): LinkRow) -> IdentityLink {
    IdentityLink {
        id,
        user_id,
        phone_number,
        linked_id,
        verified,
    }
}

#[async_trait]
impl IdentityLinkRepo for Store {
    async fn find_by_linked_id(
        &self,
        linked_id: &str,
    ) -> Result<Option<IdentityLink>, TallyError> {
        let row: Option<LinkRow> = sqlx::query_as(
            "SELECT id, user_id, phone_number, linked_id, verified FROM identity_links \
             WHERE linked_id = ? ORDER BY verified DESC, id ASC LIMIT 1",
        )
        .bind(linked_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| TallyError::Storage(format!("identity lookup failed: {e}")))?;

        Ok(row.map(to_link))
    }

    async fn find_by_phones(&self, phones: &[String]) -> Result<Vec<IdentityLink>, TallyError> {
        if phones.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; phones.len()].join(", ");
        let sql = format!(
            "SELECT id, user_id, phone_number, linked_id, verified FROM identity_links \
             WHERE phone_number IN ({placeholders}) ORDER BY verified DESC, id ASC"
        );
        let mut query = sqlx::query_as::<_, LinkRow>(&sql);
        for phone in phones {
            query = query.bind(phone);
        }

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| TallyError::Storage(format!("identity lookup failed: {e}")))?;

        Ok(rows.into_iter().map(to_link).collect())
    }

    async fn set_linked_id(&self, link_id: i64, linked_id: &str) -> Result<(), TallyError> {
        sqlx::query("UPDATE identity_links SET linked_id = ? WHERE id = ?")
            .bind(linked_id)
            .bind(link_id)
            .execute(&self.pool)
            .await
            .map_err(|e| TallyError::Storage(format!("identity alias update failed: {e}")))?;
        Ok(())
    }
}
