//! Webhook idempotency log.

use super::Store;
use async_trait::async_trait;
use tally_core::{
    error::TallyError, ledger::LogUpdate, message::MessageKind, traits::MessageLogRepo,
};

#[async_trait]
impl MessageLogRepo for Store {
    async fn insert_if_new(
        &self,
        message_id: &str,
        kind: &MessageKind,
        raw: &serde_json::Value,
    ) -> Result<bool, TallyError> {
        let result = sqlx::query(
            "INSERT INTO message_log (message_id, message_type, raw_payload) VALUES (?, ?, ?) \
             ON CONFLICT(message_id) DO NOTHING",
        )
        .bind(message_id)
        .bind(kind.as_str())
        .bind(raw.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| TallyError::Storage(format!("message log insert failed: {e}")))?;

        Ok(result.rows_affected() == 1)
    }

    async fn complete(&self, message_id: &str, update: &LogUpdate) -> Result<(), TallyError> {
        let result_json = update.result.as_ref().map(|v| v.to_string());
        sqlx::query(
            "UPDATE message_log SET user_id = COALESCE(?, user_id), result = ?, processed = ?, \
             error = ?, updated_at = datetime('now') WHERE message_id = ?",
        )
        .bind(&update.user_id)
        .bind(result_json)
        .bind(update.processed)
        .bind(&update.error)
        .bind(message_id)
        .execute(&self.pool)
        .await
        .map_err(|e| TallyError::Storage(format!("message log update failed: {e}")))?;

        Ok(())
    }
}
