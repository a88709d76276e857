//! SQLite-backed ledger store.
//!
//! Split into focused submodules:
//! - `message_log`: webhook idempotency log
//! - `identity`: sender identity links
//! - `catalog`: categories and accounts
//! - `ledger`: atomic transaction writes, balance and statement reads

mod catalog;
mod identity;
mod ledger;
mod message_log;

use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use tally_core::{config::LedgerConfig, error::TallyError, shellexpand};
use tracing::info;

/// Ledger store backed by SQLite.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

/// Row counts reported by `tally status`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LedgerStats {
    pub messages: i64,
    pub failed_messages: i64,
    pub transactions: i64,
    pub verified_links: i64,
}

impl Store {
    /// Open the database file, running migrations on first use.
    pub async fn new(config: &LedgerConfig) -> Result<Self, TallyError> {
        let db_path = shellexpand(&config.db_path);

        if let Some(parent) = std::path::Path::new(&db_path).parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| TallyError::Storage(format!("failed to create data dir: {e}")))?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{db_path}"))
            .map_err(|e| TallyError::Storage(format!("invalid db path: {e}")))?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(opts)
            .await
            .map_err(|e| TallyError::Storage(format!("failed to connect to sqlite: {e}")))?;

        Self::run_migrations(&pool).await?;
        info!("ledger: store initialized at {db_path}");

        Ok(Self { pool })
    }

    /// A private in-memory database with the schema applied.
    pub async fn in_memory() -> Result<Self, TallyError> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| TallyError::Storage(format!("invalid db path: {e}")))?
            .foreign_keys(true);
        // One connection: every new in-memory connection is a fresh database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await
            .map_err(|e| TallyError::Storage(format!("failed to open in-memory sqlite: {e}")))?;
        Self::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    /// Get a reference to the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn stats(&self) -> Result<LedgerStats, TallyError> {
        let (messages, failed_messages, transactions, verified_links): (i64, i64, i64, i64) =
            sqlx::query_as(
                "SELECT \
                   (SELECT COUNT(*) FROM message_log), \
                   (SELECT COUNT(*) FROM message_log WHERE error IS NOT NULL), \
                   (SELECT COUNT(*) FROM transactions), \
                   (SELECT COUNT(*) FROM identity_links WHERE verified = 1)",
            )
            .fetch_one(&self.pool)
            .await
            .map_err(|e| TallyError::Storage(format!("stats query failed: {e}")))?;

        Ok(LedgerStats {
            messages,
            failed_messages,
            transactions,
            verified_links,
        })
    }

    /// Run SQL migrations, tracking which have already been applied.
    async fn run_migrations(pool: &SqlitePool) -> Result<(), TallyError> {
        sqlx::raw_sql(
            "CREATE TABLE IF NOT EXISTS _migrations (
                name TEXT PRIMARY KEY,
                applied_at TEXT NOT NULL DEFAULT (datetime('now'))
            );",
        )
        .execute(pool)
        .await
        .map_err(|e| TallyError::Storage(format!("failed to create migrations table: {e}")))?;

        let migrations: &[(&str, &str)] =
            &[("001_init", include_str!("../../migrations/001_init.sql"))];

        for (name, sql) in migrations {
            let applied: Option<(String,)> =
                sqlx::query_as("SELECT name FROM _migrations WHERE name = ?")
                    .bind(name)
                    .fetch_optional(pool)
                    .await
                    .map_err(|e| {
                        TallyError::Storage(format!("failed to check migration {name}: {e}"))
                    })?;

            if applied.is_some() {
                continue;
            }

            sqlx::raw_sql(sql)
                .execute(pool)
                .await
                .map_err(|e| TallyError::Storage(format!("migration {name} failed: {e}")))?;

            sqlx::query("INSERT INTO _migrations (name) VALUES (?)")
                .bind(name)
                .execute(pool)
                .await
                .map_err(|e| {
                    TallyError::Storage(format!("failed to record migration {name}: {e}"))
                })?;
            info!("ledger: applied migration {name}");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;
