//! Data Access Layer
//!
//! Postgres persistence for conversation history. `Db` doubles as the
//! service's [`ConversationLog`] whenever `DATABASE_URL` is configured.

use anyhow::Result;
use async_trait::async_trait;
use dialer_core::{ConversationEntry, ConversationLog};
use sqlx::PgPool;

use crate::models::ConversationRow;

/// A wrapper around the `PgPool` to provide a clear data access interface.
#[derive(Clone)]
pub struct Db {
    pool: PgPool,
}

impl Db {
    /// Creates a new `Db` instance.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Runs all pending `sqlx` migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Stores one conversation entry and returns its row id.
    pub async fn insert_entry(&self, entry: &ConversationEntry) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO conversation_log (phone, role, message, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(&entry.phone)
        .bind(entry.role.as_str())
        .bind(&entry.message)
        .bind(entry.timestamp)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    /// The `limit` most recent entries for `phone`, oldest first.
    pub async fn recent_entries(&self, phone: &str, limit: i64) -> Result<Vec<ConversationEntry>> {
        let rows = sqlx::query_as::<_, ConversationRow>(
            r#"
            SELECT id, phone, role, message, created_at
            FROM (
                SELECT id, phone, role, message, created_at
                FROM conversation_log
                WHERE phone = $1
                ORDER BY created_at DESC, id DESC
                LIMIT $2
            ) recent
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(phone)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ConversationEntry::try_from).collect()
    }
}

#[async_trait]
impl ConversationLog for Db {
    async fn append(&self, entry: ConversationEntry) -> Result<()> {
        self.insert_entry(&entry).await?;
        Ok(())
    }
}
