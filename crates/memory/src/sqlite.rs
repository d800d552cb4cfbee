//! SQLite conversation store.
//!
//! `conversation_history` is ordered by its integer primary key; the tools
//! behind an assistant answer sit in its `tool_calls` column as JSON.
//! `favorites` holds saved queries. Timestamps are stored as RFC 3339 text.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ledgerclaw_core::error::HistoryError;
use ledgerclaw_core::history::{
    favorite_label, ConversationStore, ConversationSummary, Favorite, HistoryRecord, ToolUsage,
    RECENT_HISTORY_LIMIT,
};
use ledgerclaw_core::message::{ConversationId, Message, Role};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};

/// A durable conversation log backed by SQLite.
pub struct SqliteHistory {
    pool: SqlitePool,
}

impl SqliteHistory {
    /// Open (or create) the history database.
    ///
    /// Pass `"sqlite::memory:"` for an in-process ephemeral database.
    pub async fn new(path: &str) -> Result<Self, HistoryError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| HistoryError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        // Every connection to :memory: is a separate database
        let max_connections = if path.contains(":memory:") { 1 } else { 4 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| HistoryError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite history initialized at {path}");
        Ok(store)
    }

    /// Create from an existing pool (useful for testing).
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, HistoryError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), HistoryError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS conversation_history (
                id               INTEGER PRIMARY KEY AUTOINCREMENT,
                conversation_id  TEXT NOT NULL,
                role             TEXT NOT NULL,
                content          TEXT NOT NULL,
                tool_calls       TEXT,
                created_at       TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| HistoryError::MigrationFailed(format!("conversation_history table: {e}")))?;

        // Databases created before tool summaries were stored
        let columns: Vec<String> = sqlx::query_scalar("SELECT name FROM pragma_table_info('conversation_history')")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| HistoryError::MigrationFailed(format!("table info: {e}")))?;
        if !columns.iter().any(|c| c == "tool_calls") {
            sqlx::query("ALTER TABLE conversation_history ADD COLUMN tool_calls TEXT")
                .execute(&self.pool)
                .await
                .map_err(|e| HistoryError::MigrationFailed(format!("tool_calls column: {e}")))?;
        }

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS favorites (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                query       TEXT NOT NULL,
                label       TEXT NOT NULL,
                created_at  TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| HistoryError::MigrationFailed(format!("favorites table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_history_conversation ON conversation_history(conversation_id, id)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| HistoryError::MigrationFailed(format!("conversation index: {e}")))?;

        debug!("SQLite history migrations complete");
        Ok(())
    }

    fn parse_time(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now())
    }

    fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Result<HistoryRecord, HistoryError> {
        let seq: i64 = row
            .try_get("id")
            .map_err(|e| HistoryError::QueryFailed(format!("id column: {e}")))?;
        let conversation_id: String = row
            .try_get("conversation_id")
            .map_err(|e| HistoryError::QueryFailed(format!("conversation_id column: {e}")))?;
        let role: String = row
            .try_get("role")
            .map_err(|e| HistoryError::QueryFailed(format!("role column: {e}")))?;
        let content: String = row
            .try_get("content")
            .map_err(|e| HistoryError::QueryFailed(format!("content column: {e}")))?;
        let created_at: String = row
            .try_get("created_at")
            .map_err(|e| HistoryError::QueryFailed(format!("created_at column: {e}")))?;
        let tool_calls: Option<String> = row
            .try_get("tool_calls")
            .map_err(|e| HistoryError::QueryFailed(format!("tool_calls column: {e}")))?;
        let tool_calls = match tool_calls {
            Some(json) => serde_json::from_str(&json)
                .map_err(|e| HistoryError::QueryFailed(format!("tool_calls JSON: {e}")))?,
            None => Vec::new(),
        };

        Ok(HistoryRecord {
            seq,
            conversation_id: ConversationId(conversation_id),
            role: role.parse::<Role>().map_err(HistoryError::QueryFailed)?,
            content,
            tool_calls,
            timestamp: Self::parse_time(&created_at),
        })
    }

    fn row_to_favorite(row: &sqlx::sqlite::SqliteRow) -> Result<Favorite, HistoryError> {
        let created_at: String = row
            .try_get("created_at")
            .map_err(|e| HistoryError::QueryFailed(format!("created_at column: {e}")))?;
        Ok(Favorite {
            id: row
                .try_get("id")
                .map_err(|e| HistoryError::QueryFailed(format!("id column: {e}")))?,
            query: row
                .try_get("query")
                .map_err(|e| HistoryError::QueryFailed(format!("query column: {e}")))?,
            label: row
                .try_get("label")
                .map_err(|e| HistoryError::QueryFailed(format!("label column: {e}")))?,
            created_at: Self::parse_time(&created_at),
        })
    }

    async fn insert<'e, E>(
        executor: E,
        conversation_id: &ConversationId,
        role: Role,
        content: &str,
        tools: &[ToolUsage],
    ) -> Result<(), HistoryError>
    where
        E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
    {
        let tool_calls = if tools.is_empty() {
            None
        } else {
            Some(
                serde_json::to_string(tools)
                    .map_err(|e| HistoryError::Storage(format!("tool_calls JSON: {e}")))?,
            )
        };

        sqlx::query(
            "INSERT INTO conversation_history (conversation_id, role, content, tool_calls, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(conversation_id.as_str())
        .bind(role.as_str())
        .bind(content)
        .bind(tool_calls)
        .bind(Utc::now().to_rfc3339())
        .execute(executor)
        .await
        .map_err(|e| HistoryError::Storage(format!("INSERT failed: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl ConversationStore for SqliteHistory {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn append(
        &self,
        conversation_id: &ConversationId,
        role: Role,
        content: &str,
    ) -> Result<(), HistoryError> {
        Self::insert(&self.pool, conversation_id, role, content, &[]).await
    }

    async fn append_exchange(
        &self,
        conversation_id: &ConversationId,
        user: &str,
        assistant: &str,
        tools: &[ToolUsage],
    ) -> Result<(), HistoryError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| HistoryError::Storage(format!("BEGIN failed: {e}")))?;
        Self::insert(&mut *tx, conversation_id, Role::User, user, &[]).await?;
        Self::insert(&mut *tx, conversation_id, Role::Assistant, assistant, tools).await?;
        tx.commit()
            .await
            .map_err(|e| HistoryError::Storage(format!("COMMIT failed: {e}")))?;
        debug!(conversation_id = %conversation_id, "Stored exchange");
        Ok(())
    }

    async fn load(
        &self,
        conversation_id: &ConversationId,
        limit: usize,
    ) -> Result<Vec<Message>, HistoryError> {
        let rows = sqlx::query(
            "SELECT * FROM conversation_history WHERE conversation_id = ?1 ORDER BY id DESC LIMIT ?2",
        )
        .bind(conversation_id.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| HistoryError::QueryFailed(format!("load: {e}")))?;

        let mut messages = rows
            .iter()
            .map(|r| Self::row_to_record(r).map(|rec| rec.to_message()))
            .collect::<Result<Vec<_>, _>>()?;
        messages.reverse();
        Ok(messages)
    }

    async fn list(
        &self,
        conversation_id: Option<&ConversationId>,
    ) -> Result<Vec<HistoryRecord>, HistoryError> {
        let rows = match conversation_id {
            Some(id) => {
                sqlx::query("SELECT * FROM conversation_history WHERE conversation_id = ?1 ORDER BY id ASC")
                    .bind(id.as_str())
                    .fetch_all(&self.pool)
                    .await
            }
            None => {
                sqlx::query("SELECT * FROM conversation_history ORDER BY id DESC LIMIT ?1")
                    .bind(RECENT_HISTORY_LIMIT as i64)
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(|e| HistoryError::QueryFailed(format!("list: {e}")))?;

        let mut records = rows
            .iter()
            .map(Self::row_to_record)
            .collect::<Result<Vec<_>, _>>()?;
        if conversation_id.is_none() {
            records.reverse();
        }
        Ok(records)
    }

    async fn clear(&self, conversation_id: Option<&ConversationId>) -> Result<u64, HistoryError> {
        let result = match conversation_id {
            Some(id) => {
                sqlx::query("DELETE FROM conversation_history WHERE conversation_id = ?1")
                    .bind(id.as_str())
                    .execute(&self.pool)
                    .await
            }
            None => {
                sqlx::query("DELETE FROM conversation_history")
                    .execute(&self.pool)
                    .await
            }
        }
        .map_err(|e| HistoryError::Storage(format!("DELETE failed: {e}")))?;

        Ok(result.rows_affected())
    }

    async fn conversations(&self, limit: usize) -> Result<Vec<ConversationSummary>, HistoryError> {
        let rows = sqlx::query(
            r#"
            SELECT
                h.conversation_id,
                MIN(h.created_at) AS started_at,
                MAX(h.created_at) AS last_message_at,
                COUNT(*)          AS message_count,
                MAX(h.id)         AS last_id,
                (SELECT f.content FROM conversation_history f
                   WHERE f.conversation_id = h.conversation_id AND f.role = 'user'
                   ORDER BY f.id ASC LIMIT 1) AS first_message
            FROM conversation_history h
            GROUP BY h.conversation_id
            ORDER BY last_id DESC
            LIMIT ?1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| HistoryError::QueryFailed(format!("conversations: {e}")))?;

        rows.iter()
            .map(|row| {
                let id: String = row
                    .try_get("conversation_id")
                    .map_err(|e| HistoryError::QueryFailed(e.to_string()))?;
                let started_at: String = row
                    .try_get("started_at")
                    .map_err(|e| HistoryError::QueryFailed(e.to_string()))?;
                let last_message_at: String = row
                    .try_get("last_message_at")
                    .map_err(|e| HistoryError::QueryFailed(e.to_string()))?;
                let message_count: i64 = row
                    .try_get("message_count")
                    .map_err(|e| HistoryError::QueryFailed(e.to_string()))?;
                let first_message: Option<String> = row.try_get("first_message").ok().flatten();

                Ok(ConversationSummary {
                    id: ConversationId(id),
                    started_at: Self::parse_time(&started_at),
                    last_message_at: Self::parse_time(&last_message_at),
                    message_count: message_count as u64,
                    first_message,
                })
            })
            .collect()
    }

    async fn favorites(&self) -> Result<Vec<Favorite>, HistoryError> {
        let rows = sqlx::query("SELECT id, query, label, created_at FROM favorites ORDER BY id DESC")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| HistoryError::QueryFailed(format!("favorites: {e}")))?;
        rows.iter().map(Self::row_to_favorite).collect()
    }

    async fn add_favorite(&self, query: &str, label: Option<&str>) -> Result<Favorite, HistoryError> {
        let label = favorite_label(query, label);
        let created_at = Utc::now();
        let result = sqlx::query("INSERT INTO favorites (query, label, created_at) VALUES (?1, ?2, ?3)")
            .bind(query)
            .bind(&label)
            .bind(created_at.to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(|e| HistoryError::Storage(format!("INSERT favorite failed: {e}")))?;

        Ok(Favorite {
            id: result.last_insert_rowid(),
            query: query.to_string(),
            label,
            created_at,
        })
    }

    async fn remove_favorite(&self, id: i64) -> Result<bool, HistoryError> {
        let result = sqlx::query("DELETE FROM favorites WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| HistoryError::Storage(format!("DELETE favorite failed: {e}")))?;
        Ok(result.rows_affected() > 0)
    }
}
