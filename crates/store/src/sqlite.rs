//! SQLite conversation store.
//!
//! Two tables:
//! - `conversations` — metadata (title, timestamps)
//! - `turns` — the append-only turn log, cascade-deleted with its
//!   conversation
//!
//! Turns are immutable once written; only conversation metadata is updated.

use async_trait::async_trait;
use chrono::Utc;
use farmbuddy_core::error::StoreError;
use farmbuddy_core::message::{Conversation, ConversationId, DEFAULT_TITLE, Role, Turn};
use farmbuddy_core::store::{ConversationStore, ConversationSummary, MAX_TITLE_CHARS};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};

/// A production SQLite conversation store.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database at `path`.
    ///
    /// Pass `"sqlite::memory:"` for an in-process ephemeral database
    /// (useful for tests).
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| StoreError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite conversation store initialized at {path}");
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS conversations (
                id          TEXT PRIMARY KEY,
                title       TEXT NOT NULL,
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("conversations table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS turns (
                id              TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL
                                REFERENCES conversations(id) ON DELETE CASCADE,
                role            TEXT NOT NULL,
                content         TEXT NOT NULL,
                image_path      TEXT,
                created_at      TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("turns table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_turns_conversation
             ON turns(conversation_id, created_at)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("turns index: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_conversations_updated_at
             ON conversations(updated_at DESC)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("updated_at index: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    fn row_to_turn(row: &sqlx::sqlite::SqliteRow) -> Result<Turn, StoreError> {
        let id: String = row
            .try_get("id")
            .map_err(|e| StoreError::QueryFailed(format!("id column: {e}")))?;
        let role: String = row
            .try_get("role")
            .map_err(|e| StoreError::QueryFailed(format!("role column: {e}")))?;
        let content: String = row
            .try_get("content")
            .map_err(|e| StoreError::QueryFailed(format!("content column: {e}")))?;
        let image_path: Option<String> = row
            .try_get("image_path")
            .map_err(|e| StoreError::QueryFailed(format!("image_path column: {e}")))?;
        let created_at_str: String = row
            .try_get("created_at")
            .map_err(|e| StoreError::QueryFailed(format!("created_at column: {e}")))?;

        Ok(Turn {
            id,
            role: Role::from_str_lossy(&role),
            content,
            image_path,
            created_at: parse_timestamp(&created_at_str),
        })
    }

    fn clamp_title(title: &str) -> String {
        title.chars().take(MAX_TITLE_CHARS).collect()
    }
}

fn parse_timestamp(s: &str) -> chrono::DateTime<Utc> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[async_trait]
impl ConversationStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn create(&self) -> Result<Conversation, StoreError> {
        let conversation = Conversation::new();

        sqlx::query(
            "INSERT INTO conversations (id, title, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(&conversation.id.0)
        .bind(&conversation.title)
        .bind(conversation.created_at.to_rfc3339())
        .bind(conversation.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("INSERT conversation: {e}")))?;

        debug!("Created conversation {}", conversation.id);
        Ok(conversation)
    }

    async fn get(&self, id: &ConversationId) -> Result<Option<Conversation>, StoreError> {
        let row = sqlx::query("SELECT * FROM conversations WHERE id = ?1")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("GET conversation: {e}")))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let title: String = row
            .try_get("title")
            .map_err(|e| StoreError::QueryFailed(format!("title column: {e}")))?;
        let created_at: String = row
            .try_get("created_at")
            .map_err(|e| StoreError::QueryFailed(format!("created_at column: {e}")))?;
        let updated_at: String = row
            .try_get("updated_at")
            .map_err(|e| StoreError::QueryFailed(format!("updated_at column: {e}")))?;

        let turns = self.turns(id).await?;

        Ok(Some(Conversation {
            id: id.clone(),
            title,
            turns,
            created_at: parse_timestamp(&created_at),
            updated_at: parse_timestamp(&updated_at),
        }))
    }

    async fn list(&self, limit: usize) -> Result<Vec<ConversationSummary>, StoreError> {
        let rows = sqlx::query(
            "SELECT c.id, c.title, c.created_at, c.updated_at,
                    (SELECT COUNT(*) FROM turns t WHERE t.conversation_id = c.id) AS turn_count
             FROM conversations c
             ORDER BY c.updated_at DESC
             LIMIT ?1",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("LIST conversations: {e}")))?;

        rows.iter()
            .map(|row| {
                let id: String = row
                    .try_get("id")
                    .map_err(|e| StoreError::QueryFailed(format!("id column: {e}")))?;
                let title: String = row
                    .try_get("title")
                    .map_err(|e| StoreError::QueryFailed(format!("title column: {e}")))?;
                let turn_count: i64 = row
                    .try_get("turn_count")
                    .map_err(|e| StoreError::QueryFailed(format!("turn_count column: {e}")))?;
                let created_at: String = row
                    .try_get("created_at")
                    .map_err(|e| StoreError::QueryFailed(format!("created_at column: {e}")))?;
                let updated_at: String = row
                    .try_get("updated_at")
                    .map_err(|e| StoreError::QueryFailed(format!("updated_at column: {e}")))?;

                Ok(ConversationSummary {
                    id: ConversationId(id),
                    title,
                    turn_count: turn_count as usize,
                    created_at: parse_timestamp(&created_at),
                    updated_at: parse_timestamp(&updated_at),
                })
            })
            .collect()
    }

    async fn rename(&self, id: &ConversationId, title: &str) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE conversations SET title = ?1 WHERE id = ?2")
            .bind(Self::clamp_title(title))
            .bind(&id.0)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("RENAME conversation: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn set_title_if_default(
        &self,
        id: &ConversationId,
        title: &str,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE conversations SET title = ?1 WHERE id = ?2 AND title = ?3",
        )
        .bind(Self::clamp_title(title))
        .bind(&id.0)
        .bind(DEFAULT_TITLE)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("SET TITLE conversation: {e}")))?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, id: &ConversationId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM conversations WHERE id = ?1")
            .bind(&id.0)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("DELETE conversation: {e}")))?;

        Ok(result.rows_affected() > 0)
    }

    async fn append_turn(&self, id: &ConversationId, turn: &Turn) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Storage(format!("BEGIN: {e}")))?;

        let result = sqlx::query(
            "INSERT INTO turns (id, conversation_id, role, content, image_path, created_at)
             SELECT ?1, ?2, ?3, ?4, ?5, ?6
             WHERE EXISTS (SELECT 1 FROM conversations WHERE id = ?2)",
        )
        .bind(&turn.id)
        .bind(&id.0)
        .bind(turn.role.as_str())
        .bind(&turn.content)
        .bind(&turn.image_path)
        .bind(turn.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::Storage(format!("INSERT turn: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }

        sqlx::query("UPDATE conversations SET updated_at = ?1 WHERE id = ?2")
            .bind(Utc::now().to_rfc3339())
            .bind(&id.0)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Storage(format!("TOUCH conversation: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| StoreError::Storage(format!("COMMIT: {e}")))?;

        Ok(())
    }

    async fn turns(&self, id: &ConversationId) -> Result<Vec<Turn>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM turns WHERE conversation_id = ?1 ORDER BY created_at, rowid",
        )
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("LIST turns: {e}")))?;

        rows.iter().map(Self::row_to_turn).collect()
    }

    async fn turn_count(&self, id: &ConversationId) -> Result<usize, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM turns WHERE conversation_id = ?1")
            .bind(&id.0)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("COUNT turns: {e}")))?;

        let cnt: i64 = row
            .try_get("cnt")
            .map_err(|e| StoreError::QueryFailed(format!("cnt column: {e}")))?;

        Ok(cnt as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> SqliteStore {
        SqliteStore::new("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn create_and_get() {
        let store = test_store().await;
        let conversation = store.create().await.unwrap();
        assert_eq!(conversation.title, DEFAULT_TITLE);

        let fetched = store.get(&conversation.id).await.unwrap().unwrap();
        assert_eq!(fetched.id, conversation.id);
        assert!(fetched.turns.is_empty());
    }

    #[tokio::test]
    async fn get_missing_returns_none() {
        let store = test_store().await;
        let id = ConversationId::from("no-such-conversation");
        assert!(store.get(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn turns_keep_insertion_order() {
        let store = test_store().await;
        let conversation = store.create().await.unwrap();

        store
            .append_turn(&conversation.id, &Turn::user("How do I plant cassava?"))
            .await
            .unwrap();
        store
            .append_turn(
                &conversation.id,
                &Turn::assistant("Plant stem cuttings on ridges."),
            )
            .await
            .unwrap();
        store
            .append_turn(&conversation.id, &Turn::user("When do I harvest?"))
            .await
            .unwrap();

        let turns = store.turns(&conversation.id).await.unwrap();
        assert_eq!(turns.len(), 3);
        assert_eq!(turns[0].role, Role::User);
        assert_eq!(turns[1].role, Role::Assistant);
        assert_eq!(turns[2].content, "When do I harvest?");
        assert_eq!(store.turn_count(&conversation.id).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn append_to_missing_conversation_fails() {
        let store = test_store().await;
        let id = ConversationId::from("ghost");
        let err = store.append_turn(&id, &Turn::user("hello")).await;
        assert!(matches!(err, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn image_path_round_trips() {
        let store = test_store().await;
        let conversation = store.create().await.unwrap();

        store
            .append_turn(
                &conversation.id,
                &Turn::user_with_image(
                    "[Plant image uploaded for analysis]",
                    "plant_images/leaf.jpg",
                ),
            )
            .await
            .unwrap();

        let turns = store.turns(&conversation.id).await.unwrap();
        assert_eq!(turns[0].image_path.as_deref(), Some("plant_images/leaf.jpg"));
    }

    #[tokio::test]
    async fn list_orders_by_recent_activity() {
        let store = test_store().await;
        let first = store.create().await.unwrap();
        let second = store.create().await.unwrap();

        // Touch the first one so it becomes most recent.
        store
            .append_turn(&first.id, &Turn::user("latest activity"))
            .await
            .unwrap();

        let summaries = store.list(10).await.unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].id, first.id);
        assert_eq!(summaries[0].turn_count, 1);
        assert_eq!(summaries[1].id, second.id);
        assert_eq!(summaries[1].turn_count, 0);
    }

    #[tokio::test]
    async fn rename_replaces_title() {
        let store = test_store().await;
        let conversation = store.create().await.unwrap();

        store
            .rename(&conversation.id, "Cassava Planting Advice")
            .await
            .unwrap();
        let fetched = store.get(&conversation.id).await.unwrap().unwrap();
        assert_eq!(fetched.title, "Cassava Planting Advice");
    }

    #[tokio::test]
    async fn rename_missing_conversation_fails() {
        let store = test_store().await;
        let id = ConversationId::from("ghost");
        assert!(matches!(
            store.rename(&id, "anything").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn rename_clamps_long_titles() {
        let store = test_store().await;
        let conversation = store.create().await.unwrap();

        store
            .rename(&conversation.id, &"x".repeat(500))
            .await
            .unwrap();
        let fetched = store.get(&conversation.id).await.unwrap().unwrap();
        assert_eq!(fetched.title.chars().count(), 200);
    }

    #[tokio::test]
    async fn summarized_title_never_clobbers_a_rename() {
        let store = test_store().await;
        let conversation = store.create().await.unwrap();

        // While still default, the summarizer may set it.
        assert!(store
            .set_title_if_default(&conversation.id, "Maize Timing")
            .await
            .unwrap());

        // A second summarization attempt is a no-op.
        assert!(!store
            .set_title_if_default(&conversation.id, "Different Title")
            .await
            .unwrap());

        let fetched = store.get(&conversation.id).await.unwrap().unwrap();
        assert_eq!(fetched.title, "Maize Timing");
    }

    #[tokio::test]
    async fn delete_cascades_to_turns() {
        let store = test_store().await;
        let conversation = store.create().await.unwrap();
        store
            .append_turn(&conversation.id, &Turn::user("hello"))
            .await
            .unwrap();

        assert!(store.delete(&conversation.id).await.unwrap());
        assert!(store.get(&conversation.id).await.unwrap().is_none());
        assert_eq!(store.turn_count(&conversation.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn delete_missing_returns_false() {
        let store = test_store().await;
        let id = ConversationId::from("ghost");
        assert!(!store.delete(&id).await.unwrap());
    }

    #[tokio::test]
    async fn store_name() {
        let store = test_store().await;
        assert_eq!(store.name(), "sqlite");
    }
}
