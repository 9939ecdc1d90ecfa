//! ConversationStore trait — durable persistence for conversations.
//!
//! The store is an append-only turn log per conversation plus conversation
//! metadata (title, timestamps). No core logic depends on its internal
//! representation; the SQLite implementation lives in `farmbuddy-store`.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::message::{Conversation, ConversationId, Turn};

/// Ceiling applied to conversation titles on every write path.
pub const MAX_TITLE_CHARS: usize = 200;

/// Lightweight listing row: a conversation without its turns.
#[derive(Debug, Clone)]
pub struct ConversationSummary {
    pub id: ConversationId,
    pub title: String,
    pub turn_count: usize,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Durable conversation persistence.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// A human-readable name for this backend (e.g., "sqlite").
    fn name(&self) -> &str;

    /// Create a new empty conversation and return it.
    async fn create(&self) -> Result<Conversation, StoreError>;

    /// Fetch a conversation with all its turns.
    async fn get(&self, id: &ConversationId) -> Result<Option<Conversation>, StoreError>;

    /// List conversations, most recently updated first.
    async fn list(&self, limit: usize) -> Result<Vec<ConversationSummary>, StoreError>;

    /// Rename a conversation. Titles are clamped to [`MAX_TITLE_CHARS`].
    async fn rename(&self, id: &ConversationId, title: &str) -> Result<(), StoreError>;

    /// Set the title only if it is still the default — the title summarizer
    /// writes through this so it never clobbers a manual rename.
    async fn set_title_if_default(
        &self,
        id: &ConversationId,
        title: &str,
    ) -> Result<bool, StoreError>;

    /// Delete a conversation and all its turns.
    async fn delete(&self, id: &ConversationId) -> Result<bool, StoreError>;

    /// Append a turn. Touches the conversation's `updated_at`.
    async fn append_turn(&self, id: &ConversationId, turn: &Turn) -> Result<(), StoreError>;

    /// All turns for a conversation, oldest first.
    async fn turns(&self, id: &ConversationId) -> Result<Vec<Turn>, StoreError>;

    /// Number of turns in a conversation.
    async fn turn_count(&self, id: &ConversationId) -> Result<usize, StoreError>;
}
