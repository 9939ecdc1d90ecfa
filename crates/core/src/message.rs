//! Turn and Conversation domain types.
//!
//! These are the core value objects that flow through the entire system:
//! a user sends a turn → a front-end receives it → the assistant builds a
//! prompt → the provider generates a response → both turns are persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The author of a turn. The role space is closed: FarmBuddy conversations
/// only ever contain user and assistant turns (persona instructions are
/// fixed on the provider, not stored as turns).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user (farmer)
    User,
    /// The AI assistant
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    /// Parse a stored role string. Anything that is not "assistant" is
    /// treated as a user turn.
    pub fn from_str_lossy(s: &str) -> Self {
        if s == "assistant" {
            Role::Assistant
        } else {
            Role::User
        }
    }
}

/// A single turn in a conversation. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    /// Unique turn ID
    pub id: String,

    /// Who authored this turn
    pub role: Role,

    /// The text content
    pub content: String,

    /// Stored path of an attached plant image, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_path: Option<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Turn {
    /// Create a new user turn.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role: Role::User,
            content: content.into(),
            image_path: None,
            created_at: Utc::now(),
        }
    }

    /// Create a new assistant turn.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role: Role::Assistant,
            content: content.into(),
            image_path: None,
            created_at: Utc::now(),
        }
    }

    /// Create a user turn carrying an uploaded image.
    pub fn user_with_image(content: impl Into<String>, image_path: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role: Role::User,
            content: content.into(),
            image_path: Some(image_path.into()),
            created_at: Utc::now(),
        }
    }
}

/// Title given to conversations that have not been summarized or renamed.
pub const DEFAULT_TITLE: &str = "New Chat";

/// Conversation metadata plus its ordered turns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Unique conversation ID
    pub id: ConversationId,

    /// Display title. Defaults to [`DEFAULT_TITLE`]; set once after the
    /// first user+assistant pair and never auto-changed afterwards.
    pub title: String,

    /// Ordered turns
    pub turns: Vec<Turn>,

    /// When this conversation was created
    pub created_at: DateTime<Utc>,

    /// When the last turn was added
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Create a new empty conversation.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: ConversationId::new(),
            title: DEFAULT_TITLE.to_string(),
            turns: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Add a turn to the conversation.
    pub fn push(&mut self, turn: Turn) {
        self.updated_at = Utc::now();
        self.turns.push(turn);
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_user_turn() {
        let turn = Turn::user("How do I plant cassava?");
        assert_eq!(turn.role, Role::User);
        assert_eq!(turn.content, "How do I plant cassava?");
        assert!(turn.image_path.is_none());
    }

    #[test]
    fn image_turn_keeps_path() {
        let turn = Turn::user_with_image("[Plant image uploaded for analysis]", "plant_images/a.jpg");
        assert_eq!(turn.image_path.as_deref(), Some("plant_images/a.jpg"));
    }

    #[test]
    fn conversation_tracks_updates() {
        let mut conv = Conversation::new();
        let created = conv.created_at;

        conv.push(Turn::user("First message"));
        assert_eq!(conv.turns.len(), 1);
        assert!(conv.updated_at >= created);
        assert_eq!(conv.title, DEFAULT_TITLE);
    }

    #[test]
    fn role_parsing_is_lossy() {
        assert_eq!(Role::from_str_lossy("assistant"), Role::Assistant);
        assert_eq!(Role::from_str_lossy("user"), Role::User);
        assert_eq!(Role::from_str_lossy("garbage"), Role::User);
    }

    #[test]
    fn turn_serialization_roundtrip() {
        let turn = Turn::assistant("Plant maize after the first rains.");
        let json = serde_json::to_string(&turn).unwrap();
        let deserialized: Turn = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized.content, turn.content);
        assert_eq!(deserialized.role, Role::Assistant);
    }
}
