//! Durable conversation persistence for FarmBuddy.
//!
//! Implements [`farmbuddy_core::ConversationStore`] on SQLite.

pub mod sqlite;

pub use sqlite::SqliteStore;
