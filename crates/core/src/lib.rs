//! # FarmBuddy Core
//!
//! Domain types, traits, and error definitions for the FarmBuddy
//! agricultural-advice assistant. This crate has **zero framework
//! dependencies** — it defines the domain model that all other crates
//! implement against.
//!
//! ## Design Philosophy
//!
//! Every subsystem is defined as a trait here. Implementations live in their
//! respective crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod error;
pub mod language;
pub mod message;
pub mod provider;
pub mod session;
pub mod store;

// Re-export key types at crate root for ergonomics
pub use error::{
    ChannelError, Error, ProviderError, Result, SpeechError, StoreError, WeatherError,
};
pub use language::Language;
pub use message::{Conversation, ConversationId, DEFAULT_TITLE, Role, Turn};
pub use provider::{
    ImageData, MemoryRole, MemoryTurn, ModelProvider, ModelRequest, STREAM_INTERRUPTED,
};
pub use session::{Session, SessionStore};
pub use store::{ConversationStore, ConversationSummary};
