//! Model provider implementations for FarmBuddy.
//!
//! All providers implement the `farmbuddy_core::ModelProvider` trait.
//! Production uses Gemini; tests use the scripted double.

pub mod gemini;
pub mod scripted;

pub use gemini::GeminiProvider;
pub use scripted::ScriptedProvider;
