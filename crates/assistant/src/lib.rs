//! The FarmBuddy assistant: context assembly, response orchestration, and
//! title summarization on top of a [`farmbuddy_core::ModelProvider`].

pub mod context;
pub mod engine;
pub mod title;

pub use context::{GREETING, HISTORY_WINDOW, SituationalContext, assemble};
pub use engine::{APOLOGY, Assistant, IMAGE_APOLOGY, SAFETY_FALLBACK};
pub use title::TitleSummarizer;
