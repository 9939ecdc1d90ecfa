//! Conversation context assembly.
//!
//! Transforms (history, situational context) into a single [`ModelRequest`]:
//! the most recent turns replayed as memory, and the newest user turn
//! annotated with a bracketed system-context block carrying the date, the
//! language instruction, and any cached weather summary.

use chrono::Local;
use farmbuddy_core::message::{Role, Turn};
use farmbuddy_core::provider::{MemoryTurn, ModelRequest};
use farmbuddy_core::Language;

/// Sliding window applied to the history before assembly. Older turns are
/// dropped regardless of content.
pub const HISTORY_WINDOW: usize = 10;

/// Canned reply for an empty history; no model call is made for it.
pub const GREETING: &str = "Hello! How can I help you?";

/// Transient facts injected into one outbound prompt. Never persisted.
#[derive(Debug, Clone)]
pub struct SituationalContext {
    /// Cached weather/forecast summary, appended verbatim when present
    pub weather: Option<String>,

    /// Target response language
    pub language: Language,

    /// Human-readable current date, e.g. "Monday, January 05, 2026"
    pub date: String,
}

impl SituationalContext {
    /// Context for the current local date.
    pub fn now(language: Language, weather: Option<String>) -> Self {
        Self {
            weather,
            language,
            date: Local::now().format("%A, %B %d, %Y").to_string(),
        }
    }

    /// The system-context block rendered into the prompt.
    fn render(&self) -> String {
        let mut block = format!(
            "Current Date: {}\nIMPORTANT INSTRUCTION: {}",
            self.date,
            self.language.instruction()
        );
        if let Some(ref weather) = self.weather {
            block.push_str(&format!("\nWeather Info: {weather}"));
        }
        block
    }
}

/// Build the outbound request for a non-empty history.
///
/// Returns `None` for an empty history: the caller answers with [`GREETING`]
/// and must not call the provider.
pub fn assemble(history: &[Turn], situation: &SituationalContext) -> Option<ModelRequest> {
    if history.is_empty() {
        return None;
    }

    let start = history.len().saturating_sub(HISTORY_WINDOW);
    let window = &history[start..];

    let memory = window[..window.len() - 1]
        .iter()
        .map(|turn| match turn.role {
            Role::User => MemoryTurn::user(&turn.content),
            Role::Assistant => MemoryTurn::model(&turn.content),
        })
        .collect();

    let current = window.last()?;
    let prompt = format!("[System Context: {}]\n\n{}", situation.render(), current.content);

    Some(ModelRequest {
        memory,
        prompt,
        image: None,
    })
}
