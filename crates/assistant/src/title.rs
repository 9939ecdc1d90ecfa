//! Conversation title summarization.
//!
//! Asks a (cheaper) model for a short label, scrubs quote and markdown
//! characters, and falls back to truncating the source text when the model
//! is unavailable. Called once per conversation, after its first
//! user+assistant pair, detached from the response path.

use std::sync::Arc;

use farmbuddy_core::provider::{ModelProvider, ModelRequest};
use tracing::warn;

const FALLBACK_CHARS: usize = 30;

/// Generates short conversation titles.
#[derive(Clone)]
pub struct TitleSummarizer {
    provider: Arc<dyn ModelProvider>,
}

impl TitleSummarizer {
    pub fn new(provider: Arc<dyn ModelProvider>) -> Self {
        Self { provider }
    }

    /// Summarize `text` into a short title. Never fails: any provider error
    /// degrades to the truncation fallback.
    pub async fn summarize(&self, text: &str) -> String {
        let prompt = format!(
            "Summarize the following text into a short title of maximum 5 words. \
             Do not use quotes or special characters. Text: {text}"
        );

        match self.provider.complete(ModelRequest::prompt_only(prompt)).await {
            Ok(title) => title.trim().replace(['"', '*'], ""),
            Err(e) => {
                warn!(error = %e, "Title summarization failed, using fallback");
                fallback_title(text)
            }
        }
    }
}

/// Truncation fallback: the first 30 characters plus an ellipsis, or the
/// text unchanged when it is already short enough.
pub fn fallback_title(text: &str) -> String {
    if text.chars().count() > FALLBACK_CHARS {
        let truncated: String = text.chars().take(FALLBACK_CHARS).collect();
        format!("{truncated}...")
    } else {
        text.to_string()
    }
}
