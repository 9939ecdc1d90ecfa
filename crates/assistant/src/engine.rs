//! Response orchestration.
//!
//! The [`Assistant`] wraps a model provider and applies the conversation
//! policy: canned greeting for empty histories, safety fallback when the
//! model refuses, and the fixed vision prompt for plant image analysis.
//! Transport failures propagate so each front-end can substitute its own
//! apology string.

use std::sync::Arc;

use farmbuddy_core::error::ProviderError;
use farmbuddy_core::message::Turn;
use farmbuddy_core::provider::{ImageData, ModelProvider, ModelRequest};
use tracing::warn;

use crate::context::{GREETING, SituationalContext, assemble};

/// Substituted when the model refuses or returns no usable text.
pub const SAFETY_FALLBACK: &str =
    "I'm sorry, I cannot answer that request due to safety guidelines.";

/// User-facing substitute for a failed text request.
pub const APOLOGY: &str = "I'm sorry, I'm having trouble connecting right now. Please try again.";

/// User-facing substitute for a failed image analysis.
pub const IMAGE_APOLOGY: &str = "I'm sorry, I'm having trouble analyzing the image right now. \
     Please try again or consult a local agricultural expert.";

/// Fixed prompt for plant disease analysis.
pub const VISION_PROMPT: &str = "\
You are FarmBuddy, an expert agricultural advisor specializing in plant disease diagnosis.

Analyze this plant leaf image and provide:
1. **Disease Identification**: What disease or problem do you see? (if any)
2. **Confidence Level**: How confident are you in this diagnosis?
3. **Symptoms Observed**: Describe the visible symptoms
4. **Recommended Treatment**: Practical, cost-effective solutions for Nigerian smallholder farmers
5. **Prevention Tips**: How to prevent this in the future

Use simple English and be practical. If you cannot identify a specific disease, explain what you \
observe and suggest consulting a local agricultural extension agent.";

/// Orchestrates model calls for one conversation turn.
#[derive(Clone)]
pub struct Assistant {
    provider: Arc<dyn ModelProvider>,
}

impl Assistant {
    pub fn new(provider: Arc<dyn ModelProvider>) -> Self {
        Self { provider }
    }

    /// Answer a conversation turn with a complete string.
    ///
    /// Empty history returns the greeting without a provider call. A safety
    /// block becomes [`SAFETY_FALLBACK`]; transport errors propagate.
    pub async fn respond(
        &self,
        history: &[Turn],
        situation: &SituationalContext,
    ) -> Result<String, ProviderError> {
        let Some(request) = assemble(history, situation) else {
            return Ok(GREETING.to_string());
        };

        match self.provider.complete(request).await {
            Ok(text) => Ok(text.trim().to_string()),
            Err(ProviderError::Blocked(reason)) => {
                warn!(%reason, "Model refused the request");
                Ok(SAFETY_FALLBACK.to_string())
            }
            Err(e) => Err(e),
        }
    }

    /// Answer a conversation turn as a fragment stream.
    ///
    /// Empty history yields a one-fragment stream carrying the greeting.
    /// Mid-stream failures surface as the in-band interruption sentinel,
    /// never as an error past this call.
    pub async fn respond_stream(
        &self,
        history: &[Turn],
        situation: &SituationalContext,
    ) -> Result<tokio::sync::mpsc::Receiver<String>, ProviderError> {
        let Some(request) = assemble(history, situation) else {
            let (tx, rx) = tokio::sync::mpsc::channel(1);
            let _ = tx.send(GREETING.to_string()).await;
            return Ok(rx);
        };

        self.provider.stream(request).await
    }

    /// Analyze a plant image with the fixed diagnosis prompt.
    pub async fn analyze_image(&self, image: ImageData) -> Result<String, ProviderError> {
        let request = ModelRequest {
            memory: Vec::new(),
            prompt: VISION_PROMPT.to_string(),
            image: Some(image),
        };

        match self.provider.complete(request).await {
            Ok(text) => Ok(text.trim().to_string()),
            Err(ProviderError::Blocked(reason)) => {
                warn!(%reason, "Model refused the image analysis");
                Ok(SAFETY_FALLBACK.to_string())
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use farmbuddy_core::Language;
    use farmbuddy_providers::ScriptedProvider;

    fn situation() -> SituationalContext {
        SituationalContext {
            weather: None,
            language: Language::En,
            date: "Monday, January 05, 2026".into(),
        }
    }

    #[tokio::test]
    async fn empty_history_returns_greeting_without_provider_call() {
        let provider = Arc::new(ScriptedProvider::new("should never be used"));
        let assistant = Assistant::new(provider.clone());

        let answer = assistant.respond(&[], &situation()).await.unwrap();
        assert_eq!(answer, GREETING);
        assert!(provider.requests().is_empty());
    }

    #[tokio::test]
    async fn respond_forwards_annotated_prompt() {
        let provider = Arc::new(ScriptedProvider::new("Plant after the first rains."));
        let assistant = Assistant::new(provider.clone());

        let history = vec![Turn::user("When should I plant maize?")];
        let answer = assistant.respond(&history, &situation()).await.unwrap();

        assert_eq!(answer, "Plant after the first rains.");
        let request = provider.last_request().unwrap();
        assert!(request.prompt.starts_with("[System Context: "));
        assert!(request.prompt.ends_with("When should I plant maize?"));
    }

    #[tokio::test]
    async fn safety_block_becomes_fallback_text() {
        let provider = Arc::new(ScriptedProvider::new("unused"));
        provider.fail_next(ProviderError::Blocked("SAFETY".into()));
        let assistant = Assistant::new(provider);

        let history = vec![Turn::user("something blocked")];
        let answer = assistant.respond(&history, &situation()).await.unwrap();
        assert_eq!(answer, SAFETY_FALLBACK);
    }

    #[tokio::test]
    async fn transport_failure_propagates() {
        let provider = Arc::new(ScriptedProvider::new("unused"));
        provider.fail_next(ProviderError::Network("connection refused".into()));
        let assistant = Assistant::new(provider);

        let history = vec![Turn::user("hello")];
        assert!(assistant.respond(&history, &situation()).await.is_err());
    }

    #[tokio::test]
    async fn stream_concatenation_matches_complete_answer() {
        let reply = "Cassava grows best on well-drained sandy loam soil.";
        let history = vec![Turn::user("What soil suits cassava?")];

        let complete = Assistant::new(Arc::new(ScriptedProvider::new(reply)))
            .respond(&history, &situation())
            .await
            .unwrap();

        let mut rx = Assistant::new(Arc::new(ScriptedProvider::new(reply)))
            .respond_stream(&history, &situation())
            .await
            .unwrap();
        let mut streamed = String::new();
        while let Some(fragment) = rx.recv().await {
            streamed.push_str(&fragment);
        }

        assert_eq!(streamed, complete);
    }

    #[tokio::test]
    async fn empty_history_stream_yields_greeting() {
        let provider = Arc::new(ScriptedProvider::new("unused"));
        let assistant = Assistant::new(provider.clone());

        let mut rx = assistant.respond_stream(&[], &situation()).await.unwrap();
        assert_eq!(rx.recv().await.as_deref(), Some(GREETING));
        assert!(rx.recv().await.is_none());
        assert!(provider.requests().is_empty());
    }

    #[tokio::test]
    async fn image_analysis_attaches_bytes_and_vision_prompt() {
        let provider = Arc::new(ScriptedProvider::new("Looks like cassava mosaic disease."));
        let assistant = Assistant::new(provider.clone());

        let answer = assistant
            .analyze_image(ImageData {
                mime_type: "image/jpeg".into(),
                bytes: vec![0xFF, 0xD8, 0xFF],
            })
            .await
            .unwrap();

        assert_eq!(answer, "Looks like cassava mosaic disease.");
        let request = provider.last_request().unwrap();
        assert!(request.prompt.contains("Disease Identification"));
        assert_eq!(request.image.unwrap().mime_type, "image/jpeg");
    }
}
