//! ModelProvider trait — the abstraction over the hosted generative model.
//!
//! A provider is constructed once with its credentials and persona system
//! instruction, then answers requests built from conversation memory plus a
//! single annotated prompt. It can answer either as one complete string or
//! as a stream of text fragments.
//!
//! Streaming contract: the receiver yields fragments in FIFO order,
//! at most once each. If the transport fails mid-stream, the provider
//! emits [`STREAM_INTERRUPTED`] as one final in-band fragment and closes
//! the channel — consumers never see an error past the first fragment.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

/// Sentinel fragment emitted when a stream is cut short by a transport or
/// safety failure. Kept in-band so every consumer of a fragment sequence
/// sees identical semantics.
pub const STREAM_INTERRUPTED: &str = " [Error: Interrupted] ";

/// Role vocabulary the model expects for replayed memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryRole {
    /// A prior user turn
    User,
    /// A prior assistant turn (the model calls its own turns "model")
    Model,
}

impl MemoryRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryRole::User => "user",
            MemoryRole::Model => "model",
        }
    }
}

/// One replayed turn of conversation memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryTurn {
    pub role: MemoryRole,
    pub content: String,
}

impl MemoryTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MemoryRole::User,
            content: content.into(),
        }
    }

    pub fn model(content: impl Into<String>) -> Self {
        Self {
            role: MemoryRole::Model,
            content: content.into(),
        }
    }
}

/// Raw image bytes attached to a vision prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageData {
    /// MIME type, e.g. "image/jpeg"
    pub mime_type: String,
    /// The raw bytes (base64 encoding happens at the wire)
    pub bytes: Vec<u8>,
}

/// A single outbound request to the model.
#[derive(Debug, Clone, Default)]
pub struct ModelRequest {
    /// Prior turns replayed as conversation memory, oldest first.
    pub memory: Vec<MemoryTurn>,

    /// The current prompt text (already annotated with system context by
    /// the assembler).
    pub prompt: String,

    /// Optional image attachment for vision-style prompts.
    pub image: Option<ImageData>,
}

impl ModelRequest {
    /// A request with no memory — a single standalone prompt.
    pub fn prompt_only(prompt: impl Into<String>) -> Self {
        Self {
            memory: Vec::new(),
            prompt: prompt.into(),
            image: None,
        }
    }
}

/// The core model provider trait.
///
/// The persona system instruction is fixed at construction — callers never
/// pass it per request. Implementations: Gemini (production), scripted
/// double (tests).
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// A human-readable name for this provider (e.g., "gemini").
    fn name(&self) -> &str;

    /// Send a request and get the complete answer text.
    async fn complete(&self, request: ModelRequest)
    -> std::result::Result<String, ProviderError>;

    /// Send a request and get a stream of text fragments.
    ///
    /// Default implementation calls `complete()` and yields the result as a
    /// single fragment; a completion failure becomes the interruption
    /// sentinel, per the streaming contract.
    async fn stream(
        &self,
        request: ModelRequest,
    ) -> std::result::Result<tokio::sync::mpsc::Receiver<String>, ProviderError> {
        let (tx, rx) = tokio::sync::mpsc::channel(1);
        match self.complete(request).await {
            Ok(text) => {
                let _ = tx.send(text).await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Completion failed inside default stream shim");
                let _ = tx.send(STREAM_INTERRUPTED.to_string()).await;
            }
        }
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedProvider(&'static str);

    #[async_trait]
    impl ModelProvider for FixedProvider {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn complete(&self, _request: ModelRequest) -> Result<String, ProviderError> {
            Ok(self.0.to_string())
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl ModelProvider for FailingProvider {
        fn name(&self) -> &str {
            "failing"
        }

        async fn complete(&self, _request: ModelRequest) -> Result<String, ProviderError> {
            Err(ProviderError::Network("connection refused".into()))
        }
    }

    #[test]
    fn memory_role_wire_names() {
        assert_eq!(MemoryRole::User.as_str(), "user");
        assert_eq!(MemoryRole::Model.as_str(), "model");
    }

    #[tokio::test]
    async fn default_stream_yields_single_fragment() {
        let provider = FixedProvider("Plant cassava on ridges.");
        let mut rx = provider
            .stream(ModelRequest::prompt_only("How do I plant cassava?"))
            .await
            .unwrap();

        assert_eq!(rx.recv().await.as_deref(), Some("Plant cassava on ridges."));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn default_stream_emits_sentinel_on_failure() {
        let provider = FailingProvider;
        let mut rx = provider
            .stream(ModelRequest::prompt_only("hello"))
            .await
            .unwrap();

        assert_eq!(rx.recv().await.as_deref(), Some(STREAM_INTERRUPTED));
        assert!(rx.recv().await.is_none());
    }
}
