//! A scripted provider for tests.
//!
//! Answers from a queue of canned replies and records every request it
//! receives, so tests can assert on the exact prompt and memory the caller
//! built. Can be told to fail or to interrupt mid-stream.

use async_trait::async_trait;
use farmbuddy_core::error::ProviderError;
use farmbuddy_core::provider::{ModelProvider, ModelRequest, STREAM_INTERRUPTED};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Canned model provider. Clone-free: share it behind an `Arc`.
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<ModelRequest>>,
    fail_with: Mutex<Option<ProviderError>>,
    interrupt_streams: Mutex<bool>,
}

impl ScriptedProvider {
    /// Provider that repeats `reply` forever (queue empty -> fallback reply).
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            replies: Mutex::new(VecDeque::from([reply.into()])),
            requests: Mutex::new(Vec::new()),
            fail_with: Mutex::new(None),
            interrupt_streams: Mutex::new(false),
        }
    }

    /// Provider that answers each request with the next queued reply.
    pub fn with_replies(replies: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            requests: Mutex::new(Vec::new()),
            fail_with: Mutex::new(None),
            interrupt_streams: Mutex::new(false),
        }
    }

    /// Make the next `complete` call fail with the given error.
    pub fn fail_next(&self, error: ProviderError) {
        *self.fail_with.lock().unwrap() = Some(error);
    }

    /// Make `stream` calls end with the interruption sentinel after the
    /// first fragment.
    pub fn interrupt_streams(&self) {
        *self.interrupt_streams.lock().unwrap() = true;
    }

    /// All requests received so far, in order.
    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// The most recent request, if any.
    pub fn last_request(&self) -> Option<ModelRequest> {
        self.requests.lock().unwrap().last().cloned()
    }

    fn next_reply(&self) -> String {
        let mut replies = self.replies.lock().unwrap();
        if replies.len() > 1 {
            replies.pop_front().unwrap()
        } else {
            replies.front().cloned().unwrap_or_default()
        }
    }
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ModelRequest) -> Result<String, ProviderError> {
        self.requests.lock().unwrap().push(request);
        if let Some(error) = self.fail_with.lock().unwrap().take() {
            return Err(error);
        }
        Ok(self.next_reply())
    }

    async fn stream(
        &self,
        request: ModelRequest,
    ) -> Result<tokio::sync::mpsc::Receiver<String>, ProviderError> {
        self.requests.lock().unwrap().push(request);
        if let Some(error) = self.fail_with.lock().unwrap().take() {
            return Err(error);
        }

        let reply = self.next_reply();
        let interrupt = *self.interrupt_streams.lock().unwrap();
        let (tx, rx) = tokio::sync::mpsc::channel(16);

        tokio::spawn(async move {
            // Split on word boundaries so concatenating the fragments
            // reconstructs the reply exactly.
            let mut rest = reply.as_str();
            let mut first = true;
            while !rest.is_empty() {
                let split = rest
                    .char_indices()
                    .find(|(i, c)| *i > 0 && c.is_whitespace())
                    .map(|(i, _)| i + 1)
                    .unwrap_or(rest.len());
                let (fragment, tail) = rest.split_at(split.min(rest.len()));
                if tx.send(fragment.to_string()).await.is_err() {
                    return;
                }
                rest = tail;
                if interrupt && first {
                    let _ = tx.send(STREAM_INTERRUPTED.to_string()).await;
                    return;
                }
                first = false;
            }
        });

        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn collect(mut rx: tokio::sync::mpsc::Receiver<String>) -> Vec<String> {
        let mut fragments = Vec::new();
        while let Some(fragment) = rx.recv().await {
            fragments.push(fragment);
        }
        fragments
    }

    #[tokio::test]
    async fn repeats_single_reply() {
        let provider = ScriptedProvider::new("Plant maize early.");
        for _ in 0..3 {
            let answer = provider
                .complete(ModelRequest::prompt_only("when to plant?"))
                .await
                .unwrap();
            assert_eq!(answer, "Plant maize early.");
        }
        assert_eq!(provider.requests().len(), 3);
    }

    #[tokio::test]
    async fn queued_replies_consumed_in_order() {
        let provider = ScriptedProvider::with_replies(["first", "second"]);
        assert_eq!(
            provider.complete(ModelRequest::prompt_only("a")).await.unwrap(),
            "first"
        );
        assert_eq!(
            provider.complete(ModelRequest::prompt_only("b")).await.unwrap(),
            "second"
        );
        // Last reply sticks
        assert_eq!(
            provider.complete(ModelRequest::prompt_only("c")).await.unwrap(),
            "second"
        );
    }

    #[tokio::test]
    async fn stream_fragments_concatenate_to_reply() {
        let provider = ScriptedProvider::new("Plant cassava on well-drained ridges.");
        let rx = provider
            .stream(ModelRequest::prompt_only("how?"))
            .await
            .unwrap();
        let fragments = collect(rx).await;
        assert!(fragments.len() > 1);
        assert_eq!(fragments.concat(), "Plant cassava on well-drained ridges.");
    }

    #[tokio::test]
    async fn interrupted_stream_ends_with_sentinel() {
        let provider = ScriptedProvider::new("A long answer about fertilizer application.");
        provider.interrupt_streams();
        let rx = provider
            .stream(ModelRequest::prompt_only("how?"))
            .await
            .unwrap();
        let fragments = collect(rx).await;
        assert_eq!(fragments.last().map(String::as_str), Some(STREAM_INTERRUPTED));
    }

    #[tokio::test]
    async fn fail_next_surfaces_error_once() {
        let provider = ScriptedProvider::new("fine");
        provider.fail_next(ProviderError::Network("down".into()));
        assert!(provider
            .complete(ModelRequest::prompt_only("a"))
            .await
            .is_err());
        assert!(provider
            .complete(ModelRequest::prompt_only("b"))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn records_request_details() {
        let provider = ScriptedProvider::new("ok");
        let _ = provider
            .complete(ModelRequest::prompt_only("[System Context: x]\n\nhello"))
            .await;
        let last = provider.last_request().unwrap();
        assert!(last.prompt.starts_with("[System Context:"));
        assert!(last.memory.is_empty());
    }
}
