//! Gemini provider implementation.
//!
//! Talks to the Google Generative Language API:
//! - `POST /v1beta/models/{model}:generateContent` for complete answers
//! - `POST /v1beta/models/{model}:streamGenerateContent?alt=sse` for
//!   fragment streams
//!
//! The persona system instruction and API key are fixed at construction;
//! conversation memory is replayed per request with the user/model role
//! vocabulary. Images are attached as base64 `inline_data` parts.

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use farmbuddy_core::error::ProviderError;
use farmbuddy_core::provider::{
    MemoryTurn, ModelProvider, ModelRequest, STREAM_INTERRUPTED,
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Network ceiling applied to every model call so a stalled provider cannot
/// hang a request indefinitely.
const REQUEST_TIMEOUT_SECS: u64 = 60;

/// A Gemini model provider.
pub struct GeminiProvider {
    model: String,
    base_url: String,
    api_key: String,
    system_instruction: String,
    client: reqwest::Client,
}

impl GeminiProvider {
    /// Create a new Gemini provider with its credentials and persona.
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        system_instruction: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| ProviderError::Network(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            model: model.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            system_instruction: system_instruction.into(),
            client,
        })
    }

    /// Override the API base URL (used by tests against a local server).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn url(&self, method: &str) -> String {
        format!(
            "{}/v1beta/models/{}:{}",
            self.base_url, self.model, method
        )
    }

    /// Convert a request into the API's `contents` array: replayed memory
    /// followed by the current prompt (and optional inline image).
    fn to_api_contents(request: &ModelRequest) -> Vec<ApiContent> {
        let mut contents: Vec<ApiContent> = request
            .memory
            .iter()
            .map(|turn: &MemoryTurn| ApiContent {
                role: turn.role.as_str().to_string(),
                parts: vec![ApiPart::text(&turn.content)],
            })
            .collect();

        let mut parts = vec![ApiPart::text(&request.prompt)];
        if let Some(ref image) = request.image {
            parts.push(ApiPart {
                text: None,
                inline_data: Some(ApiInlineData {
                    mime_type: image.mime_type.clone(),
                    data: BASE64.encode(&image.bytes),
                }),
            });
        }
        contents.push(ApiContent {
            role: "user".into(),
            parts,
        });

        contents
    }

    fn build_body(&self, request: &ModelRequest) -> ApiGenerateRequest {
        ApiGenerateRequest {
            system_instruction: ApiSystemInstruction {
                parts: vec![ApiPart::text(&self.system_instruction)],
            },
            contents: Self::to_api_contents(request),
        }
    }

    /// Map a non-200 status to the matching provider error.
    async fn status_error(response: reqwest::Response) -> ProviderError {
        let status = response.status().as_u16();
        match status {
            429 => ProviderError::RateLimited { retry_after_secs: 5 },
            401 | 403 => ProviderError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ),
            _ => {
                let error_body = response.text().await.unwrap_or_default();
                warn!(status, body = %error_body, "Gemini returned error");
                ProviderError::ApiError {
                    status_code: status,
                    message: error_body,
                }
            }
        }
    }
}

#[async_trait]
impl ModelProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn complete(&self, request: ModelRequest) -> Result<String, ProviderError> {
        let body = self.build_body(&request);

        debug!(
            model = %self.model,
            memory_turns = request.memory.len(),
            has_image = request.image.is_some(),
            "Sending completion request"
        );

        let response = self
            .client
            .post(self.url("generateContent"))
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(e.to_string())
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?;

        if response.status().as_u16() != 200 {
            return Err(Self::status_error(response).await);
        }

        let api_response: ApiGenerateResponse =
            response.json().await.map_err(|e| ProviderError::ApiError {
                status_code: 200,
                message: format!("Failed to parse response: {e}"),
            })?;

        extract_text(&api_response)
    }

    async fn stream(
        &self,
        request: ModelRequest,
    ) -> Result<tokio::sync::mpsc::Receiver<String>, ProviderError> {
        let body = self.build_body(&request);

        debug!(
            model = %self.model,
            memory_turns = request.memory.len(),
            "Sending streaming request"
        );

        let response = self
            .client
            .post(format!("{}?alt=sse", self.url("streamGenerateContent")))
            .header("x-goog-api-key", &self.api_key)
            .header("Accept", "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        if response.status().as_u16() != 200 {
            return Err(Self::status_error(response).await);
        }

        let (tx, rx) = tokio::sync::mpsc::channel(64);

        // Read the SSE byte stream and forward text fragments. A transport
        // failure mid-stream becomes one final in-band sentinel fragment.
        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut buffer = String::new();

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        warn!(error = %e, "Stream interrupted mid-response");
                        let _ = tx.send(STREAM_INTERRUPTED.to_string()).await;
                        return;
                    }
                };

                buffer.push_str(&String::from_utf8_lossy(&bytes));

                // Process complete lines
                while let Some(line_end) = buffer.find('\n') {
                    let line = buffer[..line_end].trim_end_matches('\r').to_string();
                    buffer = buffer[line_end + 1..].to_string();

                    if line.is_empty() || line.starts_with(':') {
                        continue;
                    }

                    let Some(data) = line.strip_prefix("data: ") else {
                        continue;
                    };

                    match serde_json::from_str::<ApiGenerateResponse>(data.trim()) {
                        Ok(chunk) => {
                            if let Some(text) = chunk_text(&chunk) {
                                if !text.is_empty() && tx.send(text).await.is_err() {
                                    return; // receiver dropped
                                }
                            }
                            // A safety stop ends the stream with the sentinel:
                            // partial output already sent is kept.
                            if chunk_blocked(&chunk) {
                                warn!("Stream stopped by safety filter");
                                let _ = tx.send(STREAM_INTERRUPTED.to_string()).await;
                                return;
                            }
                        }
                        Err(e) => {
                            trace!(data = %data, error = %e, "Ignoring unparseable SSE chunk");
                        }
                    }
                }
            }
        });

        Ok(rx)
    }
}

/// Pull the answer text out of a complete response.
fn extract_text(response: &ApiGenerateResponse) -> Result<String, ProviderError> {
    if let Some(ref feedback) = response.prompt_feedback {
        if let Some(ref reason) = feedback.block_reason {
            return Err(ProviderError::Blocked(format!(
                "Prompt blocked: {reason}"
            )));
        }
    }

    let candidate = response
        .candidates
        .first()
        .ok_or_else(|| ProviderError::Blocked("No candidates in response".into()))?;

    if candidate
        .finish_reason
        .as_deref()
        .is_some_and(|r| r == "SAFETY")
    {
        return Err(ProviderError::Blocked("Candidate stopped for safety".into()));
    }

    let text: String = candidate
        .content
        .as_ref()
        .map(|c| {
            c.parts
                .iter()
                .filter_map(|p| p.text.as_deref())
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(ProviderError::Blocked("Candidate contained no text".into()));
    }

    Ok(text.trim().to_string())
}

/// Text carried by one streaming chunk, if any.
fn chunk_text(chunk: &ApiGenerateResponse) -> Option<String> {
    let candidate = chunk.candidates.first()?;
    let content = candidate.content.as_ref()?;
    let text: String = content
        .parts
        .iter()
        .filter_map(|p| p.text.as_deref())
        .collect::<Vec<_>>()
        .join("");
    Some(text)
}

/// Whether a streaming chunk signals a safety stop.
fn chunk_blocked(chunk: &ApiGenerateResponse) -> bool {
    chunk
        .candidates
        .first()
        .and_then(|c| c.finish_reason.as_deref())
        .is_some_and(|r| r == "SAFETY")
        || chunk
            .prompt_feedback
            .as_ref()
            .is_some_and(|f| f.block_reason.is_some())
}

// --- Gemini API types (internal) ---

#[derive(Debug, Serialize)]
struct ApiGenerateRequest {
    #[serde(rename = "system_instruction")]
    system_instruction: ApiSystemInstruction,
    contents: Vec<ApiContent>,
}

#[derive(Debug, Serialize)]
struct ApiSystemInstruction {
    parts: Vec<ApiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiContent {
    #[serde(default)]
    role: String,
    #[serde(default)]
    parts: Vec<ApiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(
        default,
        rename = "inline_data",
        alias = "inlineData",
        skip_serializing_if = "Option::is_none"
    )]
    inline_data: Option<ApiInlineData>,
}

impl ApiPart {
    fn text(s: &str) -> Self {
        Self {
            text: Some(s.to_string()),
            inline_data: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiInlineData {
    #[serde(rename = "mime_type", alias = "mimeType")]
    mime_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
struct ApiGenerateResponse {
    #[serde(default)]
    candidates: Vec<ApiCandidate>,
    #[serde(default, rename = "promptFeedback")]
    prompt_feedback: Option<ApiPromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct ApiCandidate {
    #[serde(default)]
    content: Option<ApiContent>,
    #[serde(default, rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiPromptFeedback {
    #[serde(default, rename = "blockReason")]
    block_reason: Option<String>,
}
