//! Audio transcription.
//!
//! Posts audio to an OpenAI-compatible `/audio/transcriptions` endpoint as
//! multipart form data and returns the plain text.

use async_trait::async_trait;
use farmbuddy_core::error::SpeechError;
use serde::Deserialize;
use tracing::debug;

const REQUEST_TIMEOUT_SECS: u64 = 60;

/// Converts spoken audio to text.
#[async_trait]
pub trait Transcriber: Send + Sync {
    fn name(&self) -> &str;

    /// Transcribe raw audio bytes. Empty audio transcribes to an empty
    /// string without a backend call.
    async fn transcribe(&self, audio: Vec<u8>, filename: &str) -> Result<String, SpeechError>;
}

/// Whisper-style transcription over an OpenAI-compatible endpoint.
pub struct WhisperTranscriber {
    url: String,
    api_key: Option<String>,
    model: String,
    client: reqwest::Client,
}

impl WhisperTranscriber {
    pub fn new(url: impl Into<String>, api_key: Option<String>) -> Result<Self, SpeechError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| {
                SpeechError::TranscriptionFailed(format!("Failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            url: url.into(),
            api_key,
            model: "whisper-1".to_string(),
            client,
        })
    }
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    #[serde(default)]
    text: String,
}

#[async_trait]
impl Transcriber for WhisperTranscriber {
    fn name(&self) -> &str {
        "whisper"
    }

    async fn transcribe(&self, audio: Vec<u8>, filename: &str) -> Result<String, SpeechError> {
        if audio.is_empty() {
            return Ok(String::new());
        }

        let api_key = self.api_key.as_ref().ok_or_else(|| {
            SpeechError::NotConfigured("transcription API key is not set".into())
        })?;

        debug!(bytes = audio.len(), filename, "Transcribing audio");

        let part = reqwest::multipart::Part::bytes(audio)
            .file_name(filename.to_string())
            .mime_str("application/octet-stream")
            .map_err(|e| SpeechError::TranscriptionFailed(e.to_string()))?;

        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", self.model.clone());

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| SpeechError::TranscriptionFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SpeechError::TranscriptionFailed(format!(
                "endpoint returned {}: {body}",
                status.as_u16()
            )));
        }

        let parsed: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| SpeechError::TranscriptionFailed(format!("bad response: {e}")))?;

        Ok(parsed.text.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_audio_short_circuits() {
        let transcriber =
            WhisperTranscriber::new("https://api.openai.com/v1/audio/transcriptions", None)
                .unwrap();
        let text = transcriber.transcribe(Vec::new(), "voice.ogg").await.unwrap();
        assert_eq!(text, "");
    }

    #[tokio::test]
    async fn missing_key_is_not_configured() {
        let transcriber =
            WhisperTranscriber::new("https://api.openai.com/v1/audio/transcriptions", None)
                .unwrap();
        let err = transcriber
            .transcribe(vec![1, 2, 3], "voice.ogg")
            .await
            .unwrap_err();
        assert!(matches!(err, SpeechError::NotConfigured(_)));
    }

    #[test]
    fn parses_transcription_response() {
        let parsed: TranscriptionResponse =
            serde_json::from_str(r#"{"text": "  How do I plant cassava?  "}"#).unwrap();
        assert_eq!(parsed.text.trim(), "How do I plant cassava?");
    }
}
