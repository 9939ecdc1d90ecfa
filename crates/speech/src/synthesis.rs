//! Voice synthesis with an explicit fallback chain.
//!
//! Each language maps to an ordered list of backends; synthesis walks the
//! chain and returns the first success. The chain is a closed table, not an
//! inferred try/except cascade: Nigerian languages prefer the native-voice
//! models, English prefers the cloud narrator, and everything falls back to
//! the generic voice.

use async_trait::async_trait;
use farmbuddy_core::error::SpeechError;
use farmbuddy_core::Language;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

const REQUEST_TIMEOUT_SECS: u64 = 60;

/// The voice backends the router can route to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VoiceBackend {
    /// Native-language voice models (Hausa, Igbo, Yoruba)
    NativeVoice,
    /// Cloud narrator voice (English)
    CloudNarrator,
    /// Generic fallback voice
    Generic,
}

impl VoiceBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoiceBackend::NativeVoice => "native_voice",
            VoiceBackend::CloudNarrator => "cloud_narrator",
            VoiceBackend::Generic => "generic",
        }
    }

    /// The ordered fallback chain for a language.
    pub fn chain(language: Language) -> &'static [VoiceBackend] {
        match language {
            Language::Ha | Language::Ig | Language::Yo => {
                &[VoiceBackend::NativeVoice, VoiceBackend::Generic]
            }
            Language::En => &[VoiceBackend::CloudNarrator, VoiceBackend::Generic],
        }
    }
}

/// Converts text to audio bytes for one backend.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    fn name(&self) -> &str;

    async fn synthesize(&self, text: &str, language: Language) -> Result<Vec<u8>, SpeechError>;
}

/// An HTTP voice backend: POST `{text, language}`, receive audio bytes.
pub struct HttpVoice {
    name: String,
    url: String,
    client: reqwest::Client,
}

impl HttpVoice {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Result<Self, SpeechError> {
        let name = name.into();
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| SpeechError::SynthesisFailed {
                backend: name.clone(),
                reason: format!("Failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            name,
            url: url.into(),
            client,
        })
    }
}

#[async_trait]
impl Synthesizer for HttpVoice {
    fn name(&self) -> &str {
        &self.name
    }

    async fn synthesize(&self, text: &str, language: Language) -> Result<Vec<u8>, SpeechError> {
        let response = self
            .client
            .post(&self.url)
            .json(&serde_json::json!({
                "text": text,
                "language": language.code(),
            }))
            .send()
            .await
            .map_err(|e| SpeechError::SynthesisFailed {
                backend: self.name.clone(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SpeechError::SynthesisFailed {
                backend: self.name.clone(),
                reason: format!("endpoint returned {}", status.as_u16()),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| SpeechError::SynthesisFailed {
                backend: self.name.clone(),
                reason: e.to_string(),
            })?;

        Ok(bytes.to_vec())
    }
}

/// Routes synthesis requests through the per-language fallback chain.
pub struct SpeechRouter {
    backends: HashMap<VoiceBackend, Arc<dyn Synthesizer>>,
}

impl SpeechRouter {
    pub fn new() -> Self {
        Self {
            backends: HashMap::new(),
        }
    }

    pub fn with_backend(
        mut self,
        backend: VoiceBackend,
        synthesizer: Arc<dyn Synthesizer>,
    ) -> Self {
        self.backends.insert(backend, synthesizer);
        self
    }

    /// Synthesize `text`, walking the language's chain. An unconfigured
    /// backend counts as a failed attempt and the chain continues.
    pub async fn synthesize(
        &self,
        text: &str,
        language: Language,
    ) -> Result<Vec<u8>, SpeechError> {
        let mut attempted = Vec::new();

        for backend in VoiceBackend::chain(language) {
            attempted.push(backend.as_str());

            let Some(synthesizer) = self.backends.get(backend) else {
                debug!(backend = backend.as_str(), "Backend not configured, trying next");
                continue;
            };

            match synthesizer.synthesize(text, language).await {
                Ok(audio) => {
                    debug!(
                        backend = backend.as_str(),
                        language = language.code(),
                        bytes = audio.len(),
                        "Synthesis succeeded"
                    );
                    return Ok(audio);
                }
                Err(e) => {
                    warn!(backend = backend.as_str(), error = %e, "Synthesis failed, trying next");
                }
            }
        }

        Err(SpeechError::AllBackendsFailed {
            attempted: attempted.join(", "),
        })
    }
}

impl Default for SpeechRouter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FixedVoice {
        name: &'static str,
        result: Result<Vec<u8>, ()>,
        calls: Mutex<Vec<Language>>,
    }

    impl FixedVoice {
        fn ok(name: &'static str, audio: &[u8]) -> Arc<Self> {
            Arc::new(Self {
                name,
                result: Ok(audio.to_vec()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn failing(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                result: Err(()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Synthesizer for FixedVoice {
        fn name(&self) -> &str {
            self.name
        }

        async fn synthesize(
            &self,
            _text: &str,
            language: Language,
        ) -> Result<Vec<u8>, SpeechError> {
            self.calls.lock().unwrap().push(language);
            match &self.result {
                Ok(audio) => Ok(audio.clone()),
                Err(()) => Err(SpeechError::SynthesisFailed {
                    backend: self.name.to_string(),
                    reason: "scripted failure".into(),
                }),
            }
        }
    }

    #[test]
    fn chains_are_closed_and_exhaustive() {
        assert_eq!(
            VoiceBackend::chain(Language::Ha),
            &[VoiceBackend::NativeVoice, VoiceBackend::Generic]
        );
        assert_eq!(
            VoiceBackend::chain(Language::Ig),
            &[VoiceBackend::NativeVoice, VoiceBackend::Generic]
        );
        assert_eq!(
            VoiceBackend::chain(Language::Yo),
            &[VoiceBackend::NativeVoice, VoiceBackend::Generic]
        );
        assert_eq!(
            VoiceBackend::chain(Language::En),
            &[VoiceBackend::CloudNarrator, VoiceBackend::Generic]
        );
    }

    #[tokio::test]
    async fn hausa_prefers_native_voice() {
        let native = FixedVoice::ok("native", b"native-audio");
        let generic = FixedVoice::ok("generic", b"generic-audio");
        let router = SpeechRouter::new()
            .with_backend(VoiceBackend::NativeVoice, native.clone())
            .with_backend(VoiceBackend::Generic, generic.clone());

        let audio = router.synthesize("Sannu", Language::Ha).await.unwrap();
        assert_eq!(audio, b"native-audio");
        assert_eq!(native.call_count(), 1);
        assert_eq!(generic.call_count(), 0);
    }

    #[tokio::test]
    async fn english_prefers_narrator() {
        let narrator = FixedVoice::ok("narrator", b"narrator-audio");
        let router = SpeechRouter::new()
            .with_backend(VoiceBackend::CloudNarrator, narrator)
            .with_backend(VoiceBackend::Generic, FixedVoice::ok("generic", b"g"));

        let audio = router.synthesize("Hello", Language::En).await.unwrap();
        assert_eq!(audio, b"narrator-audio");
    }

    #[tokio::test]
    async fn failed_backend_falls_through_to_generic() {
        let native = FixedVoice::failing("native");
        let generic = FixedVoice::ok("generic", b"generic-audio");
        let router = SpeechRouter::new()
            .with_backend(VoiceBackend::NativeVoice, native.clone())
            .with_backend(VoiceBackend::Generic, generic);

        let audio = router.synthesize("Kedu", Language::Ig).await.unwrap();
        assert_eq!(audio, b"generic-audio");
        assert_eq!(native.call_count(), 1);
    }

    #[tokio::test]
    async fn unconfigured_backend_is_skipped() {
        let router = SpeechRouter::new()
            .with_backend(VoiceBackend::Generic, FixedVoice::ok("generic", b"g"));

        let audio = router.synthesize("Bawo ni", Language::Yo).await.unwrap();
        assert_eq!(audio, b"g");
    }

    #[tokio::test]
    async fn exhausted_chain_reports_all_attempts() {
        let router = SpeechRouter::new()
            .with_backend(VoiceBackend::NativeVoice, FixedVoice::failing("native"))
            .with_backend(VoiceBackend::Generic, FixedVoice::failing("generic"));

        let err = router.synthesize("Sannu", Language::Ha).await.unwrap_err();
        match err {
            SpeechError::AllBackendsFailed { attempted } => {
                assert_eq!(attempted, "native_voice, generic");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
