//! Speech for FarmBuddy: audio transcription and voice synthesis with an
//! explicit per-language backend fallback chain.

pub mod synthesis;
pub mod transcribe;

pub use synthesis::{HttpVoice, SpeechRouter, Synthesizer, VoiceBackend};
pub use transcribe::{Transcriber, WhisperTranscriber};
