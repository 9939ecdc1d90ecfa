//! Configuration loading, validation, and management for FarmBuddy.
//!
//! Loads configuration from `~/.farmbuddy/config.toml` with environment
//! variable overrides for all credentials. Validates settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Persona instruction fixed on the model provider at construction.
pub const SYSTEM_INSTRUCTION: &str = "\
You are FarmBuddy, an expert agricultural advisor for Nigerian smallholder farmers. \
Your goal is to provide accurate, practical, and easy-to-understand farming advice.
- Prioritize organic and cost-effective solutions.
- Use simple English.
- If you don't know the answer, admit it and suggest consulting a local extension agent.";

/// The root configuration structure.
///
/// Maps directly to `~/.farmbuddy/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Google AI Studio API key for the Gemini provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub google_api_key: Option<String>,

    /// OpenWeatherMap API key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openweather_api_key: Option<String>,

    /// Telegram bot token from @BotFather
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telegram_bot_token: Option<String>,

    /// Model used for chat and vision
    #[serde(default = "default_model")]
    pub model: String,

    /// Model used for title summarization
    #[serde(default = "default_title_model")]
    pub title_model: String,

    /// Default response language code (en, ha, ig, yo)
    #[serde(default = "default_language")]
    pub language: String,

    /// Override for the persona system instruction
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_instruction_override: Option<String>,

    /// Gateway configuration
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Persistence configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Speech (STT/TTS) configuration
    #[serde(default)]
    pub speech: SpeechConfig,
}

fn default_model() -> String {
    "gemini-flash-lite-latest".into()
}
fn default_title_model() -> String {
    "gemini-flash-latest".into()
}
fn default_language() -> String {
    "en".into()
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("google_api_key", &redact(&self.google_api_key))
            .field("openweather_api_key", &redact(&self.openweather_api_key))
            .field("telegram_bot_token", &redact(&self.telegram_bot_token))
            .field("model", &self.model)
            .field("title_model", &self.title_model)
            .field("language", &self.language)
            .field("gateway", &self.gateway)
            .field("store", &self.store)
            .field("speech", &self.speech)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// Directory where uploaded plant images are stored
    #[serde(default = "default_upload_dir")]
    pub upload_dir: String,
}

fn default_port() -> u16 {
    8600
}
fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_upload_dir() -> String {
    "plant_images".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            upload_dir: default_upload_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite database path. `sqlite::memory:` for an ephemeral store.
    #[serde(default = "default_db_path")]
    pub database_path: String,
}

fn default_db_path() -> String {
    "farmbuddy.db".into()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    /// OpenAI-compatible endpoint used for audio transcription
    #[serde(default = "default_transcription_url")]
    pub transcription_url: String,

    /// API key for the transcription endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcription_api_key: Option<String>,

    /// Endpoint for the native-language voice backend
    #[serde(default)]
    pub native_voice_url: Option<String>,

    /// Endpoint for the cloud narrator voice backend
    #[serde(default)]
    pub narrator_voice_url: Option<String>,

    /// Endpoint for the generic fallback voice backend
    #[serde(default)]
    pub generic_voice_url: Option<String>,
}

fn default_transcription_url() -> String {
    "https://api.openai.com/v1/audio/transcriptions".into()
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            transcription_url: default_transcription_url(),
            transcription_api_key: None,
            native_voice_url: None,
            narrator_voice_url: None,
            generic_voice_url: None,
        }
    }
}

/// Errors surfaced while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl AppConfig {
    /// Load configuration from the default path (~/.farmbuddy/config.toml).
    ///
    /// Environment variables override file values for credentials:
    /// - `GOOGLE_API_KEY`
    /// - `OPENWEATHER_API_KEY`
    /// - `TELEGRAM_BOT_TOKEN`
    /// - `FARMBUDDY_MODEL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        if let Ok(key) = std::env::var("GOOGLE_API_KEY") {
            config.google_api_key = Some(key);
        }
        if let Ok(key) = std::env::var("OPENWEATHER_API_KEY") {
            config.openweather_api_key = Some(key);
        }
        if let Ok(token) = std::env::var("TELEGRAM_BOT_TOKEN") {
            config.telegram_bot_token = Some(token);
        }
        if let Ok(model) = std::env::var("FARMBUDDY_MODEL") {
            config.model = model;
        }

        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".farmbuddy")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.model.trim().is_empty() {
            return Err(ConfigError::ValidationError("model must not be empty".into()));
        }
        if !matches!(self.language.as_str(), "en" | "ha" | "ig" | "yo") {
            return Err(ConfigError::ValidationError(format!(
                "language must be one of en, ha, ig, yo (got '{}')",
                self.language
            )));
        }
        Ok(())
    }

    /// The persona instruction to fix on the provider.
    pub fn system_instruction(&self) -> &str {
        self.system_instruction_override
            .as_deref()
            .unwrap_or(SYSTEM_INSTRUCTION)
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            google_api_key: None,
            openweather_api_key: None,
            telegram_bot_token: None,
            model: default_model(),
            title_model: default_title_model(),
            language: default_language(),
            system_instruction_override: None,
            gateway: GatewayConfig::default(),
            store: StoreConfig::default(),
            speech: SpeechConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}
