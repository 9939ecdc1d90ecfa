//! HTTP API gateway for the FarmBuddy chat UI.
//!
//! Exposes the chat, conversation, weather, image, and speech endpoints
//! the single-page UI talks to. Built on axum.

pub mod api;
pub mod image;

use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use farmbuddy_assistant::{Assistant, TitleSummarizer};
use farmbuddy_config::AppConfig;
use farmbuddy_core::provider::ModelProvider;
use farmbuddy_core::session::SessionStore;
use farmbuddy_core::store::ConversationStore;
use farmbuddy_core::Language;
use farmbuddy_providers::GeminiProvider;
use farmbuddy_speech::{HttpVoice, SpeechRouter, Transcriber, VoiceBackend, WhisperTranscriber};
use farmbuddy_store::SqliteStore;
use farmbuddy_weather::OpenWeatherClient;
use tower_http::cors::CorsLayer;
use tracing::info;

/// Request body ceiling: the 5 MB image limit plus multipart overhead.
const BODY_LIMIT_BYTES: usize = 6 * 1024 * 1024;

/// Shared application state.
pub struct AppState {
    pub assistant: Assistant,
    pub titles: TitleSummarizer,
    pub store: Arc<dyn ConversationStore>,
    pub weather: Arc<OpenWeatherClient>,
    pub speech: Arc<SpeechRouter>,
    pub transcriber: Option<Arc<dyn Transcriber>>,
    pub sessions: SessionStore,
    pub language: Language,
    pub upload_dir: PathBuf,
}

pub type SharedState = Arc<AppState>;

/// Build the gateway router with all routes and layers.
pub fn build_router(state: SharedState) -> Router {
    api::api_router(state)
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .layer(CorsLayer::permissive())
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Build the state from configuration and start the HTTP server.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let api_key = config.google_api_key.clone().unwrap_or_default();
    let provider: Arc<dyn ModelProvider> = Arc::new(GeminiProvider::new(
        api_key.clone(),
        &config.model,
        config.system_instruction(),
    )?);
    let title_provider: Arc<dyn ModelProvider> = Arc::new(GeminiProvider::new(
        api_key,
        &config.title_model,
        config.system_instruction(),
    )?);

    let store = Arc::new(SqliteStore::new(&config.store.database_path).await?);
    let weather = Arc::new(OpenWeatherClient::new(config.openweather_api_key.clone())?);

    let mut speech = SpeechRouter::new();
    if let Some(url) = &config.speech.native_voice_url {
        speech = speech.with_backend(
            VoiceBackend::NativeVoice,
            Arc::new(HttpVoice::new("native_voice", url)?),
        );
    }
    if let Some(url) = &config.speech.narrator_voice_url {
        speech = speech.with_backend(
            VoiceBackend::CloudNarrator,
            Arc::new(HttpVoice::new("cloud_narrator", url)?),
        );
    }
    if let Some(url) = &config.speech.generic_voice_url {
        speech = speech.with_backend(
            VoiceBackend::Generic,
            Arc::new(HttpVoice::new("generic", url)?),
        );
    }

    let transcriber: Option<Arc<dyn Transcriber>> =
        if config.speech.transcription_api_key.is_some() {
            Some(Arc::new(WhisperTranscriber::new(
                &config.speech.transcription_url,
                config.speech.transcription_api_key.clone(),
            )?))
        } else {
            None
        };

    let upload_dir = PathBuf::from(&config.gateway.upload_dir);
    tokio::fs::create_dir_all(&upload_dir).await?;

    let state = Arc::new(AppState {
        assistant: Assistant::new(provider),
        titles: TitleSummarizer::new(title_provider),
        store,
        weather,
        speech: Arc::new(speech),
        transcriber,
        sessions: SessionStore::new(),
        language: Language::from_code(&config.language),
        upload_dir,
    });

    let app = build_router(state);

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
