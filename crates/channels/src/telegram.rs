//! Telegram bot front-end.
//!
//! Long-polls `getUpdates` with offset tracking and dispatches each update
//! to a handler: `/start`, text, shared location, or voice note. The Bot
//! API sits behind the [`BotApi`] trait so handlers are testable without
//! the network.
//!
//! Timeouts are generous (60 s) since many farmers are on 2G/3G networks.

use std::sync::Arc;

use async_trait::async_trait;
use farmbuddy_assistant::context::SituationalContext;
use farmbuddy_assistant::{APOLOGY, Assistant};
use farmbuddy_core::error::ChannelError;
use farmbuddy_core::message::Turn;
use farmbuddy_core::session::SessionStore;
use farmbuddy_core::Language;
use farmbuddy_speech::Transcriber;
use farmbuddy_weather::{current_report, forecast_report, OpenWeatherClient};
use serde::Deserialize;
use tracing::{error, info, warn};

const REQUEST_TIMEOUT_SECS: u64 = 60;

/// How long `getUpdates` holds the connection open waiting for updates.
const POLL_TIMEOUT_SECS: u64 = 50;

const WELCOME: &str = "Hello! I am FarmBuddy 🌾.\n\
I can help you with agricultural advice.\n\n\
📍 **Tip:** Send me your location so I can give you accurate weather advice!\n\
📝 **Usage:** Send text or voice notes.";

const NEED_LOCATION: &str =
    "📍 Please share your location first so I can check the weather for your area.";

/// Telegram channel configuration.
#[derive(Clone)]
pub struct TelegramConfig {
    /// Bot token from @BotFather.
    pub bot_token: String,
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("bot_token", &"[REDACTED]")
            .finish()
    }
}

// --- Bot API update payloads (subset we consume) ---

#[derive(Debug, Clone, Deserialize)]
pub struct TgUpdate {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<TgMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TgMessage {
    pub chat: TgChat,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub location: Option<TgLocation>,
    #[serde(default)]
    pub voice: Option<TgVoice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TgChat {
    pub id: i64,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct TgLocation {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TgVoice {
    pub file_id: String,
}

/// The slice of the Telegram Bot API the bot consumes.
#[async_trait]
pub trait BotApi: Send + Sync {
    /// Long-poll for updates past `offset`.
    async fn get_updates(&self, offset: i64) -> Result<Vec<TgUpdate>, ChannelError>;

    /// Send a text message. `markdown` requests legacy Markdown parse mode.
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        markdown: bool,
    ) -> Result<(), ChannelError>;

    /// Show the "typing…" chat action.
    async fn send_typing(&self, chat_id: i64) -> Result<(), ChannelError>;

    /// Resolve a voice note's file ID and download its bytes.
    async fn download_file(&self, file_id: &str) -> Result<Vec<u8>, ChannelError>;
}

/// Production [`BotApi`] over `api.telegram.org`.
pub struct HttpBotApi {
    token: String,
    base_url: String,
    client: reqwest::Client,
}

impl HttpBotApi {
    pub fn new(config: &TelegramConfig) -> Result<Self, ChannelError> {
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .timeout(std::time::Duration::from_secs(
                REQUEST_TIMEOUT_SECS + POLL_TIMEOUT_SECS,
            ))
            .build()
            .map_err(|e| {
                ChannelError::NotConfigured(format!("Failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            token: config.bot_token.clone(),
            base_url: "https://api.telegram.org".to_string(),
            client,
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.base_url, self.token)
    }
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    #[serde(default)]
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TgFile {
    file_path: Option<String>,
}

impl HttpBotApi {
    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        body: serde_json::Value,
    ) -> Result<T, ChannelError> {
        let response = self
            .client
            .post(self.method_url(method))
            .json(&body)
            .send()
            .await
            .map_err(|e| ChannelError::ConnectionLost(e.to_string()))?;

        let envelope: ApiEnvelope<T> = response
            .json()
            .await
            .map_err(|e| ChannelError::InvalidPayload(e.to_string()))?;

        if !envelope.ok {
            return Err(ChannelError::InvalidPayload(
                envelope.description.unwrap_or_else(|| method.to_string()),
            ));
        }

        envelope
            .result
            .ok_or_else(|| ChannelError::InvalidPayload(format!("{method}: empty result")))
    }
}

#[async_trait]
impl BotApi for HttpBotApi {
    async fn get_updates(&self, offset: i64) -> Result<Vec<TgUpdate>, ChannelError> {
        self.call(
            "getUpdates",
            serde_json::json!({
                "offset": offset,
                "timeout": POLL_TIMEOUT_SECS,
                "allowed_updates": ["message"],
            }),
        )
        .await
    }

    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        markdown: bool,
    ) -> Result<(), ChannelError> {
        let mut body = serde_json::json!({ "chat_id": chat_id, "text": text });
        if markdown {
            body["parse_mode"] = "Markdown".into();
        }
        let _: serde_json::Value =
            self.call("sendMessage", body)
                .await
                .map_err(|e| ChannelError::DeliveryFailed {
                    chat_id: chat_id.to_string(),
                    reason: e.to_string(),
                })?;
        Ok(())
    }

    async fn send_typing(&self, chat_id: i64) -> Result<(), ChannelError> {
        let _: serde_json::Value = self
            .call(
                "sendChatAction",
                serde_json::json!({ "chat_id": chat_id, "action": "typing" }),
            )
            .await?;
        Ok(())
    }

    async fn download_file(&self, file_id: &str) -> Result<Vec<u8>, ChannelError> {
        let file: TgFile = self
            .call("getFile", serde_json::json!({ "file_id": file_id }))
            .await?;

        let path = file
            .file_path
            .ok_or_else(|| ChannelError::InvalidPayload("getFile: no file_path".into()))?;

        let bytes = self
            .client
            .get(format!(
                "{}/file/bot{}/{path}",
                self.base_url, self.token
            ))
            .send()
            .await
            .map_err(|e| ChannelError::ConnectionLost(e.to_string()))?
            .bytes()
            .await
            .map_err(|e| ChannelError::ConnectionLost(e.to_string()))?;

        Ok(bytes.to_vec())
    }
}

/// The FarmBuddy Telegram bot.
pub struct TelegramBot {
    api: Arc<dyn BotApi>,
    assistant: Assistant,
    weather: Option<Arc<OpenWeatherClient>>,
    transcriber: Option<Arc<dyn Transcriber>>,
    sessions: SessionStore,
    language: Language,
}

impl TelegramBot {
    pub fn new(
        api: Arc<dyn BotApi>,
        assistant: Assistant,
        weather: Option<Arc<OpenWeatherClient>>,
        transcriber: Option<Arc<dyn Transcriber>>,
        language: Language,
    ) -> Self {
        Self {
            api,
            assistant,
            weather,
            transcriber,
            sessions: SessionStore::new(),
            language,
        }
    }

    /// Run the long-polling loop until the process is stopped. Poll
    /// failures back off and retry; handler failures degrade to an error
    /// message in the chat.
    pub async fn run(&self) -> Result<(), ChannelError> {
        info!("Starting Telegram bot");
        let mut offset = 0i64;

        loop {
            let updates = match self.api.get_updates(offset).await {
                Ok(updates) => updates,
                Err(e) => {
                    warn!(error = %e, "getUpdates failed, backing off");
                    tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                    continue;
                }
            };

            for update in updates {
                offset = offset.max(update.update_id + 1);
                if let Some(message) = update.message {
                    self.handle_message(message).await;
                }
            }
        }
    }

    /// Dispatch one inbound message. Never fails: every error path sends
    /// something to the chat instead.
    pub async fn handle_message(&self, message: TgMessage) {
        let chat_id = message.chat.id;

        let result = if let Some(location) = message.location {
            self.handle_location(chat_id, location).await
        } else if let Some(voice) = message.voice.clone() {
            self.handle_voice(chat_id, &voice).await
        } else if let Some(text) = message.text.as_deref() {
            if text.trim() == "/start" {
                self.api.send_message(chat_id, WELCOME, true).await
            } else {
                self.handle_text(chat_id, text).await
            }
        } else {
            Ok(())
        };

        if let Err(e) = result {
            error!(chat_id, error = %e, "Handler failed");
            let _ = self
                .api
                .send_message(chat_id, &format!("Sorry, I encountered an error: {e}"), false)
                .await;
        }
    }

    async fn handle_text(&self, chat_id: i64, text: &str) -> Result<(), ChannelError> {
        let _ = self.api.send_typing(chat_id).await;

        let key = chat_id.to_string();
        let weather = self.sessions.weather_report(&key).await;

        // A weather question before any shared location: remember the
        // request and ask for the location instead of guessing.
        if weather.is_none() && self.weather.is_some() && asks_about_weather(text) {
            self.sessions
                .update(&key, |session| session.forecast_requested = true)
                .await;
            return self.api.send_message(chat_id, NEED_LOCATION, false).await;
        }

        let situation = SituationalContext::now(self.language, weather);
        let history = vec![Turn::user(text)];

        let answer = match self.assistant.respond(&history, &situation).await {
            Ok(answer) => answer,
            Err(e) => {
                warn!(chat_id, error = %e, "Model call failed");
                APOLOGY.to_string()
            }
        };

        self.deliver(chat_id, &answer).await
    }

    async fn handle_location(
        &self,
        chat_id: i64,
        location: TgLocation,
    ) -> Result<(), ChannelError> {
        let _ = self.api.send_typing(chat_id).await;

        let Some(weather) = &self.weather else {
            return self
                .api
                .send_message(chat_id, "⚠️ Weather is not configured on this bot.", false)
                .await;
        };

        let (current, forecast) = tokio::join!(
            weather.current(location.latitude, location.longitude),
            weather.forecast(location.latitude, location.longitude),
        );

        if let Ok(ref data) = current {
            let city = data.name.as_deref().unwrap_or("your area");
            self.api
                .send_message(chat_id, &format!("✅ Location set to **{city}**."), true)
                .await?;
        } else {
            self.api
                .send_message(chat_id, "⚠️ Could not fetch current weather.", false)
                .await?;
        }

        let report = format!(
            "{}\n\n{}",
            current_report(&current),
            forecast_report(&forecast)
        );

        let key = chat_id.to_string();
        let forecast_pending = self
            .sessions
            .get(&key)
            .await
            .map(|session| session.forecast_requested)
            .unwrap_or(false);

        self.sessions
            .update(&key, |session| {
                session.location = Some((location.latitude, location.longitude));
                session.weather_report = Some(report.clone());
                session.forecast_requested = false;
            })
            .await;

        // Deliver the report the user already asked for before the
        // location arrived.
        if forecast_pending {
            self.api.send_message(chat_id, &report, false).await?;
        }

        self.api
            .send_message(
                chat_id,
                "Now I can give you advice based on your local weather! 🌦️",
                false,
            )
            .await
    }

    async fn handle_voice(&self, chat_id: i64, voice: &TgVoice) -> Result<(), ChannelError> {
        let _ = self.api.send_typing(chat_id).await;

        let Some(transcriber) = &self.transcriber else {
            return self
                .api
                .send_message(chat_id, "⚠️ Voice notes are not supported on this bot.", false)
                .await;
        };

        let audio = self.api.download_file(&voice.file_id).await?;
        let text = match transcriber.transcribe(audio, "voice.ogg").await {
            Ok(text) => text,
            Err(e) => {
                warn!(chat_id, error = %e, "Transcription failed");
                String::new()
            }
        };

        if text.is_empty() {
            return self
                .api
                .send_message(chat_id, "Sorry, I couldn't understand the audio.", false)
                .await;
        }

        self.api
            .send_message(chat_id, &format!("🎤 You said: \"{text}\""), false)
            .await?;

        self.handle_text(chat_id, &text).await
    }

    /// Send an answer with the legacy-Markdown downgrade; if Telegram
    /// rejects the markup, resend as plain text.
    async fn deliver(&self, chat_id: i64, answer: &str) -> Result<(), ChannelError> {
        let formatted = answer.replace("**", "*");
        match self.api.send_message(chat_id, &formatted, true).await {
            Ok(()) => Ok(()),
            Err(_) => self.api.send_message(chat_id, answer, false).await,
        }
    }
}

/// Whether a message is asking about weather conditions or the forecast.
fn asks_about_weather(text: &str) -> bool {
    let text = text.to_lowercase();
    text.contains("weather") || text.contains("forecast")
}
