//! `farmbuddy bot` — Start the Telegram bot (long polling).

use std::sync::Arc;

use farmbuddy_assistant::Assistant;
use farmbuddy_channels::{HttpBotApi, TelegramBot, TelegramConfig};
use farmbuddy_config::AppConfig;
use farmbuddy_core::provider::ModelProvider;
use farmbuddy_core::Language;
use farmbuddy_providers::GeminiProvider;
use farmbuddy_speech::{Transcriber, WhisperTranscriber};
use farmbuddy_weather::OpenWeatherClient;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    let Some(token) = config.telegram_bot_token.clone() else {
        eprintln!();
        eprintln!("  ERROR: No Telegram bot token configured!");
        eprintln!();
        eprintln!("  Set the environment variable:");
        eprintln!("    TELEGRAM_BOT_TOKEN='123456:ABC-...'");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        eprintln!("  Get a token from @BotFather on Telegram.");
        eprintln!();
        return Err("No Telegram bot token found. See above for setup instructions.".into());
    };

    let api_key = config
        .google_api_key
        .clone()
        .ok_or("No Google API key configured. Set GOOGLE_API_KEY.")?;

    let provider: Arc<dyn ModelProvider> = Arc::new(GeminiProvider::new(
        api_key,
        &config.model,
        config.system_instruction(),
    )?);
    let assistant = Assistant::new(provider);

    let weather = match &config.openweather_api_key {
        Some(_) => Some(Arc::new(OpenWeatherClient::new(
            config.openweather_api_key.clone(),
        )?)),
        None => None,
    };

    let transcriber: Option<Arc<dyn Transcriber>> =
        if config.speech.transcription_api_key.is_some() {
            Some(Arc::new(WhisperTranscriber::new(
                &config.speech.transcription_url,
                config.speech.transcription_api_key.clone(),
            )?))
        } else {
            None
        };

    let api = Arc::new(HttpBotApi::new(&TelegramConfig { bot_token: token })?);
    let bot = TelegramBot::new(
        api,
        assistant,
        weather,
        transcriber,
        Language::from_code(&config.language),
    );

    println!("🌾 FarmBuddy Telegram Bot");
    println!("   Model:    {}", config.model);
    println!("   Language: {}", config.language);
    println!("   Weather:  {}", if config.openweather_api_key.is_some() { "configured" } else { "not configured" });
    println!();
    println!("   Polling for updates. Ctrl+C to stop.");

    bot.run().await?;

    Ok(())
}
