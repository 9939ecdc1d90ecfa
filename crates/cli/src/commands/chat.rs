//! `farmbuddy chat` — Interactive or single-message chat in the terminal.

use std::io::{BufRead, Write};
use std::sync::Arc;

use farmbuddy_assistant::context::SituationalContext;
use farmbuddy_assistant::{APOLOGY, Assistant};
use farmbuddy_config::AppConfig;
use farmbuddy_core::message::Turn;
use farmbuddy_core::provider::ModelProvider;
use farmbuddy_core::Language;
use farmbuddy_providers::GeminiProvider;

pub async fn run(
    message: Option<String>,
    language: Option<String>,
    no_stream: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    // Check for API key early — give a clear error
    let Some(api_key) = config.google_api_key.clone() else {
        eprintln!();
        eprintln!("  ERROR: No Google API key configured!");
        eprintln!();
        eprintln!("  Set the environment variable:");
        eprintln!("    GOOGLE_API_KEY='AIza...'");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        eprintln!("  Get a key at: https://aistudio.google.com/apikey");
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    };

    let provider: Arc<dyn ModelProvider> = Arc::new(GeminiProvider::new(
        api_key,
        &config.model,
        config.system_instruction(),
    )?);
    let assistant = Assistant::new(provider);

    let language = language
        .as_deref()
        .map(Language::from_code)
        .unwrap_or_else(|| Language::from_code(&config.language));

    if let Some(msg) = message {
        // Single message mode
        let history = vec![Turn::user(&msg)];
        answer_turn(&assistant, &history, language, no_stream).await?;
        return Ok(());
    }

    // Interactive mode: history lives in memory for the session only.
    println!();
    println!("  ╔══════════════════════════════════════════════╗");
    println!("  ║       FarmBuddy — Interactive Chat           ║");
    println!("  ╚══════════════════════════════════════════════╝");
    println!();
    println!("  Model:    {}", config.model);
    println!("  Language: {}", language.code());
    println!();
    println!("  Type your question and press Enter.");
    println!("  Type 'exit' or 'quit' to leave.");
    println!();

    let stdin = std::io::stdin();
    let mut history: Vec<Turn> = Vec::new();

    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break; // EOF
        }

        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if text == "exit" || text == "quit" {
            break;
        }

        history.push(Turn::user(text));
        println!();
        print!("  FarmBuddy > ");
        std::io::stdout().flush()?;

        let answer = answer_turn(&assistant, &history, language, no_stream).await?;
        history.push(Turn::assistant(answer));
        println!();
    }

    println!();
    println!("  Goodbye! 👋");
    println!();

    Ok(())
}

/// Produce one answer, printing it as it arrives, and return the full text
/// so the caller can extend the in-memory history.
async fn answer_turn(
    assistant: &Assistant,
    history: &[Turn],
    language: Language,
    no_stream: bool,
) -> Result<String, Box<dyn std::error::Error>> {
    let situation = SituationalContext::now(language, None);

    if no_stream {
        let answer = match assistant.respond(history, &situation).await {
            Ok(answer) => answer,
            Err(e) => {
                tracing::warn!(error = %e, "Model call failed");
                APOLOGY.to_string()
            }
        };
        println!("{answer}");
        return Ok(answer);
    }

    let mut rx = match assistant.respond_stream(history, &situation).await {
        Ok(rx) => rx,
        Err(e) => {
            tracing::warn!(error = %e, "Model call failed");
            println!("{APOLOGY}");
            return Ok(APOLOGY.to_string());
        }
    };

    let mut answer = String::new();
    while let Some(fragment) = rx.recv().await {
        print!("{fragment}");
        std::io::stdout().flush()?;
        answer.push_str(&fragment);
    }
    println!();

    Ok(answer)
}
