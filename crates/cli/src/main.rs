//! FarmBuddy CLI — the main entry point.
//!
//! Commands:
//! - `gateway` — Start the HTTP API server for the chat UI
//! - `bot`     — Start the Telegram bot (long polling)
//! - `chat`    — Interactive chat or single-message mode in the terminal

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "farmbuddy",
    about = "FarmBuddy — agricultural advice assistant",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway server
    Gateway {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Start the Telegram bot
    Bot,

    /// Chat with the assistant in the terminal
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Response language code (en, ha, ig, yo)
        #[arg(short, long)]
        language: Option<String>,

        /// Wait for the complete answer instead of streaming fragments
        #[arg(long)]
        no_stream: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Gateway { port } => commands::gateway::run(port).await?,
        Commands::Bot => commands::bot::run().await?,
        Commands::Chat {
            message,
            language,
            no_stream,
        } => commands::chat::run(message, language, no_stream).await?,
    }

    Ok(())
}
