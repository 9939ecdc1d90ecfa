//! Chat channel front-ends for FarmBuddy.
//!
//! Currently one channel: a Telegram bot over the raw Bot API.

pub mod telegram;

pub use telegram::{BotApi, HttpBotApi, TelegramBot, TelegramConfig};
