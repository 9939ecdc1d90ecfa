pub mod bot;
pub mod chat;
pub mod gateway;
