//! Embedded web UI for TableTalk.

pub mod chat;

pub use chat::CHAT_HTML;
