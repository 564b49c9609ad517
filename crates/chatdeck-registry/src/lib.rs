//! Chatbot registry and durable transcript store.
//!
//! All operations are free functions over a borrowed [`rusqlite::Connection`]
//! so callers decide where blocking work runs and how connections are pooled.
//!
//! - [`chatbots`]: CRUD over chatbot configurations.
//! - [`transcript`]: per-chatbot conversations and their append-only messages.
//! - [`demo`]: the fixed table served by the demo chat endpoint.

pub mod chatbots;
pub mod demo;
pub mod transcript;

pub use chatbots::{
    create_chatbot, delete_chatbot, get_chatbot, list_chatbots, update_chatbot, Chatbot,
    ChatbotParams,
};
pub use transcript::{
    append_message, clear_messages, current_conversation, current_or_create_conversation,
    list_messages, record_exchange, Conversation, StoredMessage,
};

use thiserror::Error;

/// Errors that can occur during registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("chatbot not found: {0}")]
    NotFound(String),
    #[error("no conversation for chatbot: {0}")]
    NoConversation(String),
    #[error("invalid chatbot: {0}")]
    Invalid(String),
}

pub(crate) fn now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}
