//! Shared types and constants for chatdeck.
//!
//! This crate provides the foundational types used across all chatdeck
//! crates: the closed set of inference providers and the model catalog each
//! one exposes, chat roles and turns, and the fixed set of synthesis voices.
//!
//! No crate in the workspace depends on anything *except* `chatdeck-types`
//! for cross-cutting type definitions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub mod voice;

pub use voice::Voice;

/// System prompt used when a chatbot has none configured.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful and friendly assistant.";

/// Errors produced when parsing a wire value into one of the closed enums.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
    #[error("unknown voice: {0}")]
    UnknownVoice(String),
    #[error("unknown role: {0}")]
    UnknownRole(String),
}

/// A selectable model in a provider's catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModelOption {
    /// Identifier sent to the provider API.
    pub value: &'static str,
    /// Human-readable label shown in the dashboard.
    pub label: &'static str,
}

/// Models available through the Groq provider.
pub const GROQ_MODELS: &[ModelOption] = &[
    ModelOption {
        value: "meta-llama/llama-4-maverick-17b-128e-instruct",
        label: "Meta Llama 4 Maverick",
    },
    ModelOption {
        value: "llama-3.3-70b-versatile",
        label: "Llama 3.3 70B Versatile",
    },
    ModelOption {
        value: "meta-llama/llama-4-scout-17b-16e-instruct",
        label: "Meta Llama 4 Scout",
    },
];

/// Models available through the OpenAI provider.
pub const OPENAI_MODELS: &[ModelOption] = &[
    ModelOption {
        value: "gpt-4-turbo",
        label: "GPT-4 Turbo",
    },
    ModelOption {
        value: "gpt-4",
        label: "GPT-4",
    },
    ModelOption {
        value: "gpt-3.5-turbo",
        label: "GPT-3.5 Turbo",
    },
];

/// Hosted inference providers a chatbot can be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Groq,
    OpenAi,
}

impl Provider {
    /// All known providers, in catalog order.
    pub const ALL: [Provider; 2] = [Provider::Groq, Provider::OpenAi];

    /// Returns the wire label for this provider.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Groq => "groq",
            Self::OpenAi => "openai",
        }
    }

    /// Returns the model catalog for this provider.
    pub fn models(self) -> &'static [ModelOption] {
        match self {
            Self::Groq => GROQ_MODELS,
            Self::OpenAi => OPENAI_MODELS,
        }
    }

    /// Whether `model` is listed in this provider's catalog.
    pub fn supports_model(self, model: &str) -> bool {
        self.models().iter().any(|m| m.value == model)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "groq" => Ok(Self::Groq),
            "openai" => Ok(Self::OpenAi),
            _ => Err(ParseError::UnknownProvider(s.to_string())),
        }
    }
}

/// Author of a chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            "system" => Ok(Self::System),
            _ => Err(ParseError::UnknownRole(s.to_string())),
        }
    }
}

/// A single message exchanged with a chatbot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Keeps only the most recent `max` turns, preserving order.
pub fn recent_turns(turns: &[ChatTurn], max: usize) -> &[ChatTurn] {
    let start = turns.len().saturating_sub(max);
    &turns[start..]
}

#[derive(Deserialize)]
struct UpstreamErrorBody {
    error: UpstreamErrorDetail,
}

#[derive(Deserialize)]
struct UpstreamErrorDetail {
    #[serde(default)]
    message: String,
}

/// Extracts a readable message from a hosted API's error body.
///
/// OpenAI-compatible services answer `{"error": {"message": ...}}`; anything
/// else is returned trimmed as-is.
pub fn upstream_error_message(body: &str) -> String {
    match serde_json::from_str::<UpstreamErrorBody>(body) {
        Ok(parsed) if !parsed.error.message.is_empty() => parsed.error.message,
        _ => body.trim().to_string(),
    }
}
