//! Hosted LLM inference for chatdeck.
//!
//! Both supported providers speak the OpenAI chat-completions dialect, so a
//! single [`LlmClient`] serves them, keyed by [`chatdeck_types::Provider`].
//! Streamed completions are decoded from server-sent events into a stream of
//! text deltas; awaited completions return the whole reply.

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod sse;

pub use client::{ChatRequest, LlmClient, TokenStream};
pub use config::{ProviderSettings, ProvidersConfig};
pub use error::LlmError;
