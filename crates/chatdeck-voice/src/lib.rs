//! Hosted speech collaborators: synthesis ([`TtsService`]) and transcription
//! ([`SttService`]).
//!
//! Both talk to an OpenAI-compatible audio API and bound every call with their
//! own timeout, reported as [`VoiceError::Timeout`] so callers can map it to a
//! distinct status.

pub mod config;
pub mod error;
pub mod stt;
pub mod tts;

pub use config::SpeechConfig;
pub use error::VoiceError;
pub use stt::{AudioUpload, SttService, Transcription};
pub use tts::{truncate_text, TtsService};

async fn upstream_error(response: reqwest::Response) -> VoiceError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let message = chatdeck_types::upstream_error_message(&body);
    tracing::warn!(status, %message, "speech service rejected request");
    VoiceError::Upstream { status, message }
}
