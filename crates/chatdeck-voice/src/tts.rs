use crate::config::SpeechConfig;
use crate::error::VoiceError;
use crate::upstream_error;
use bytes::Bytes;
use chatdeck_types::Voice;
use serde::Serialize;
use std::borrow::Cow;

#[derive(Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: Voice,
    response_format: &'static str,
    speed: f32,
}

/// Cuts `text` to its first `max_chars` characters followed by `...`.
///
/// Text within the limit is returned unchanged.
pub fn truncate_text(text: &str, max_chars: usize) -> Cow<'_, str> {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => Cow::Owned(format!("{}...", &text[..byte_idx])),
        None => Cow::Borrowed(text),
    }
}

/// Text-to-speech through the hosted `/audio/speech` endpoint.
#[derive(Debug, Clone)]
pub struct TtsService {
    http: reqwest::Client,
    config: SpeechConfig,
}

impl TtsService {
    pub fn new(http: reqwest::Client, config: SpeechConfig) -> Self {
        Self { http, config }
    }

    /// Synthesizes `text` with `voice` and returns MP3 bytes.
    pub async fn synthesize(&self, text: &str, voice: Voice) -> Result<Bytes, VoiceError> {
        if text.is_empty() {
            return Err(VoiceError::EmptyText);
        }
        if self.config.api_key.is_empty() {
            return Err(VoiceError::MissingApiKey);
        }

        let input = truncate_text(text, self.config.max_tts_chars);
        if input.len() != text.len() {
            tracing::debug!(
                original_chars = text.chars().count(),
                limit = self.config.max_tts_chars,
                "truncating synthesis input"
            );
        }

        let body = SpeechRequest {
            model: &self.config.tts_model,
            input: &input,
            voice,
            response_format: "mp3",
            speed: 1.0,
        };

        let timeout = self.config.tts_timeout();
        let call = async {
            let response = self
                .http
                .post(self.config.endpoint("audio/speech"))
                .bearer_auth(&self.config.api_key)
                .json(&body)
                .send()
                .await?;
            if !response.status().is_success() {
                return Err(upstream_error(response).await);
            }
            Ok::<_, VoiceError>(response.bytes().await?)
        };

        let audio = tokio::time::timeout(timeout, call)
            .await
            .map_err(|_| VoiceError::Timeout(timeout))??;

        if audio.is_empty() {
            return Err(VoiceError::EmptyAudio);
        }
        tracing::debug!(bytes = audio.len(), %voice, "speech synthesized");
        Ok(audio)
    }
}
