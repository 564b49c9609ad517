use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_tts_model() -> String {
    "tts-1".to_string()
}

fn default_stt_model() -> String {
    "whisper-1".to_string()
}

fn default_tts_timeout_ms() -> u64 {
    45_000
}

fn default_stt_timeout_ms() -> u64 {
    30_000
}

fn default_max_tts_chars() -> usize {
    4_000
}

/// Hosted speech API settings shared by synthesis and transcription.
#[derive(Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default, skip_serializing)]
    pub api_key: String,
    #[serde(default = "default_tts_model")]
    pub tts_model: String,
    #[serde(default = "default_stt_model")]
    pub stt_model: String,
    #[serde(default = "default_tts_timeout_ms")]
    pub tts_timeout_ms: u64,
    #[serde(default = "default_stt_timeout_ms")]
    pub stt_timeout_ms: u64,
    /// Longer synthesis input is cut to this many characters plus `...`.
    #[serde(default = "default_max_tts_chars")]
    pub max_tts_chars: usize,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: String::new(),
            tts_model: default_tts_model(),
            stt_model: default_stt_model(),
            tts_timeout_ms: default_tts_timeout_ms(),
            stt_timeout_ms: default_stt_timeout_ms(),
            max_tts_chars: default_max_tts_chars(),
        }
    }
}

impl fmt::Debug for SpeechConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpeechConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .field("tts_model", &self.tts_model)
            .field("stt_model", &self.stt_model)
            .field("tts_timeout_ms", &self.tts_timeout_ms)
            .field("stt_timeout_ms", &self.stt_timeout_ms)
            .field("max_tts_chars", &self.max_tts_chars)
            .finish()
    }
}

impl SpeechConfig {
    pub fn tts_timeout(&self) -> Duration {
        Duration::from_millis(self.tts_timeout_ms)
    }

    pub fn stt_timeout(&self) -> Duration {
        Duration::from_millis(self.stt_timeout_ms)
    }

    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }
}
