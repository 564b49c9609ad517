use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("speech API key is not configured")]
    MissingApiKey,

    #[error("text is required")]
    EmptyText,

    #[error("audio payload exceeds {limit} bytes")]
    TooLarge { limit: usize },

    #[error("speech service did not answer within {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("speech service answered {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("speech service returned no audio")]
    EmptyAudio,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}
