use chatdeck_types::Provider;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("no API key configured for provider {0}")]
    MissingApiKey(Provider),

    /// No token arrived within the provider timeout.
    #[error("provider did not start answering within {}ms", .0.as_millis())]
    Timeout(Duration),

    /// The body went quiet for the provider timeout after tokens had flowed.
    #[error("provider stalled for {}ms mid-stream", .0.as_millis())]
    Idle(Duration),

    #[error("request cancelled")]
    Cancelled,

    #[error("provider answered {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("provider reported an error mid-stream: {0}")]
    Stream(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("malformed provider response: {0}")]
    Decode(String),
}
