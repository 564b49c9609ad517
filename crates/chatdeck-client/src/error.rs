use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A non-2xx answer from the chatdeck server, carrying its `error` and
    /// `details` fields.
    #[error("{}", render_server_error(.message, .details.as_deref()))]
    Server {
        status: u16,
        message: String,
        details: Option<String>,
    },

    #[error("request did not complete within {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("playback failed: {0}")]
    Playback(String),

    #[error("invalid response: {0}")]
    Decode(String),
}

fn render_server_error(message: &str, details: Option<&str>) -> String {
    match details {
        Some(details) if !details.is_empty() => format!("{message}: {details}"),
        _ => message.to_string(),
    }
}

#[derive(serde::Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    details: Option<serde_json::Value>,
}

impl ClientError {
    pub(crate) async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let (message, details) = match serde_json::from_str::<ErrorBody>(&body) {
            Ok(parsed) => (
                parsed
                    .error
                    .unwrap_or_else(|| format!("server answered {status}")),
                parsed.details.map(|d| match d {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                }),
            ),
            Err(_) => (format!("server answered {status}"), None),
        };
        ClientError::Server {
            status: status.as_u16(),
            message,
            details,
        }
    }

    /// Whether the server failed (5xx) and the request may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ClientError::Server { status, .. } if *status >= 500)
    }
}
