//! HTTP error type shared by every handler.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chatdeck_llm::LlmError;
use chatdeck_registry::RegistryError;
use serde::Serialize;
use thiserror::Error;

/// API error type mapping to HTTP status codes.
///
/// Every variant renders as `{"error": ..., "details"?: ...}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid input: {0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// 504: an upstream call or lookup exceeded its deadline.
    #[error("timed out: {0}")]
    Timeout(String),

    /// 408: the speech service did not answer in time.
    #[error("request timeout: {details}")]
    RequestTimeout { details: String },

    /// A failure attributable to a hosted collaborator, reported with `status`.
    #[error("{message}: {}", .details.as_deref().unwrap_or_default())]
    Upstream {
        status: StatusCode,
        message: String,
        details: Option<String>,
    },

    /// 500 with a fixed public message. The cause is logged where it occurs.
    #[error("internal server error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, details) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, None),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, None),
            ApiError::Timeout(msg) => (StatusCode::GATEWAY_TIMEOUT, msg, None),
            ApiError::RequestTimeout { details } => (
                StatusCode::REQUEST_TIMEOUT,
                "Request timeout".to_string(),
                Some(details),
            ),
            ApiError::Upstream {
                status,
                message,
                details,
            } => (status, message, details),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg, None),
        };

        (status, Json(ErrorBody { error, details })).into_response()
    }
}

impl From<RegistryError> for ApiError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::NotFound(_) => ApiError::NotFound("Chatbot not found".to_string()),
            RegistryError::NoConversation(_) => {
                ApiError::NotFound("No conversation found for chatbot".to_string())
            }
            RegistryError::Invalid(msg) => ApiError::BadRequest(msg),
            RegistryError::Database(e) => {
                tracing::error!(error = %e, "database operation failed");
                ApiError::Internal("Database error".to_string())
            }
        }
    }
}

impl From<r2d2::Error> for ApiError {
    fn from(e: r2d2::Error) -> Self {
        tracing::error!(error = %e, "db connection failed");
        ApiError::Internal("Database unavailable".to_string())
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(e: tokio::task::JoinError) -> Self {
        tracing::error!(error = %e, "blocking task failed");
        ApiError::Internal("Internal server error".to_string())
    }
}

impl From<LlmError> for ApiError {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::Timeout(_) => {
                ApiError::Timeout("The model did not respond in time".to_string())
            }
            LlmError::Upstream { status, message } => ApiError::Upstream {
                status: StatusCode::BAD_GATEWAY,
                message: "Model provider returned an error".to_string(),
                details: Some(format!("{status}: {message}")),
            },
            LlmError::MissingApiKey(provider) => {
                tracing::error!(%provider, "no API key configured");
                ApiError::Internal("Model provider is not configured".to_string())
            }
            other => {
                tracing::error!(error = %other, "completion failed");
                ApiError::Internal("Error generating response".to_string())
            }
        }
    }
}
