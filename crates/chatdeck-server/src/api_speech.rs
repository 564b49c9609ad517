//! Text-to-speech and transcription proxies.

use crate::error::ApiError;
use crate::AppState;
use axum::{
    body::Body,
    extract::{
        multipart::MultipartRejection,
        rejection::JsonRejection,
        Extension, Json, Multipart,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use chatdeck_types::Voice;
use chatdeck_voice::{AudioUpload, Transcription, VoiceError};
use serde::Deserialize;
use std::sync::Arc;

/// Request body for `POST /api/text-to-speech`.
#[derive(Debug, Deserialize)]
pub struct SpeechBody {
    #[serde(default)]
    pub text: String,
    pub voice: Option<String>,
}

/// Handler for `POST /api/text-to-speech`.
///
/// Responds with MP3 bytes. The voice is checked before any upstream call.
pub async fn text_to_speech_handler(
    Extension(state): Extension<Arc<AppState>>,
    payload: Result<Json<SpeechBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = payload.map_err(|e| {
        tracing::debug!(error = %e.body_text(), "rejecting speech request body");
        ApiError::BadRequest("Invalid request body".to_string())
    })?;

    if body.text.is_empty() {
        return Err(ApiError::BadRequest("Text is required".to_string()));
    }
    let voice = match body.voice.as_deref() {
        None => Voice::default(),
        Some(raw) => raw
            .parse::<Voice>()
            .map_err(|_| ApiError::BadRequest(format!("Invalid voice: {raw}")))?,
    };

    let audio = state
        .tts
        .synthesize(&body.text, voice)
        .await
        .map_err(speech_error)?;

    tracing::info!(%voice, bytes = audio.len(), "speech synthesized");
    Ok((
        [
            (header::CONTENT_TYPE, "audio/mpeg".to_string()),
            (header::CONTENT_LENGTH, audio.len().to_string()),
            (header::CACHE_CONTROL, "public, max-age=3600".to_string()),
        ],
        Body::from(audio),
    )
        .into_response())
}

fn speech_error(e: VoiceError) -> ApiError {
    match e {
        VoiceError::EmptyText => ApiError::BadRequest("Text is required".to_string()),
        VoiceError::MissingApiKey => {
            tracing::error!("speech API key is not configured");
            ApiError::Internal("Speech service is not configured".to_string())
        }
        VoiceError::Timeout(_) => ApiError::RequestTimeout {
            details: e.to_string(),
        },
        VoiceError::Upstream { status, message } => ApiError::Upstream {
            status: StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY),
            message: "Error generating speech".to_string(),
            details: Some(message),
        },
        VoiceError::EmptyAudio => ApiError::Internal("No audio returned".to_string()),
        other => ApiError::Upstream {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "Error generating speech".to_string(),
            details: Some(other.to_string()),
        },
    }
}

const TRANSCRIBE_FAILED: &str = "Failed to transcribe audio";

/// Handler for `POST /api/transcribe`.
///
/// Expects a multipart body with the recording in the `audio` field.
pub async fn transcribe_handler(
    Extension(state): Extension<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Transcription>, ApiError> {
    let mut multipart =
        multipart.map_err(|e| ApiError::BadRequest(format!("Invalid form data: {}", e.body_text())))?;

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Invalid form data: {}", e.body_text())))?
    {
        if field.name() != Some("audio") {
            continue;
        }
        let file_name = field
            .file_name()
            .filter(|n| !n.is_empty())
            .unwrap_or("audio.webm")
            .to_string();
        let content_type = field.content_type().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Invalid form data: {}", e.body_text())))?;
        upload = Some(AudioUpload {
            bytes: bytes.to_vec(),
            file_name,
            content_type,
        });
        break;
    }

    let upload = upload
        .filter(|u| !u.bytes.is_empty())
        .ok_or_else(|| ApiError::BadRequest("No audio file provided".to_string()))?;

    let size = upload.bytes.len();
    let transcription = state
        .stt
        .transcribe(upload)
        .await
        .map_err(transcription_error)?;

    tracing::info!(
        bytes = size,
        language = transcription.language.as_deref().unwrap_or("unknown"),
        "audio transcribed"
    );
    Ok(Json(transcription))
}

fn transcription_error(e: VoiceError) -> ApiError {
    match e {
        VoiceError::Timeout(_) => ApiError::Timeout("Transcription timed out".to_string()),
        VoiceError::TooLarge { .. } => ApiError::BadRequest(e.to_string()),
        VoiceError::Upstream { .. } => ApiError::Upstream {
            status: StatusCode::BAD_GATEWAY,
            message: TRANSCRIBE_FAILED.to_string(),
            details: Some(e.to_string()),
        },
        other => {
            tracing::error!(error = %other, "transcription failed");
            ApiError::Upstream {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: TRANSCRIBE_FAILED.to_string(),
                details: Some(other.to_string()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn speech_timeout_is_a_request_timeout() {
        let err = speech_error(VoiceError::Timeout(Duration::from_secs(45)));
        assert!(matches!(err, ApiError::RequestTimeout { .. }));
    }

    #[test]
    fn speech_upstream_status_is_passed_through() {
        let err = speech_error(VoiceError::Upstream {
            status: 429,
            message: "Rate limit reached".into(),
        });
        match err {
            ApiError::Upstream {
                status, details, ..
            } => {
                assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
                assert_eq!(details.as_deref(), Some("Rate limit reached"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn transcription_failures_map_to_gateway_codes() {
        assert!(matches!(
            transcription_error(VoiceError::Timeout(Duration::from_secs(30))),
            ApiError::Timeout(_)
        ));
        assert!(matches!(
            transcription_error(VoiceError::Upstream { status: 400, message: "bad".into() }),
            ApiError::Upstream { status, .. } if status == StatusCode::BAD_GATEWAY
        ));
        assert!(matches!(
            transcription_error(VoiceError::MissingApiKey),
            ApiError::Upstream { status, .. } if status == StatusCode::INTERNAL_SERVER_ERROR
        ));
    }
}
