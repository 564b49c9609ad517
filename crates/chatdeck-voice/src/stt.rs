use crate::config::SpeechConfig;
use crate::error::VoiceError;
use crate::upstream_error;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};

/// Hosted transcription rejects uploads above 25 MiB.
const MAX_STT_INPUT_BYTES: usize = 25 * 1024 * 1024;

/// Result of a transcription, as returned to API callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transcription {
    pub text: String,
    pub language: Option<String>,
    pub duration_in_seconds: Option<f64>,
}

#[derive(Deserialize)]
struct VerboseTranscription {
    text: String,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
}

/// An uploaded recording.
#[derive(Debug, Clone)]
pub struct AudioUpload {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub content_type: Option<String>,
}

/// Speech-to-text through the hosted `/audio/transcriptions` endpoint.
#[derive(Debug, Clone)]
pub struct SttService {
    http: reqwest::Client,
    config: SpeechConfig,
}

impl SttService {
    pub fn new(http: reqwest::Client, config: SpeechConfig) -> Self {
        Self { http, config }
    }

    pub async fn transcribe(&self, upload: AudioUpload) -> Result<Transcription, VoiceError> {
        if upload.bytes.len() > MAX_STT_INPUT_BYTES {
            return Err(VoiceError::TooLarge {
                limit: MAX_STT_INPUT_BYTES,
            });
        }
        if self.config.api_key.is_empty() {
            return Err(VoiceError::MissingApiKey);
        }

        let size = upload.bytes.len();
        let mut part = Part::bytes(upload.bytes).file_name(upload.file_name);
        // An unparseable client-supplied type is dropped rather than sent.
        if let Some(content_type) = upload
            .content_type
            .as_deref()
            .filter(|ct| Part::text("").mime_str(ct).is_ok())
        {
            part = part.mime_str(content_type)?;
        }

        let form = Form::new()
            .text("model", self.config.stt_model.clone())
            .text("response_format", "verbose_json")
            .part("file", part);

        let timeout = self.config.stt_timeout();
        let call = async {
            let response = self
                .http
                .post(self.config.endpoint("audio/transcriptions"))
                .bearer_auth(&self.config.api_key)
                .multipart(form)
                .send()
                .await?;
            if !response.status().is_success() {
                return Err(upstream_error(response).await);
            }
            Ok::<_, VoiceError>(response.json::<VerboseTranscription>().await?)
        };

        let verbose = tokio::time::timeout(timeout, call)
            .await
            .map_err(|_| VoiceError::Timeout(timeout))??;

        tracing::debug!(bytes = size, language = ?verbose.language, "audio transcribed");
        Ok(Transcription {
            text: verbose.text,
            language: verbose.language,
            duration_in_seconds: verbose.duration,
        })
    }
}
