//! Speech requests against a chatdeck server.
//!
//! [`SpeechClient::speak`] fetches synthesized audio and hands it to the
//! [`AudioCoordinator`]. Stopping, or starting another `speak`, cancels the
//! request in flight; a cancelled request resolves to
//! [`SpeakOutcome::Aborted`] and is never reported as an error.

use crate::error::ClientError;
use crate::playback::{AudioCoordinator, PlayOutcome};
use bytes::Bytes;
use chatdeck_types::Voice;
use chatdeck_voice::Transcription;
use reqwest::multipart::{Form, Part};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct SpeechClientConfig {
    /// Server origin, e.g. `http://localhost:8080`.
    pub base_url: String,
    pub request_timeout: Duration,
    pub max_retries: u32,
    pub retry_backoff: Duration,
    /// Pause after stopping a previous request before starting the next.
    pub teardown_wait: Duration,
}

impl SpeechClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            request_timeout: Duration::from_secs(30),
            max_retries: 2,
            retry_backoff: Duration::from_secs(1),
            teardown_wait: Duration::from_millis(300),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeakOutcome {
    Played,
    Aborted,
}

pub struct SpeechClient {
    http: reqwest::Client,
    config: SpeechClientConfig,
    player: AudioCoordinator,
    in_flight: Mutex<Option<(u64, CancellationToken)>>,
    generation: AtomicU64,
}

impl SpeechClient {
    pub fn new(config: SpeechClientConfig, player: AudioCoordinator) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
            player,
            in_flight: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    pub fn player(&self) -> &AudioCoordinator {
        &self.player
    }

    /// Synthesizes `text` on the server and plays it.
    pub async fn speak(&self, text: &str, voice: Voice) -> Result<SpeakOutcome, ClientError> {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        if let Some(previous) = self.replace_in_flight(generation, cancel.clone()) {
            previous.cancel();
            self.player.stop().await;
            tokio::select! {
                _ = cancel.cancelled() => return Ok(SpeakOutcome::Aborted),
                _ = tokio::time::sleep(self.config.teardown_wait) => {}
            }
        }

        let result = self.fetch_and_play(text, voice, &cancel).await;
        self.clear_in_flight(generation);

        match result {
            Err(_) if cancel.is_cancelled() => Ok(SpeakOutcome::Aborted),
            other => other,
        }
    }

    /// Cancels any request in flight and stops playback.
    pub async fn stop(&self) {
        if let Some(token) = self.take_in_flight() {
            token.cancel();
        }
        self.player.stop().await;
    }

    /// Uploads a recording for transcription.
    pub async fn transcribe(
        &self,
        audio: Vec<u8>,
        file_name: &str,
    ) -> Result<Transcription, ClientError> {
        let part = Part::bytes(audio).file_name(file_name.to_string());
        let form = Form::new().part("audio", part);

        let call = async {
            let response = self
                .http
                .post(self.config.url("/api/transcribe"))
                .multipart(form)
                .send()
                .await?;
            if !response.status().is_success() {
                return Err(ClientError::from_response(response).await);
            }
            Ok::<_, ClientError>(response.json::<Transcription>().await?)
        };
        tokio::time::timeout(self.config.request_timeout, call)
            .await
            .map_err(|_| ClientError::Timeout(self.config.request_timeout))?
    }

    async fn fetch_and_play(
        &self,
        text: &str,
        voice: Voice,
        cancel: &CancellationToken,
    ) -> Result<SpeakOutcome, ClientError> {
        let audio = tokio::select! {
            _ = cancel.cancelled() => return Ok(SpeakOutcome::Aborted),
            audio = self.fetch_with_retry(text, voice, cancel) => audio?,
        };
        let Some(audio) = audio else {
            return Ok(SpeakOutcome::Aborted);
        };

        let outcome = tokio::select! {
            _ = cancel.cancelled() => return Ok(SpeakOutcome::Aborted),
            outcome = self.player.play(audio, text) => outcome?,
        };
        Ok(match outcome {
            PlayOutcome::Started => SpeakOutcome::Played,
            PlayOutcome::Preempted => SpeakOutcome::Aborted,
        })
    }

    /// Returns `None` if cancelled during a backoff pause.
    async fn fetch_with_retry(
        &self,
        text: &str,
        voice: Voice,
        cancel: &CancellationToken,
    ) -> Result<Option<Bytes>, ClientError> {
        let mut attempt = 0;
        loop {
            match self.fetch_once(text, voice).await {
                Ok(audio) => return Ok(Some(audio)),
                Err(err) if err.is_retryable() && attempt < self.config.max_retries => {
                    attempt += 1;
                    tracing::warn!(attempt, error = %err, "speech request failed, retrying");
                    tokio::select! {
                        _ = cancel.cancelled() => return Ok(None),
                        _ = tokio::time::sleep(self.config.retry_backoff) => {}
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn fetch_once(&self, text: &str, voice: Voice) -> Result<Bytes, ClientError> {
        let body = serde_json::json!({ "text": text, "voice": voice });
        let call = async {
            let response = self
                .http
                .post(self.config.url("/api/text-to-speech"))
                .json(&body)
                .send()
                .await?;
            if !response.status().is_success() {
                return Err(ClientError::from_response(response).await);
            }
            Ok::<_, ClientError>(response.bytes().await?)
        };
        tokio::time::timeout(self.config.request_timeout, call)
            .await
            .map_err(|_| ClientError::Timeout(self.config.request_timeout))?
    }

    fn take_in_flight(&self) -> Option<CancellationToken> {
        let mut guard = self.in_flight.lock().unwrap_or_else(|p| p.into_inner());
        guard.take().map(|(_, token)| token)
    }

    /// Installs `token` as the request in flight and returns the one it
    /// displaced, under a single lock acquisition.
    fn replace_in_flight(
        &self,
        generation: u64,
        token: CancellationToken,
    ) -> Option<CancellationToken> {
        let mut guard = self.in_flight.lock().unwrap_or_else(|p| p.into_inner());
        guard.replace((generation, token)).map(|(_, previous)| previous)
    }

    fn clear_in_flight(&self, generation: u64) {
        let mut guard = self.in_flight.lock().unwrap_or_else(|p| p.into_inner());
        if matches!(guard.as_ref(), Some((current, _)) if *current == generation) {
            *guard = None;
        }
    }
}
