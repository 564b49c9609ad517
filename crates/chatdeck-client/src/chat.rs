//! Streaming chat against a chatdeck server with an in-memory session history.
//!
//! [`SessionHistory`] lives only as long as the client and is never merged
//! with the server's stored transcript.

use crate::error::ClientError;
use chatdeck_types::ChatTurn;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// How long to wait for the first token before emitting [`ChatEvent::Slow`].
pub const SLOW_RESPONSE_AFTER: Duration = Duration::from_secs(15);

/// In-memory chat turns per chatbot.
#[derive(Debug, Clone, Default)]
pub struct SessionHistory {
    turns: HashMap<String, Vec<ChatTurn>>,
}

impl SessionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chatbot_id: &str, turn: ChatTurn) {
        self.turns
            .entry(chatbot_id.to_string())
            .or_default()
            .push(turn);
    }

    pub fn turns(&self, chatbot_id: &str) -> &[ChatTurn] {
        self.turns.get(chatbot_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn clear(&mut self, chatbot_id: &str) {
        self.turns.remove(chatbot_id);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    Token(String),
    /// No token arrived within the slow-response window. Emitted at most once.
    Slow,
    /// The reply finished; carries the full assistant text.
    Done(String),
}

pub type ChatStream = BoxStream<'static, Result<ChatEvent, ClientError>>;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ChatBody<'a> {
    messages: &'a [ChatTurn],
    chatbot_id: &'a str,
}

#[derive(Clone)]
pub struct ChatClient {
    http: reqwest::Client,
    base_url: String,
    history: Arc<Mutex<SessionHistory>>,
    slow_after: Duration,
}

impl ChatClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            history: Arc::new(Mutex::new(SessionHistory::new())),
            slow_after: SLOW_RESPONSE_AFTER,
        }
    }

    pub fn with_slow_after(mut self, slow_after: Duration) -> Self {
        self.slow_after = slow_after;
        self
    }

    /// Snapshot of the session turns for `chatbot_id`.
    pub fn history(&self, chatbot_id: &str) -> Vec<ChatTurn> {
        self.lock_history().turns(chatbot_id).to_vec()
    }

    pub fn clear_history(&self, chatbot_id: &str) {
        self.lock_history().clear(chatbot_id);
    }

    /// Sends `text` with the whole session history and streams the reply.
    ///
    /// The assistant turn is appended to the history only when the reply
    /// completes.
    pub fn send(&self, chatbot_id: &str, text: &str) -> ChatStream {
        let messages = {
            let mut history = self.lock_history();
            history.push(chatbot_id, ChatTurn::user(text));
            history.turns(chatbot_id).to_vec()
        };

        let (tx, rx) = mpsc::channel(32);
        let client = self.clone();
        let chatbot_id = chatbot_id.to_string();
        tokio::spawn(async move {
            if let Err(err) = client.pump(&chatbot_id, &messages, &tx).await {
                let _ = tx.send(Err(err)).await;
            }
        });
        ReceiverStream::new(rx).boxed()
    }

    async fn pump(
        &self,
        chatbot_id: &str,
        messages: &[ChatTurn],
        tx: &mpsc::Sender<Result<ChatEvent, ClientError>>,
    ) -> Result<(), ClientError> {
        let slow = tokio::time::sleep(self.slow_after);
        tokio::pin!(slow);
        let mut waiting = true;

        let request = self
            .http
            .post(format!("{}/api/chat", self.base_url))
            .json(&ChatBody {
                messages,
                chatbot_id,
            })
            .send();
        tokio::pin!(request);

        let mut response = loop {
            tokio::select! {
                response = &mut request => break response?,
                _ = &mut slow, if waiting => {
                    waiting = false;
                    if tx.send(Ok(ChatEvent::Slow)).await.is_err() {
                        return Ok(());
                    }
                }
            }
        };
        if !response.status().is_success() {
            return Err(ClientError::from_response(response).await);
        }

        let mut decoder = Utf8Decoder::default();
        let mut reply = String::new();
        loop {
            let chunk = tokio::select! {
                chunk = response.chunk() => chunk?,
                _ = &mut slow, if waiting && reply.is_empty() => {
                    waiting = false;
                    if tx.send(Ok(ChatEvent::Slow)).await.is_err() {
                        return Ok(());
                    }
                    continue;
                }
            };
            let Some(bytes) = chunk else { break };
            let text = decoder.push(&bytes);
            if text.is_empty() {
                continue;
            }
            reply.push_str(&text);
            if tx.send(Ok(ChatEvent::Token(text))).await.is_err() {
                return Ok(());
            }
        }
        reply.push_str(&decoder.finish());

        self.lock_history()
            .push(chatbot_id, ChatTurn::assistant(reply.clone()));
        let _ = tx.send(Ok(ChatEvent::Done(reply))).await;
        Ok(())
    }

    fn lock_history(&self) -> std::sync::MutexGuard<'_, SessionHistory> {
        self.history.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// Decodes UTF-8 across chunk boundaries.
#[derive(Default)]
struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    fn push(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let valid = match std::str::from_utf8(&self.pending) {
            Ok(_) => self.pending.len(),
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            // Invalid bytes, not a split sequence: decode lossily.
            Err(_) => self.pending.len(),
        };
        let text = String::from_utf8_lossy(&self.pending[..valid]).into_owned();
        self.pending.drain(..valid);
        text
    }

    fn finish(&mut self) -> String {
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        text
    }
}
