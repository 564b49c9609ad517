use crate::api::{ChatCompletionRequest, ChatCompletionResponse, WireMessage};
use crate::config::ProvidersConfig;
use crate::error::LlmError;
use crate::sse::{SseDecoder, SseEvent};
use bytes::Bytes;
use chatdeck_types::{upstream_error_message, ChatTurn, Provider, Role, DEFAULT_SYSTEM_PROMPT};
use futures_util::stream::{self, BoxStream, StreamExt};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Stream of content deltas. Ends after the provider's `[DONE]` sentinel;
/// an `Err` item is always the last one.
pub type TokenStream = BoxStream<'static, Result<String, LlmError>>;

/// A completion request against one chatbot's provider and model.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub provider: Provider,
    pub model: String,
    /// Empty prompts fall back to [`DEFAULT_SYSTEM_PROMPT`].
    pub system_prompt: String,
    pub history: Vec<ChatTurn>,
}

impl ChatRequest {
    fn wire_messages(&self) -> Vec<WireMessage> {
        let prompt = if self.system_prompt.trim().is_empty() {
            DEFAULT_SYSTEM_PROMPT
        } else {
            self.system_prompt.as_str()
        };

        let mut messages = Vec::with_capacity(self.history.len() + 1);
        messages.push(WireMessage {
            role: Role::System,
            content: prompt.to_string(),
        });
        messages.extend(
            self.history
                .iter()
                .filter(|turn| turn.role != Role::System)
                .map(WireMessage::from),
        );
        messages
    }
}

/// Client for OpenAI-compatible chat-completion providers.
#[derive(Debug, Clone)]
pub struct LlmClient {
    http: reqwest::Client,
    providers: ProvidersConfig,
}

impl LlmClient {
    /// `http` is shared with the other outbound clients of the process.
    pub fn new(http: reqwest::Client, providers: ProvidersConfig) -> Self {
        Self { http, providers }
    }

    /// Starts a streamed completion.
    ///
    /// The provider's `timeout_ms` bounds the wait for the first token,
    /// counted from sending the request. Once tokens flow it only bounds the
    /// gap between two body chunks, so a long reply that keeps arriving is
    /// never cut. When either limit elapses `cancel` is cancelled, so anything
    /// else holding the token observes it. Cancelling the token from outside
    /// ends the call with [`LlmError::Cancelled`].
    pub async fn stream_chat(
        &self,
        request: &ChatRequest,
        cancel: CancellationToken,
    ) -> Result<TokenStream, LlmError> {
        let settings = self.providers.get(request.provider);
        let timeout = settings.timeout();
        let deadline = Instant::now() + timeout;

        let body = ChatCompletionRequest {
            model: request.model.clone(),
            messages: request.wire_messages(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            stream: Some(true),
        };

        tracing::debug!(
            provider = %request.provider,
            model = %request.model,
            turns = request.history.len(),
            "starting streamed completion"
        );

        let response = bounded(&cancel, deadline, timeout, self.send(request.provider, &body)).await?;
        let response = bounded(&cancel, deadline, timeout, check_status(response)).await?;

        let state = StreamState {
            body: response.bytes_stream().boxed(),
            decoder: SseDecoder::new(),
            pending: VecDeque::new(),
            cancel,
            deadline,
            timeout,
            started: false,
            finished: false,
        };
        Ok(stream::unfold(state, next_token).boxed())
    }

    /// Runs a non-streamed completion and returns the full reply.
    pub async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError> {
        let settings = self.providers.get(request.provider);
        let timeout = settings.timeout();
        let deadline = Instant::now() + timeout;
        let cancel = CancellationToken::new();

        let body = ChatCompletionRequest {
            model: request.model.clone(),
            messages: request.wire_messages(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            stream: None,
        };

        let call = async {
            let response = check_status(self.send(request.provider, &body).await?).await?;
            let parsed: ChatCompletionResponse = response.json().await?;
            parsed
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.message.content)
                .ok_or_else(|| LlmError::Decode("completion has no content".to_string()))
        };
        bounded(&cancel, deadline, timeout, call).await
    }

    async fn send(
        &self,
        provider: Provider,
        body: &ChatCompletionRequest,
    ) -> Result<reqwest::Response, LlmError> {
        let settings = self.providers.get(provider);
        if settings.api_key.is_empty() {
            return Err(LlmError::MissingApiKey(provider));
        }
        let url = format!("{}/chat/completions", self.providers.base_url(provider));
        let response = self
            .http
            .post(url)
            .bearer_auth(&settings.api_key)
            .json(body)
            .send()
            .await?;
        Ok(response)
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, LlmError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    let message = upstream_error_message(&text);
    tracing::warn!(status = status.as_u16(), %message, "provider rejected completion");
    Err(LlmError::Upstream {
        status: status.as_u16(),
        message,
    })
}

/// Races `fut` against the shared deadline and the cancellation token.
async fn bounded<T>(
    cancel: &CancellationToken,
    deadline: Instant,
    timeout: Duration,
    fut: impl std::future::Future<Output = Result<T, LlmError>>,
) -> Result<T, LlmError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(LlmError::Cancelled),
        _ = tokio::time::sleep_until(deadline) => {
            cancel.cancel();
            Err(LlmError::Timeout(timeout))
        }
        result = fut => result,
    }
}

struct StreamState {
    body: BoxStream<'static, reqwest::Result<Bytes>>,
    decoder: SseDecoder,
    pending: VecDeque<String>,
    cancel: CancellationToken,
    /// First-token deadline until `started`, then the idle deadline.
    deadline: Instant,
    timeout: Duration,
    started: bool,
    finished: bool,
}

enum Step {
    Cancelled,
    Deadline,
    Chunk(Option<reqwest::Result<Bytes>>),
}

async fn next_token(mut st: StreamState) -> Option<(Result<String, LlmError>, StreamState)> {
    loop {
        if let Some(token) = st.pending.pop_front() {
            st.started = true;
            st.deadline = Instant::now() + st.timeout;
            return Some((Ok(token), st));
        }
        if st.finished {
            return None;
        }

        let step = tokio::select! {
            biased;
            _ = st.cancel.cancelled() => Step::Cancelled,
            _ = tokio::time::sleep_until(st.deadline) => Step::Deadline,
            chunk = st.body.next() => Step::Chunk(chunk),
        };

        let events = match step {
            Step::Cancelled => {
                st.finished = true;
                return Some((Err(LlmError::Cancelled), st));
            }
            Step::Deadline => {
                st.cancel.cancel();
                st.finished = true;
                let err = if st.started {
                    LlmError::Idle(st.timeout)
                } else {
                    LlmError::Timeout(st.timeout)
                };
                return Some((Err(err), st));
            }
            Step::Chunk(Some(Err(e))) => {
                st.finished = true;
                return Some((Err(LlmError::Http(e)), st));
            }
            Step::Chunk(Some(Ok(bytes))) => {
                if st.started {
                    st.deadline = Instant::now() + st.timeout;
                }
                st.decoder.push(&bytes)
            }
            Step::Chunk(None) => {
                st.finished = true;
                st.decoder.finish().into_iter().collect()
            }
        };

        for event in events {
            match event {
                SseEvent::Token(text) => st.pending.push_back(text),
                SseEvent::Done => {
                    st.finished = true;
                    break;
                }
                SseEvent::Error(message) => {
                    st.finished = true;
                    st.pending.clear();
                    return Some((Err(LlmError::Stream(message)), st));
                }
            }
        }
    }
}
