//! Streaming chat endpoints.
//!
//! All three variants resolve a [`Chatbot`] and then hand off to
//! [`stream_reply`], which owns the upstream call and the response body.

use crate::error::ApiError;
use crate::AppState;
use axum::{
    body::Body,
    extract::{rejection::JsonRejection, Extension, Json, Path},
    http::header,
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use chatdeck_llm::{ChatRequest, LlmError};
use chatdeck_registry::{demo::demo_chatbot, get_chatbot, record_exchange, Chatbot};
use chatdeck_types::{recent_turns, ChatTurn};
use futures_util::{stream, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use std::io;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

/// Request body for `POST /api/chat` and `POST /api/chat/demo`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatBody {
    #[serde(default)]
    pub messages: Vec<ChatTurn>,
    pub chatbot_id: Option<String>,
}

impl ChatBody {
    fn require_chatbot_id(&self) -> Result<String, ApiError> {
        match self.chatbot_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => Ok(id.to_string()),
            _ => Err(ApiError::BadRequest("Chatbot ID is required".to_string())),
        }
    }
}

fn parse_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(body)| body)
        .map_err(|e| ApiError::BadRequest(e.body_text()))
}

/// Handler for `POST /api/chat`.
pub async fn chat_handler(
    Extension(state): Extension<Arc<AppState>>,
    payload: Result<Json<ChatBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let body = parse_body(payload)?;
    let chatbot_id = body.require_chatbot_id()?;
    let chatbot = lookup_chatbot(&state, chatbot_id).await?;
    stream_reply(state, chatbot, body.messages, None).await
}

/// Handler for `POST /api/chat/demo`.
///
/// Resolves the chatbot from the built-in demo table instead of the registry.
pub async fn demo_chat_handler(
    Extension(state): Extension<Arc<AppState>>,
    payload: Result<Json<ChatBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let body = parse_body(payload)?;
    let chatbot_id = body.require_chatbot_id()?;
    let chatbot = demo_chatbot(&chatbot_id)
        .ok_or_else(|| ApiError::NotFound("Chatbot not found".to_string()))?;
    stream_reply(state, chatbot, body.messages, None).await
}

/// Handler for `POST /api/chat/{id}/message`.
///
/// Sends a single user message and stores the exchange once the reply has
/// been streamed in full.
pub async fn message_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Response, ApiError> {
    let body = parse_body(payload)?;
    let content = body
        .get("content")
        .and_then(Value::as_str)
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("content must be a non-empty string".to_string()))?
        .to_string();

    let chatbot = lookup_chatbot(&state, id).await?;
    let history = vec![ChatTurn::user(content.clone())];
    stream_reply(state, chatbot, history, Some(content)).await
}

async fn lookup_chatbot(state: &AppState, id: String) -> Result<Chatbot, ApiError> {
    let timeout = state.chat.lookup_timeout();
    let lookup = state.with_conn(move |conn| Ok(get_chatbot(conn, &id)?));
    match tokio::time::timeout(timeout, lookup).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(timeout_ms = timeout.as_millis() as u64, "chatbot lookup timed out");
            Err(ApiError::Timeout("Chatbot lookup timed out".to_string()))
        }
    }
}

/// Starts the completion and streams its tokens as the response body.
///
/// The first token is awaited before the response is committed, so a
/// provider that fails or times out up front is reported with a real status.
/// Later failures abort the body. When `persist_user` is set, the user turn
/// and the complete reply are stored after the last token was forwarded.
async fn stream_reply(
    state: Arc<AppState>,
    chatbot: Chatbot,
    history: Vec<ChatTurn>,
    persist_user: Option<String>,
) -> Result<Response, ApiError> {
    let request = ChatRequest {
        provider: chatbot.provider,
        model: chatbot.model.clone(),
        system_prompt: chatbot.system_prompt.clone(),
        history: recent_turns(&history, state.chat.max_history).to_vec(),
    };

    tracing::info!(
        chatbot_id = %chatbot.id,
        provider = %chatbot.provider,
        model = %chatbot.model,
        turns = request.history.len(),
        "chat request"
    );

    let cancel = CancellationToken::new();
    let mut tokens = state.llm.stream_chat(&request, cancel.clone()).await?;
    let first = match tokens.next().await {
        Some(Ok(token)) => Some(token),
        Some(Err(e)) => return Err(e.into()),
        None => None,
    };
    let tokens = stream::iter(first.map(Ok::<_, LlmError>)).chain(tokens);

    let (tx, rx) = mpsc::channel::<Result<Bytes, io::Error>>(32);
    tokio::spawn(forward_tokens(
        state,
        chatbot.id,
        tokens,
        tx,
        cancel,
        persist_user,
    ));

    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
            (header::CACHE_CONTROL, "no-cache, no-transform"),
            (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
        ],
        Body::from_stream(ReceiverStream::new(rx)),
    )
        .into_response())
}

async fn forward_tokens(
    state: Arc<AppState>,
    chatbot_id: String,
    mut tokens: impl futures_util::Stream<Item = Result<String, LlmError>> + Unpin,
    tx: mpsc::Sender<Result<Bytes, io::Error>>,
    cancel: CancellationToken,
    persist_user: Option<String>,
) {
    let mut reply = String::new();
    while let Some(item) = tokens.next().await {
        match item {
            Ok(token) => {
                reply.push_str(&token);
                if tx.send(Ok(Bytes::from(token))).await.is_err() {
                    tracing::debug!(%chatbot_id, "client disconnected, cancelling completion");
                    cancel.cancel();
                    return;
                }
            }
            Err(e) => {
                tracing::warn!(%chatbot_id, error = %e, "completion failed mid-stream");
                let _ = tx.send(Err(io::Error::other(e.to_string()))).await;
                return;
            }
        }
    }
    drop(tx);

    tracing::debug!(%chatbot_id, chars = reply.chars().count(), "reply streamed");

    if let Some(user) = persist_user {
        let id = chatbot_id.clone();
        let saved = state
            .with_conn(move |conn| Ok(record_exchange(conn, &id, &user, &reply)?))
            .await;
        match saved {
            Ok(conversation) => tracing::debug!(
                %chatbot_id,
                conversation_id = %conversation.id,
                "exchange stored"
            ),
            Err(e) => tracing::error!(%chatbot_id, error = %e, "failed to store exchange"),
        }
    }
}
