use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use chatdeck_llm::{ChatRequest, LlmClient, LlmError, ProvidersConfig};
use chatdeck_types::{ChatTurn, Provider};
use futures_util::{stream, StreamExt};
use serde_json::{json, Value};
use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Clone, Copy)]
enum Behavior {
    Stream,
    Reject,
    HangBeforeHeaders,
    StallAfterFirstToken,
    /// Six tokens 100 ms apart.
    SlowButSteady,
    /// The multi-byte reply, with body chunks cut through frames and characters.
    SplitBytes,
}

const MULTIBYTE_REPLY: &str = "Grüße aus Köln, señor ✓ 日本";

impl Behavior {
    fn full_reply(self) -> &'static str {
        match self {
            Behavior::SplitBytes => MULTIBYTE_REPLY,
            Behavior::SlowButSteady => "t0 t1 t2 t3 t4 t5 ",
            _ => "Hello, world",
        }
    }
}

#[derive(Clone)]
struct Upstream {
    behavior: Behavior,
    seen: Arc<Mutex<Vec<(Option<String>, Value)>>>,
}

fn sse(content: &str) -> String {
    format!(
        "data: {}\n\n",
        json!({"id": "c1", "object": "chat.completion.chunk", "choices": [{"index": 0, "delta": {"content": content}, "finish_reason": null}]})
    )
}

async fn completions(
    State(up): State<Upstream>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    up.seen.lock().unwrap().push((auth, body.clone()));

    if body.get("stream").is_none() {
        return Json(json!({
            "id": "c2",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": up.behavior.full_reply()}}]
        }))
        .into_response();
    }

    match up.behavior {
        Behavior::Stream => {
            let text = format!("{}{}{}data: [DONE]\n\n", sse("Hello"), sse(", "), sse("world"));
            ([("content-type", "text/event-stream")], text).into_response()
        }
        Behavior::Reject => (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": {"message": "Invalid API Key"}})),
        )
            .into_response(),
        Behavior::HangBeforeHeaders => {
            tokio::time::sleep(Duration::from_secs(5)).await;
            StatusCode::OK.into_response()
        }
        Behavior::StallAfterFirstToken => {
            let first = stream::iter([Ok::<_, Infallible>(sse("partial"))]);
            let body = Body::from_stream(first.chain(stream::pending()));
            ([("content-type", "text/event-stream")], body).into_response()
        }
        Behavior::SlowButSteady => {
            let frames = (0..6)
                .map(|i| sse(&format!("t{i} ")))
                .chain(std::iter::once("data: [DONE]\n\n".to_string()));
            let body = stream::iter(frames).then(|frame| async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok::<_, Infallible>(frame)
            });
            ([("content-type", "text/event-stream")], Body::from_stream(body)).into_response()
        }
        Behavior::SplitBytes => {
            let mut text = String::new();
            for piece in ["Grüße aus ", "Köln, ", "señor ✓", " 日本"] {
                text.push_str(&sse(piece));
            }
            text.push_str("data: [DONE]\n\n");
            let chunks: Vec<Result<Vec<u8>, Infallible>> = text
                .into_bytes()
                .chunks(7)
                .map(|c| Ok(c.to_vec()))
                .collect();
            let body = stream::iter(chunks).then(|chunk| async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                chunk
            });
            ([("content-type", "text/event-stream")], Body::from_stream(body)).into_response()
        }
    }
}

async fn spawn_upstream(behavior: Behavior) -> (String, Upstream) {
    let upstream = Upstream {
        behavior,
        seen: Arc::new(Mutex::new(Vec::new())),
    };
    let app = Router::new()
        .route("/v1/chat/completions", post(completions))
        .with_state(upstream.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}/v1"), upstream)
}

fn client(base_url: &str, timeout_ms: u64) -> LlmClient {
    let mut providers = ProvidersConfig::default();
    let groq = providers.get_mut(Provider::Groq);
    groq.base_url = Some(base_url.to_string());
    groq.api_key = "test-key".to_string();
    groq.timeout_ms = timeout_ms;
    LlmClient::new(reqwest::Client::new(), providers)
}

fn request() -> ChatRequest {
    ChatRequest {
        provider: Provider::Groq,
        model: "llama-3.3-70b-versatile".to_string(),
        system_prompt: String::new(),
        history: vec![ChatTurn::user("Say hello")],
    }
}

#[tokio::test]
async fn stream_yields_full_completion() {
    let (base, upstream) = spawn_upstream(Behavior::Stream).await;
    let llm = client(&base, 5_000);

    let stream = llm
        .stream_chat(&request(), CancellationToken::new())
        .await
        .unwrap();
    let tokens: Vec<String> = stream.map(|t| t.unwrap()).collect().await;
    assert_eq!(tokens, vec!["Hello", ", ", "world"]);
    assert_eq!(tokens.concat(), "Hello, world");

    let seen = upstream.seen.lock().unwrap();
    let (auth, body) = &seen[0];
    assert_eq!(auth.as_deref(), Some("Bearer test-key"));
    assert_eq!(body["stream"], true);
    assert_eq!(body["max_tokens"], 1000);
    assert_eq!(body["model"], "llama-3.3-70b-versatile");
    assert_eq!(body["messages"][0]["role"], "system");
    assert_eq!(
        body["messages"][0]["content"],
        chatdeck_types::DEFAULT_SYSTEM_PROMPT
    );
    assert_eq!(body["messages"][1]["content"], "Say hello");
}

#[tokio::test]
async fn rejected_request_reports_status_and_message() {
    let (base, _) = spawn_upstream(Behavior::Reject).await;
    let llm = client(&base, 5_000);

    let err = llm
        .stream_chat(&request(), CancellationToken::new())
        .await
        .err()
        .expect("should fail");
    match err {
        LlmError::Upstream { status, message } => {
            assert_eq!(status, 401);
            assert_eq!(message, "Invalid API Key");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn deadline_before_headers_times_out_and_cancels_token() {
    let (base, _) = spawn_upstream(Behavior::HangBeforeHeaders).await;
    let llm = client(&base, 200);
    let cancel = CancellationToken::new();

    let err = llm
        .stream_chat(&request(), cancel.clone())
        .await
        .err()
        .expect("should time out");
    assert!(matches!(err, LlmError::Timeout(_)), "got {err}");
    assert!(cancel.is_cancelled());
}

#[tokio::test]
async fn stalled_stream_ends_after_idle_gap() {
    let (base, _) = spawn_upstream(Behavior::StallAfterFirstToken).await;
    let llm = client(&base, 300);
    let cancel = CancellationToken::new();

    let mut stream = llm.stream_chat(&request(), cancel.clone()).await.unwrap();
    assert_eq!(stream.next().await.unwrap().unwrap(), "partial");
    let err = stream.next().await.unwrap().unwrap_err();
    assert!(matches!(err, LlmError::Idle(_)), "got {err}");
    assert!(cancel.is_cancelled());
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn steady_stream_outlives_provider_timeout() {
    let (base, _) = spawn_upstream(Behavior::SlowButSteady).await;
    let llm = client(&base, 300);

    let stream = llm
        .stream_chat(&request(), CancellationToken::new())
        .await
        .unwrap();
    let items: Vec<Result<String, LlmError>> = stream.collect().await;
    let tokens: Vec<String> = items
        .into_iter()
        .map(|item| item.unwrap_or_else(|e| panic!("stream failed: {e}")))
        .collect();
    assert_eq!(tokens.len(), 6);
    assert_eq!(tokens.concat(), Behavior::SlowButSteady.full_reply());
}

#[tokio::test]
async fn external_cancel_stops_stream() {
    let (base, _) = spawn_upstream(Behavior::StallAfterFirstToken).await;
    let llm = client(&base, 10_000);
    let cancel = CancellationToken::new();

    let mut stream = llm.stream_chat(&request(), cancel.clone()).await.unwrap();
    assert_eq!(stream.next().await.unwrap().unwrap(), "partial");
    cancel.cancel();
    assert!(matches!(
        stream.next().await,
        Some(Err(LlmError::Cancelled))
    ));
}

#[tokio::test]
async fn streamed_reply_equals_awaited_completion() {
    let (base, upstream) = spawn_upstream(Behavior::SplitBytes).await;
    let llm = client(&base, 5_000);

    let streamed: String = llm
        .stream_chat(&request(), CancellationToken::new())
        .await
        .unwrap()
        .map(|t| t.unwrap())
        .collect::<Vec<_>>()
        .await
        .concat();
    let awaited = llm.complete(&request()).await.unwrap();

    assert_eq!(streamed, awaited);
    assert_eq!(awaited, MULTIBYTE_REPLY);
    let seen = upstream.seen.lock().unwrap();
    assert_eq!(seen[0].1["stream"], true);
    assert!(seen[1].1.get("stream").is_none());
}

#[tokio::test]
async fn missing_key_fails_without_calling_upstream() {
    let (base, upstream) = spawn_upstream(Behavior::Stream).await;
    let mut providers = ProvidersConfig::default();
    providers.get_mut(Provider::Groq).base_url = Some(base);
    let llm = LlmClient::new(reqwest::Client::new(), providers);

    let err = llm
        .stream_chat(&request(), CancellationToken::new())
        .await
        .err()
        .expect("should fail");
    assert!(matches!(err, LlmError::MissingApiKey(Provider::Groq)));
    assert!(upstream.seen.lock().unwrap().is_empty());
}
