//! chatdeck server library logic.

pub mod api_chat;
pub mod api_chatbots;
pub mod api_speech;
pub mod config;
pub mod error;
pub mod middleware;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Extension, Json, Router,
};
use chatdeck_db::DbPool;
use chatdeck_llm::LlmClient;
use chatdeck_voice::{SttService, TtsService};
use crate::config::{ChatConfig, Config};
use crate::error::ApiError;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: DbPool,
    /// Chat-completion client for every configured provider.
    pub llm: LlmClient,
    pub tts: TtsService,
    pub stt: SttService,
    /// History limit and lookup timeout for the chat endpoints.
    pub chat: ChatConfig,
    /// Base URL the embed snippet points `embed.js` at, without trailing slash.
    pub public_url: String,
    /// Directory served as the fallback for static widget files.
    pub widget_dir: String,
}

impl AppState {
    /// Builds the state from loaded configuration and an already migrated pool.
    pub fn new(pool: DbPool, config: &Config) -> Self {
        let http = reqwest::Client::new();
        Self {
            pool,
            llm: LlmClient::new(http.clone(), config.providers.clone()),
            tts: TtsService::new(http.clone(), config.speech.clone()),
            stt: SttService::new(http, config.speech.clone()),
            chat: config.chat.clone(),
            public_url: config.server.public_url.trim_end_matches('/').to_string(),
            widget_dir: config.server.widget_dir.clone(),
        }
    }

    /// Runs `f` against a pooled connection on the blocking thread pool.
    ///
    /// The connection is returned to the pool before this resolves.
    pub(crate) async fn with_conn<T, F>(&self, f: F) -> Result<T, ApiError>
    where
        T: Send + 'static,
        F: FnOnce(&rusqlite::Connection) -> Result<T, ApiError> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            f(&conn)
        })
        .await?
    }
}

/// Uploaded recordings may be larger than ordinary request bodies.
const MAX_AUDIO_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

/// Maximum request body size for everything else (2 MiB).
const MAX_REQUEST_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Health check handler.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    let upload_routes = Router::new()
        .route("/api/transcribe", post(api_speech::transcribe_handler))
        .layer(DefaultBodyLimit::max(MAX_AUDIO_UPLOAD_BYTES));

    let router = Router::new()
        .route("/health", get(health))
        .route("/api/models", get(api_chatbots::list_models_handler))
        .route(
            "/api/chatbots",
            get(api_chatbots::list_chatbots_handler).post(api_chatbots::create_chatbot_handler),
        )
        .route(
            "/api/chatbots/{id}",
            get(api_chatbots::get_chatbot_handler)
                .put(api_chatbots::update_chatbot_handler)
                .delete(api_chatbots::delete_chatbot_handler),
        )
        .route(
            "/api/chatbots/{id}/embed",
            get(api_chatbots::embed_snippet_handler),
        )
        .route(
            "/api/chatbots/{id}/messages",
            get(api_chatbots::list_messages_handler).delete(api_chatbots::clear_messages_handler),
        )
        .route("/api/chat", post(api_chat::chat_handler))
        .route("/api/chat/demo", post(api_chat::demo_chat_handler))
        .route("/api/chat/{id}/message", post(api_chat::message_handler))
        .route("/api/text-to-speech", post(api_speech::text_to_speech_handler))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .merge(upload_routes);

    let widget_dir = state.widget_dir.clone();
    let router = if std::path::Path::new(&widget_dir).is_dir() {
        tracing::info!(path = %widget_dir, "serving widget files");
        router.fallback_service(ServeDir::new(&widget_dir))
    } else {
        tracing::info!(path = %widget_dir, "widget directory not found, skipping static file serving");
        router
    };

    router
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any))
        .layer(axum::middleware::from_fn(middleware::preflight_middleware))
        .layer(Extension(Arc::new(state)))
}
