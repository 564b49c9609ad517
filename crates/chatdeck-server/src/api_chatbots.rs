//! Chatbot registry endpoints, the embed snippet and the stored transcript.

use crate::error::ApiError;
use crate::AppState;
use axum::{
    extract::{Extension, FromRequest, Multipart, Path, Query, Request},
    http::{header, StatusCode},
    response::{Html, IntoResponse},
    Form, Json,
};
use chatdeck_registry::{
    clear_messages, create_chatbot, delete_chatbot, get_chatbot, list_chatbots, list_messages,
    update_chatbot, Chatbot, ChatbotParams, StoredMessage,
};
use chatdeck_types::Provider;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

/// Fields accepted by create and update, in any of the supported encodings.
#[derive(Debug, Default, Deserialize)]
pub struct ChatbotForm {
    pub name: Option<String>,
    #[serde(alias = "systemPrompt")]
    pub prompt: Option<String>,
    /// Defaults to `groq` when absent or blank.
    pub provider: Option<String>,
    pub model: Option<String>,
}

impl ChatbotForm {
    /// Checks presence of the required fields and resolves the provider.
    ///
    /// `prompt` must be present but may be empty.
    pub fn into_params(self) -> Result<ChatbotParams, ApiError> {
        let name = non_blank(self.name, "name")?;
        let model = non_blank(self.model, "model")?;
        let system_prompt = self
            .prompt
            .ok_or_else(|| ApiError::BadRequest("prompt is required".to_string()))?;
        let provider = match self.provider.as_deref().map(str::trim) {
            None | Some("") => Provider::default(),
            Some(raw) => raw
                .parse()
                .map_err(|e: chatdeck_types::ParseError| ApiError::BadRequest(e.to_string()))?,
        };

        Ok(ChatbotParams {
            name,
            system_prompt,
            provider,
            model: model.trim().to_string(),
        })
    }
}

fn non_blank(value: Option<String>, field: &str) -> Result<String, ApiError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ApiError::BadRequest(format!("{field} is required"))),
    }
}

fn require_id(id: &str) -> Result<String, ApiError> {
    let id = id.trim();
    if id.is_empty() {
        return Err(ApiError::BadRequest("chatbot id is required".to_string()));
    }
    Ok(id.to_string())
}

/// Reads a [`ChatbotForm`] from a JSON, urlencoded or multipart body.
async fn read_chatbot_form(req: Request) -> Result<ChatbotForm, ApiError> {
    let content_type = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();

    if content_type.starts_with("multipart/form-data") {
        let mut multipart = Multipart::from_request(req, &())
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;
        let mut form = ChatbotForm::default();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?
        {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };
            let value = field
                .text()
                .await
                .map_err(|e| ApiError::BadRequest(e.body_text()))?;
            match name.as_str() {
                "name" => form.name = Some(value),
                "prompt" | "systemPrompt" => form.prompt = Some(value),
                "provider" => form.provider = Some(value),
                "model" => form.model = Some(value),
                _ => {}
            }
        }
        Ok(form)
    } else if content_type.starts_with("application/x-www-form-urlencoded") {
        let Form(form) = Form::<ChatbotForm>::from_request(req, &())
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;
        Ok(form)
    } else {
        let Json(form) = Json::<ChatbotForm>::from_request(req, &())
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;
        Ok(form)
    }
}

/// Handler for `GET /api/models`.
///
/// The model catalog per provider, as the dashboard's model picker shows it.
pub async fn list_models_handler() -> Json<Value> {
    let catalog: serde_json::Map<String, Value> = Provider::ALL
        .iter()
        .map(|provider| (provider.as_str().to_string(), json!(provider.models())))
        .collect();
    Json(Value::Object(catalog))
}

/// Handler for `GET /api/chatbots`.
pub async fn list_chatbots_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<Vec<Chatbot>>, ApiError> {
    let chatbots = state.with_conn(|conn| Ok(list_chatbots(conn)?)).await?;
    Ok(Json(chatbots))
}

/// Handler for `GET /api/chatbots/{id}`.
pub async fn get_chatbot_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Chatbot>, ApiError> {
    let id = require_id(&id)?;
    let chatbot = state.with_conn(move |conn| Ok(get_chatbot(conn, &id)?)).await?;
    Ok(Json(chatbot))
}

/// Handler for `POST /api/chatbots`.
pub async fn create_chatbot_handler(
    Extension(state): Extension<Arc<AppState>>,
    req: Request,
) -> Result<impl IntoResponse, ApiError> {
    let params = read_chatbot_form(req).await?.into_params()?;
    let chatbot = state
        .with_conn(move |conn| Ok(create_chatbot(conn, &params)?))
        .await?;

    tracing::info!(
        chatbot_id = %chatbot.id,
        provider = %chatbot.provider,
        model = %chatbot.model,
        "chatbot created"
    );
    Ok((StatusCode::CREATED, Json(chatbot)))
}

/// Handler for `PUT /api/chatbots/{id}`.
pub async fn update_chatbot_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<String>,
    req: Request,
) -> Result<Json<Chatbot>, ApiError> {
    let id = require_id(&id)?;
    let params = read_chatbot_form(req).await?.into_params()?;
    let chatbot = state
        .with_conn(move |conn| Ok(update_chatbot(conn, &id, &params)?))
        .await?;
    Ok(Json(chatbot))
}

/// Handler for `DELETE /api/chatbots/{id}`.
pub async fn delete_chatbot_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id = require_id(&id)?;
    state
        .with_conn(move |conn| Ok(delete_chatbot(conn, &id)?))
        .await?;
    Ok(Json(json!({ "status": "deleted" })))
}

/// Corner of the host page the widget docks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WidgetPosition {
    #[default]
    BottomRight,
    BottomLeft,
}

impl WidgetPosition {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BottomRight => "bottom-right",
            Self::BottomLeft => "bottom-left",
        }
    }

    fn parse(raw: Option<&str>) -> Result<Self, ApiError> {
        match raw {
            None => Ok(Self::default()),
            Some("bottom-right") => Ok(Self::BottomRight),
            Some("bottom-left") => Ok(Self::BottomLeft),
            Some(other) => Err(ApiError::BadRequest(format!(
                "position must be bottom-right or bottom-left, got '{other}'"
            ))),
        }
    }
}

/// The markup a host page pastes to load the widget for `chatbot_id`.
pub fn embed_snippet(public_url: &str, chatbot_id: &str, position: WidgetPosition) -> String {
    format!(
        "<div data-chatbot-id=\"{chatbot_id}\" data-position=\"{}\"></div>\n<script src=\"{public_url}/embed.js\"></script>\n",
        position.as_str()
    )
}

#[derive(Debug, Deserialize)]
pub struct EmbedQuery {
    pub position: Option<String>,
}

/// Handler for `GET /api/chatbots/{id}/embed`.
pub async fn embed_snippet_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<EmbedQuery>,
) -> Result<Html<String>, ApiError> {
    let id = require_id(&id)?;
    let position = WidgetPosition::parse(query.position.as_deref())?;
    let chatbot = state.with_conn(move |conn| Ok(get_chatbot(conn, &id)?)).await?;
    Ok(Html(embed_snippet(&state.public_url, &chatbot.id, position)))
}

/// Handler for `GET /api/chatbots/{id}/messages`.
pub async fn list_messages_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<StoredMessage>>, ApiError> {
    let id = require_id(&id)?;
    let messages = state
        .with_conn(move |conn| {
            get_chatbot(conn, &id)?;
            Ok(list_messages(conn, &id)?)
        })
        .await?;
    Ok(Json(messages))
}

/// Handler for `DELETE /api/chatbots/{id}/messages`.
pub async fn clear_messages_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id = require_id(&id)?;
    let removed = state
        .with_conn(move |conn| Ok(clear_messages(conn, &id)?))
        .await?;
    Ok(Json(json!({ "status": "cleared", "removed": removed })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(name: &str, prompt: Option<&str>, provider: Option<&str>, model: &str) -> ChatbotForm {
        ChatbotForm {
            name: Some(name.to_string()),
            prompt: prompt.map(str::to_string),
            provider: provider.map(str::to_string),
            model: Some(model.to_string()),
        }
    }

    #[test]
    fn provider_defaults_to_groq() {
        let params = form("Helper", Some(""), None, "llama-3.3-70b-versatile")
            .into_params()
            .unwrap();
        assert_eq!(params.provider, Provider::Groq);
        assert_eq!(params.system_prompt, "");

        let params = form("Helper", Some("x"), Some("  "), "llama-3.3-70b-versatile")
            .into_params()
            .unwrap();
        assert_eq!(params.provider, Provider::Groq);
    }

    #[test]
    fn missing_fields_are_rejected() {
        assert!(matches!(
            form(" ", Some("p"), None, "gpt-4").into_params(),
            Err(ApiError::BadRequest(msg)) if msg == "name is required"
        ));
        assert!(matches!(
            form("A", None, None, "gpt-4").into_params(),
            Err(ApiError::BadRequest(msg)) if msg == "prompt is required"
        ));
        assert!(matches!(
            form("A", Some("p"), Some("anthropic"), "gpt-4").into_params(),
            Err(ApiError::BadRequest(_))
        ));
    }

    #[test]
    fn system_prompt_alias_is_accepted() {
        let form: ChatbotForm = serde_json::from_value(json!({
            "name": "A",
            "systemPrompt": "Be brief.",
            "provider": "openai",
            "model": "gpt-4"
        }))
        .unwrap();
        let params = form.into_params().unwrap();
        assert_eq!(params.system_prompt, "Be brief.");
        assert_eq!(params.provider, Provider::OpenAi);
    }

    #[test]
    fn snippet_points_at_public_widget() {
        let html = embed_snippet("https://bots.example.com", "abc", WidgetPosition::BottomLeft);
        assert!(html.contains(r#"<div data-chatbot-id="abc" data-position="bottom-left"></div>"#));
        assert!(html.contains(r#"<script src="https://bots.example.com/embed.js"></script>"#));
    }

    #[test]
    fn unknown_position_is_rejected() {
        assert_eq!(WidgetPosition::parse(None).unwrap(), WidgetPosition::BottomRight);
        assert!(WidgetPosition::parse(Some("top-left")).is_err());
    }
}
