//! Chatbot configuration records.

use crate::{now, RegistryError};
use chatdeck_types::Provider;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

/// A configured chatbot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chatbot {
    /// Public identifier (UUID v4 for stored chatbots).
    pub id: String,
    pub name: String,
    /// May be empty; the chat endpoints substitute a default prompt.
    pub system_prompt: String,
    pub provider: Provider,
    /// Model identifier from the provider's catalog.
    pub model: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Fields accepted when creating or replacing a chatbot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatbotParams {
    pub name: String,
    pub system_prompt: String,
    pub provider: Provider,
    pub model: String,
}

impl ChatbotParams {
    /// Checks required fields and the provider/model pairing.
    pub fn validate(&self) -> Result<(), RegistryError> {
        if self.name.trim().is_empty() {
            return Err(RegistryError::Invalid("name is required".to_string()));
        }
        if self.model.trim().is_empty() {
            return Err(RegistryError::Invalid("model is required".to_string()));
        }
        if !self.provider.supports_model(&self.model) {
            return Err(RegistryError::Invalid(format!(
                "model '{}' is not offered by provider '{}'",
                self.model, self.provider
            )));
        }
        Ok(())
    }
}

const COLUMNS: &str = "id, name, system_prompt, provider, model, created_at, updated_at";

/// Creates a chatbot with a fresh UUID and returns the stored record.
pub fn create_chatbot(conn: &Connection, params: &ChatbotParams) -> Result<Chatbot, RegistryError> {
    params.validate()?;

    let stamp = now();
    let chatbot = Chatbot {
        id: uuid::Uuid::new_v4().to_string(),
        name: params.name.trim().to_string(),
        system_prompt: params.system_prompt.clone(),
        provider: params.provider,
        model: params.model.clone(),
        created_at: stamp.clone(),
        updated_at: stamp,
    };

    conn.execute(
        "INSERT INTO chatbots (id, name, system_prompt, provider, model, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            chatbot.id,
            chatbot.name,
            chatbot.system_prompt,
            chatbot.provider.as_str(),
            chatbot.model,
            chatbot.created_at,
            chatbot.updated_at,
        ],
    )?;

    tracing::info!(chatbot_id = %chatbot.id, provider = %chatbot.provider, "chatbot created");
    Ok(chatbot)
}

/// Retrieves a chatbot by id.
pub fn get_chatbot(conn: &Connection, id: &str) -> Result<Chatbot, RegistryError> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM chatbots WHERE id = ?1"),
        [id],
        map_row,
    )
    .optional()?
    .ok_or_else(|| RegistryError::NotFound(id.to_string()))
}

/// Lists every chatbot, newest first.
pub fn list_chatbots(conn: &Connection) -> Result<Vec<Chatbot>, RegistryError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM chatbots ORDER BY created_at DESC, rowid DESC"
    ))?;
    let rows = stmt.query_map([], map_row)?;
    let mut chatbots = Vec::new();
    for row in rows {
        chatbots.push(row?);
    }
    Ok(chatbots)
}

/// Replaces a chatbot's editable fields and bumps `updated_at`.
pub fn update_chatbot(
    conn: &Connection,
    id: &str,
    params: &ChatbotParams,
) -> Result<Chatbot, RegistryError> {
    params.validate()?;

    let count = conn.execute(
        "UPDATE chatbots
         SET name = ?1, system_prompt = ?2, provider = ?3, model = ?4, updated_at = ?5
         WHERE id = ?6",
        params![
            params.name.trim(),
            params.system_prompt,
            params.provider.as_str(),
            params.model,
            now(),
            id,
        ],
    )?;
    if count == 0 {
        return Err(RegistryError::NotFound(id.to_string()));
    }
    get_chatbot(conn, id)
}

/// Deletes a chatbot together with its conversations and messages.
pub fn delete_chatbot(conn: &Connection, id: &str) -> Result<(), RegistryError> {
    let count = conn.execute("DELETE FROM chatbots WHERE id = ?1", [id])?;
    if count == 0 {
        return Err(RegistryError::NotFound(id.to_string()));
    }
    tracing::info!(chatbot_id = id, "chatbot deleted");
    Ok(())
}

fn map_row(row: &Row) -> rusqlite::Result<Chatbot> {
    let provider: String = row.get(3)?;
    let provider = provider.parse::<Provider>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(Chatbot {
        id: row.get(0)?,
        name: row.get(1)?,
        system_prompt: row.get(2)?,
        provider,
        model: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}
