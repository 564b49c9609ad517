//! Durable conversation transcripts.
//!
//! Each chatbot has at most one current conversation: the most recently
//! created row in `conversations`. It is created lazily on the first persisted
//! message. Messages are append-only and ordered by a per-conversation
//! sequence number, so two messages written in the same instant still come
//! back in insertion order.

use crate::{now, RegistryError};
use chatdeck_types::Role;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub chatbot_id: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMessage {
    pub id: String,
    pub conversation_id: String,
    pub role: Role,
    pub content: String,
    pub created_at: String,
}

/// Returns the chatbot's current conversation, if one exists.
pub fn current_conversation(
    conn: &Connection,
    chatbot_id: &str,
) -> Result<Option<Conversation>, RegistryError> {
    let conversation = conn
        .query_row(
            "SELECT id, chatbot_id, created_at, updated_at FROM conversations
             WHERE chatbot_id = ?1
             ORDER BY created_at DESC, rowid DESC
             LIMIT 1",
            [chatbot_id],
            map_conversation,
        )
        .optional()?;
    Ok(conversation)
}

/// Returns the current conversation, creating one if the chatbot has none.
///
/// Fails with `NotFound` when the chatbot itself does not exist.
pub fn current_or_create_conversation(
    conn: &Connection,
    chatbot_id: &str,
) -> Result<Conversation, RegistryError> {
    if let Some(existing) = current_conversation(conn, chatbot_id)? {
        return Ok(existing);
    }

    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM chatbots WHERE id = ?1)",
        [chatbot_id],
        |row| row.get(0),
    )?;
    if !exists {
        return Err(RegistryError::NotFound(chatbot_id.to_string()));
    }

    let stamp = now();
    let conversation = Conversation {
        id: uuid::Uuid::new_v4().to_string(),
        chatbot_id: chatbot_id.to_string(),
        created_at: stamp.clone(),
        updated_at: stamp,
    };
    conn.execute(
        "INSERT INTO conversations (id, chatbot_id, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            conversation.id,
            conversation.chatbot_id,
            conversation.created_at,
            conversation.updated_at,
        ],
    )?;
    tracing::debug!(chatbot_id, conversation_id = %conversation.id, "conversation started");
    Ok(conversation)
}

/// Appends a message to a conversation.
///
/// Only `user` and `assistant` turns are stored.
pub fn append_message(
    conn: &Connection,
    conversation_id: &str,
    role: Role,
    content: &str,
) -> Result<StoredMessage, RegistryError> {
    if role == Role::System {
        return Err(RegistryError::Invalid(
            "system turns are not stored".to_string(),
        ));
    }

    let message = StoredMessage {
        id: uuid::Uuid::new_v4().to_string(),
        conversation_id: conversation_id.to_string(),
        role,
        content: content.to_string(),
        created_at: now(),
    };

    conn.execute(
        "INSERT INTO messages (id, conversation_id, seq, role, content, created_at)
         VALUES (
            ?1, ?2,
            (SELECT COALESCE(MAX(seq), 0) + 1 FROM messages WHERE conversation_id = ?2),
            ?3, ?4, ?5
         )",
        params![
            message.id,
            message.conversation_id,
            message.role.as_str(),
            message.content,
            message.created_at,
        ],
    )?;
    conn.execute(
        "UPDATE conversations SET updated_at = ?1 WHERE id = ?2",
        params![message.created_at, conversation_id],
    )?;

    Ok(message)
}

/// Stores one user turn and the assistant's reply atomically.
pub fn record_exchange(
    conn: &Connection,
    chatbot_id: &str,
    user_content: &str,
    assistant_content: &str,
) -> Result<Conversation, RegistryError> {
    let tx = conn.unchecked_transaction()?;
    let conversation = current_or_create_conversation(&tx, chatbot_id)?;
    append_message(&tx, &conversation.id, Role::User, user_content)?;
    append_message(&tx, &conversation.id, Role::Assistant, assistant_content)?;
    tx.commit()?;
    Ok(conversation)
}

/// Lists the messages of the chatbot's current conversation, oldest first.
///
/// Returns an empty list when the chatbot has no conversation yet.
pub fn list_messages(
    conn: &Connection,
    chatbot_id: &str,
) -> Result<Vec<StoredMessage>, RegistryError> {
    let Some(conversation) = current_conversation(conn, chatbot_id)? else {
        return Ok(Vec::new());
    };

    let mut stmt = conn.prepare(
        "SELECT id, conversation_id, role, content, created_at FROM messages
         WHERE conversation_id = ?1
         ORDER BY seq ASC",
    )?;
    let rows = stmt.query_map([&conversation.id], map_message)?;
    let mut messages = Vec::new();
    for row in rows {
        messages.push(row?);
    }
    Ok(messages)
}

/// Removes every message of the chatbot's current conversation.
///
/// The conversation row itself is kept. Returns the number of removed
/// messages, or `NoConversation` when there is nothing to clear.
pub fn clear_messages(conn: &Connection, chatbot_id: &str) -> Result<usize, RegistryError> {
    let conversation = current_conversation(conn, chatbot_id)?
        .ok_or_else(|| RegistryError::NoConversation(chatbot_id.to_string()))?;
    let removed = conn.execute(
        "DELETE FROM messages WHERE conversation_id = ?1",
        [&conversation.id],
    )?;
    tracing::info!(chatbot_id, removed, "conversation cleared");
    Ok(removed)
}

fn map_conversation(row: &Row) -> rusqlite::Result<Conversation> {
    Ok(Conversation {
        id: row.get(0)?,
        chatbot_id: row.get(1)?,
        created_at: row.get(2)?,
        updated_at: row.get(3)?,
    })
}

fn map_message(row: &Row) -> rusqlite::Result<StoredMessage> {
    let role: String = row.get(2)?;
    let role = role.parse::<Role>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(StoredMessage {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        role,
        content: row.get(3)?,
        created_at: row.get(4)?,
    })
}
