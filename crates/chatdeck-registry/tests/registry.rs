use chatdeck_registry::{
    clear_messages, create_chatbot, delete_chatbot, get_chatbot, list_chatbots, list_messages,
    record_exchange, update_chatbot, ChatbotParams, RegistryError,
};
use chatdeck_types::{Provider, Role};
use rusqlite::Connection;

fn setup() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
    chatdeck_db::run_migrations(&conn).unwrap();
    conn
}

fn groq_bot(name: &str) -> ChatbotParams {
    ChatbotParams {
        name: name.to_string(),
        system_prompt: format!("You are {name}."),
        provider: Provider::Groq,
        model: "llama-3.3-70b-versatile".to_string(),
    }
}

#[test]
fn create_then_get_returns_same_fields() {
    let conn = setup();
    let created = create_chatbot(&conn, &groq_bot("Ada")).unwrap();

    let fetched = get_chatbot(&conn, &created.id).unwrap();
    assert_eq!(fetched, created);
    assert_eq!(fetched.name, "Ada");
    assert_eq!(fetched.system_prompt, "You are Ada.");
    assert_eq!(fetched.provider, Provider::Groq);
    assert!(uuid::Uuid::parse_str(&fetched.id).is_ok());
}

#[test]
fn list_is_newest_first() {
    let conn = setup();
    let first = create_chatbot(&conn, &groq_bot("First")).unwrap();
    let second = create_chatbot(&conn, &groq_bot("Second")).unwrap();

    let ids: Vec<String> = list_chatbots(&conn)
        .unwrap()
        .into_iter()
        .map(|b| b.id)
        .collect();
    assert_eq!(ids, vec![second.id, first.id]);
}

#[test]
fn update_replaces_fields_and_bumps_timestamp() {
    let conn = setup();
    let created = create_chatbot(&conn, &groq_bot("Old")).unwrap();

    let updated = update_chatbot(
        &conn,
        &created.id,
        &ChatbotParams {
            name: "New".to_string(),
            system_prompt: String::new(),
            provider: Provider::OpenAi,
            model: "gpt-4".to_string(),
        },
    )
    .unwrap();

    assert_eq!(updated.name, "New");
    assert_eq!(updated.provider, Provider::OpenAi);
    assert_eq!(updated.created_at, created.created_at);
    assert!(updated.updated_at >= created.updated_at);

    let missing = update_chatbot(&conn, "nope", &groq_bot("X"));
    assert!(matches!(missing, Err(RegistryError::NotFound(_))));
}

#[test]
fn delete_twice_reports_not_found() {
    let conn = setup();
    let bot = create_chatbot(&conn, &groq_bot("Gone")).unwrap();

    delete_chatbot(&conn, &bot.id).unwrap();
    assert!(matches!(
        delete_chatbot(&conn, &bot.id),
        Err(RegistryError::NotFound(_))
    ));
    assert!(matches!(
        get_chatbot(&conn, &bot.id),
        Err(RegistryError::NotFound(_))
    ));
}

#[test]
fn transcript_reuses_one_conversation_in_order() {
    let conn = setup();
    let bot = create_chatbot(&conn, &groq_bot("Talker")).unwrap();

    assert!(list_messages(&conn, &bot.id).unwrap().is_empty());

    let first = record_exchange(&conn, &bot.id, "hello", "hi there").unwrap();
    let second = record_exchange(&conn, &bot.id, "how are you?", "fine").unwrap();
    assert_eq!(first.id, second.id);

    let messages = list_messages(&conn, &bot.id).unwrap();
    let flat: Vec<(Role, &str)> = messages
        .iter()
        .map(|m| (m.role, m.content.as_str()))
        .collect();
    assert_eq!(
        flat,
        vec![
            (Role::User, "hello"),
            (Role::Assistant, "hi there"),
            (Role::User, "how are you?"),
            (Role::Assistant, "fine"),
        ]
    );
}

#[test]
fn clear_removes_messages_but_needs_a_conversation() {
    let conn = setup();
    let bot = create_chatbot(&conn, &groq_bot("Quiet")).unwrap();

    assert!(matches!(
        clear_messages(&conn, &bot.id),
        Err(RegistryError::NoConversation(_))
    ));

    record_exchange(&conn, &bot.id, "a", "b").unwrap();
    assert_eq!(clear_messages(&conn, &bot.id).unwrap(), 2);
    assert!(list_messages(&conn, &bot.id).unwrap().is_empty());
}

#[test]
fn exchange_for_unknown_chatbot_stores_nothing() {
    let conn = setup();
    let err = record_exchange(&conn, "ghost", "a", "b").unwrap_err();
    assert!(matches!(err, RegistryError::NotFound(_)));

    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM conversations", [], |r| r.get(0))
        .unwrap();
    assert_eq!(count, 0);
}

#[test]
fn deleting_chatbot_drops_its_transcript() {
    let conn = setup();
    let bot = create_chatbot(&conn, &groq_bot("Brief")).unwrap();
    record_exchange(&conn, &bot.id, "a", "b").unwrap();

    delete_chatbot(&conn, &bot.id).unwrap();

    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM messages", [], |r| r.get(0))
        .unwrap();
    assert_eq!(count, 0);
}
