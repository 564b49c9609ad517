//! Built-in chatbots for the demo chat endpoint.
//!
//! These never touch the database and are always served by Groq.

use crate::Chatbot;
use chatdeck_types::Provider;

const DEMO_STAMP: &str = "1970-01-01T00:00:00Z";

const DEMO_TABLE: &[(&str, &str, &str, &str)] = &[
    (
        "1",
        "Bot",
        "You are a helpful and friendly assistant.",
        "meta-llama/llama-4-maverick-17b-128e-instruct",
    ),
    (
        "2",
        "Bia",
        "You are an assistant specialized in digital marketing.",
        "llama-3.3-70b-versatile",
    ),
];

/// Looks up a demo chatbot by id.
pub fn demo_chatbot(id: &str) -> Option<Chatbot> {
    DEMO_TABLE
        .iter()
        .find(|(demo_id, ..)| *demo_id == id)
        .map(|(id, name, prompt, model)| Chatbot {
            id: id.to_string(),
            name: name.to_string(),
            system_prompt: prompt.to_string(),
            provider: Provider::Groq,
            model: model.to_string(),
            created_at: DEMO_STAMP.to_string(),
            updated_at: DEMO_STAMP.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_table_has_two_groq_bots() {
        for id in ["1", "2"] {
            let bot = demo_chatbot(id).expect("demo bot");
            assert_eq!(bot.provider, Provider::Groq);
            assert!(Provider::Groq.supports_model(&bot.model));
        }
        assert!(demo_chatbot("3").is_none());
        assert!(demo_chatbot("").is_none());
    }
}
