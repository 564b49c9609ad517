use chatdeck_types::Provider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    1000
}

fn default_timeout_ms() -> u64 {
    30_000
}

/// Generation parameters and credentials for one provider.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// Overrides the provider's public endpoint when set.
    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default, skip_serializing)]
    pub api_key: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Upper bound on a whole completion call, streaming included.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: String::new(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

impl ProviderSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Settings for every provider, keyed by [`Provider`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub groq: ProviderSettings,
    #[serde(default)]
    pub openai: ProviderSettings,
}

impl ProvidersConfig {
    pub fn get(&self, provider: Provider) -> &ProviderSettings {
        match provider {
            Provider::Groq => &self.groq,
            Provider::OpenAi => &self.openai,
        }
    }

    pub fn get_mut(&mut self, provider: Provider) -> &mut ProviderSettings {
        match provider {
            Provider::Groq => &mut self.groq,
            Provider::OpenAi => &mut self.openai,
        }
    }

    /// Resolves the chat-completions base URL for `provider`.
    pub fn base_url(&self, provider: Provider) -> &str {
        match (&self.get(provider).base_url, provider) {
            (Some(url), _) => url.trim_end_matches('/'),
            (None, Provider::Groq) => GROQ_BASE_URL,
            (None, Provider::OpenAi) => OPENAI_BASE_URL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_api_key() {
        let settings = ProviderSettings {
            api_key: "gsk_live_secret".to_string(),
            ..ProviderSettings::default()
        };
        let printed = format!("{settings:?}");
        assert!(!printed.contains("gsk_live_secret"));
        assert!(printed.contains("[REDACTED]"));
    }

    #[test]
    fn partial_section_keeps_defaults() {
        let config: ProvidersConfig = from_json(r#"{"groq": {"api_key": "k"}}"#);
        assert_eq!(config.groq.api_key, "k");
        assert_eq!(config.groq.max_tokens, 1000);
        assert_eq!(config.groq.timeout_ms, 30_000);
        assert!((config.openai.temperature - 0.7).abs() < f32::EPSILON);
        assert_eq!(config.base_url(Provider::Groq), GROQ_BASE_URL);
    }

    #[test]
    fn base_url_override_drops_trailing_slash() {
        let mut config = ProvidersConfig::default();
        config.get_mut(Provider::OpenAi).base_url = Some("http://127.0.0.1:9/v1/".to_string());
        assert_eq!(config.base_url(Provider::OpenAi), "http://127.0.0.1:9/v1");
    }

    fn from_json(json: &str) -> ProvidersConfig {
        serde_json::from_str(json).unwrap()
    }
}
