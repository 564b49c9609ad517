//! Server configuration loading from file and environment variables.

use chatdeck_llm::ProvidersConfig;
use chatdeck_voice::SpeechConfig;
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;
use thiserror::Error;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Credentials and generation parameters per inference provider.
    #[serde(default)]
    pub providers: ProvidersConfig,

    #[serde(default)]
    pub chat: ChatConfig,

    /// Hosted speech API used by the TTS and transcription endpoints.
    #[serde(default)]
    pub speech: SpeechConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Externally reachable base URL, used in embed snippets.
    #[serde(default = "default_public_url")]
    pub public_url: String,

    /// Directory holding `embed.js` and the rest of the widget bundle.
    #[serde(default = "default_widget_dir")]
    pub widget_dir: String,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,

    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "chatdeck_server=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

/// Chat endpoint behaviour.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatConfig {
    /// Only this many of the most recent turns are sent upstream.
    #[serde(default = "default_max_history")]
    pub max_history: usize,

    /// Bound on resolving the chatbot before the upstream call starts.
    #[serde(default = "default_lookup_timeout_ms")]
    pub lookup_timeout_ms: u64,
}

impl ChatConfig {
    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    3000
}

fn default_public_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_widget_dir() -> String {
    "widget".to_string()
}

fn default_db_path() -> String {
    "chatdeck.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_pool_max_size() -> u32 {
    8
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_history() -> usize {
    10
}

fn default_lookup_timeout_ms() -> u64 {
    5_000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_url: default_public_url(),
            widget_dir: default_widget_dir(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            pool_max_size: default_pool_max_size(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_history: default_max_history(),
            lookup_timeout_ms: default_lookup_timeout_ms(),
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `CHATDECK_HOST` overrides `server.host`
/// - `CHATDECK_PORT` overrides `server.port`
/// - `CHATDECK_PUBLIC_URL` overrides `server.public_url`
/// - `CHATDECK_DB_PATH` overrides `database.path`
/// - `CHATDECK_LOG_LEVEL` overrides `logging.level`
/// - `CHATDECK_LOG_JSON` overrides `logging.json` (set to "true" to enable)
/// - `GROQ_API_KEY` overrides `providers.groq.api_key`
/// - `OPENAI_API_KEY` overrides `providers.openai.api_key`
///
/// `speech.api_key` falls back to the OpenAI key when left empty.
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    Ok(apply_overrides(config, |key| std::env::var(key).ok()))
}

fn apply_overrides(mut config: Config, var: impl Fn(&str) -> Option<String>) -> Config {
    if let Some(host) = var("CHATDECK_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Some(port) = var("CHATDECK_PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Some(url) = var("CHATDECK_PUBLIC_URL") {
        config.server.public_url = url;
    }
    if let Some(db_path) = var("CHATDECK_DB_PATH") {
        config.database.path = db_path;
    }
    if let Some(level) = var("CHATDECK_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = var("CHATDECK_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
    if let Some(key) = var("GROQ_API_KEY") {
        config.providers.groq.api_key = key;
    }
    if let Some(key) = var("OPENAI_API_KEY") {
        config.providers.openai.api_key = key;
    }

    if config.speech.api_key.is_empty() {
        config.speech.api_key = config.providers.openai.api_key.clone();
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_file_yields_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.database.path, "chatdeck.db");
        assert_eq!(config.chat.max_history, 10);
        assert_eq!(config.chat.lookup_timeout(), Duration::from_secs(5));
        assert_eq!(config.speech.max_tts_chars, 4000);
        assert_eq!(config.providers.groq.max_tokens, 1000);
    }

    #[test]
    fn sections_parse_from_toml() {
        let config: Config = toml::from_str(
            r#"
            [server]
            port = 8080
            public_url = "https://bots.example.com"

            [providers.groq]
            api_key = "gsk_file"
            timeout_ms = 1000

            [chat]
            max_history = 4

            [speech]
            tts_model = "tts-1-hd"
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.public_url, "https://bots.example.com");
        assert_eq!(config.providers.groq.api_key, "gsk_file");
        assert_eq!(config.providers.groq.timeout_ms, 1000);
        assert_eq!(config.chat.max_history, 4);
        assert_eq!(config.speech.tts_model, "tts-1-hd");
        assert_eq!(config.speech.stt_model, "whisper-1");
    }

    #[test]
    fn environment_overrides_file_values() {
        let config = apply_overrides(
            Config::default(),
            env(&[
                ("CHATDECK_PORT", "4000"),
                ("CHATDECK_HOST", "not-an-ip"),
                ("CHATDECK_LOG_JSON", "1"),
                ("GROQ_API_KEY", "gsk_env"),
                ("OPENAI_API_KEY", "sk_env"),
            ]),
        );
        assert_eq!(config.server.port, 4000);
        assert_eq!(config.server.host, default_host());
        assert!(config.logging.json);
        assert_eq!(config.providers.groq.api_key, "gsk_env");
        assert_eq!(config.speech.api_key, "sk_env");
    }

    #[test]
    fn explicit_speech_key_is_kept() {
        let mut config = Config::default();
        config.speech.api_key = "sk_speech".to_string();
        let config = apply_overrides(config, env(&[("OPENAI_API_KEY", "sk_chat")]));
        assert_eq!(config.speech.api_key, "sk_speech");
        assert_eq!(config.providers.openai.api_key, "sk_chat");
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let config = load_config(path.to_str()).unwrap();
        assert_eq!(config.server.widget_dir, "widget");
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[server\nport = ").unwrap();
        assert!(matches!(
            load_config(path.to_str()),
            Err(ConfigError::Parse(_))
        ));
    }
}
