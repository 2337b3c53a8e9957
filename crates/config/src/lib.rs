//! Configuration loading, validation, and management for Palaver.
//!
//! Loads configuration from `~/.palaver/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The root configuration structure.
///
/// Maps directly to `~/.palaver/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Telegram transport configuration
    #[serde(default)]
    pub telegram: TelegramConfig,

    /// Generation backend configuration
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Session shape and lifecycle configuration
    #[serde(default)]
    pub session: SessionConfig,

    /// Session store backend configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Context enrichment configuration
    #[serde(default)]
    pub enrichment: EnrichmentConfig,

    /// Audit reporting configuration
    #[serde(default)]
    pub audit: AuditConfig,
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("telegram", &self.telegram)
            .field("generation", &self.generation)
            .field("session", &self.session)
            .field("store", &self.store)
            .field("enrichment", &self.enrichment)
            .field("audit", &self.audit)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Bot API token (or `TELEGRAM_TOKEN` / `PALAVER_BOT_TOKEN` env var)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_token: Option<String>,

    /// Long-poll timeout passed to getUpdates
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_secs: u64,

    /// Reply to the /start command
    #[serde(default = "default_greeting")]
    pub greeting: String,

    /// Reply to the /help command
    #[serde(default = "default_help_text")]
    pub help_text: String,
}

fn default_poll_timeout() -> u64 {
    30
}
fn default_greeting() -> String {
    "Bot online. Send a message to start chatting.".into()
}
fn default_help_text() -> String {
    "Send any text message and I will reply. /start restarts the greeting.".into()
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            poll_timeout_secs: default_poll_timeout(),
            greeting: default_greeting(),
            help_text: default_help_text(),
        }
    }
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("bot_token", &redact(&self.bot_token))
            .field("poll_timeout_secs", &self.poll_timeout_secs)
            .field("greeting", &self.greeting)
            .field("help_text", &self.help_text)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// API key for the backend (or `HF_TOKEN` / `PALAVER_API_KEY` env var)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL of the OpenAI-compatible endpoint
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Model identifier
    #[serde(default = "default_model")]
    pub model: String,

    /// Maximum tokens per generated reply
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Request timeout for one generation call
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,

    /// Reply sent when the backend fails
    #[serde(default = "default_fallback_reply")]
    pub fallback_reply: String,
}

fn default_api_url() -> String {
    "https://router.huggingface.co/v1".into()
}
fn default_model() -> String {
    "deepseek-ai/DeepSeek-V3.2-Exp".into()
}
fn default_max_tokens() -> u32 {
    600
}
fn default_temperature() -> f32 {
    0.7
}
fn default_generation_timeout() -> u64 {
    60
}
fn default_fallback_reply() -> String {
    "Connection unstable right now. Please try again in a moment.".into()
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: default_api_url(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_generation_timeout(),
            fallback_reply: default_fallback_reply(),
        }
    }
}

impl std::fmt::Debug for GenerationConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("timeout_secs", &self.timeout_secs)
            .field("fallback_reply", &self.fallback_reply)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// The pinned instruction entry seeded into every fresh session.
    /// Opaque to the engine; supplied by the operator.
    #[serde(default = "default_system_instruction")]
    pub system_instruction: String,

    /// Maximum entries a saved session may hold, pinned entry included
    #[serde(default = "default_max_history")]
    pub max_history: usize,

    /// Idle lifetime of a session record; refreshed on every save
    #[serde(default = "default_session_ttl")]
    pub ttl_secs: u64,

    /// Token that switches the session to its unlocked state when it
    /// appears in any user turn. Empty = detection disabled.
    #[serde(default)]
    pub unlock_token: String,
}

fn default_system_instruction() -> String {
    "You are a helpful personal assistant. Be concise and direct.".into()
}
fn default_max_history() -> usize {
    20
}
fn default_session_ttl() -> u64 {
    60 * 60 * 24 * 15 // 15 days
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            system_instruction: default_system_instruction(),
            max_history: default_max_history(),
            ttl_secs: default_session_ttl(),
            unlock_token: String::new(),
        }
    }
}

impl SessionConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Which backend to use: "redis" or "memory"
    #[serde(default = "default_store_backend")]
    pub backend: String,

    /// Redis connection URL (or `REDIS_URL` env var)
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
}

fn default_store_backend() -> String {
    "redis".into()
}
fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".into()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            redis_url: default_redis_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    /// strftime-style format for the temporal grounding entry
    #[serde(default = "default_time_format")]
    pub time_format: String,

    /// Minutes added to UTC when rendering the current time
    #[serde(default)]
    pub utc_offset_minutes: i32,

    /// Substrings of the inbound text that trigger a search lookup
    #[serde(default = "default_trigger_keywords")]
    pub trigger_keywords: Vec<String>,

    /// How many search results may feed the fact summary
    #[serde(default = "default_search_max_results")]
    pub search_max_results: usize,

    /// Hard ceiling on one search lookup; must stay below the
    /// generation timeout
    #[serde(default = "default_search_timeout")]
    pub search_timeout_secs: u64,
}

fn default_time_format() -> String {
    "%Y-%m-%d %H:%M".into()
}
fn default_trigger_keywords() -> Vec<String> {
    ["news", "latest", "price", "who is", "what is"]
        .into_iter()
        .map(String::from)
        .collect()
}
fn default_search_max_results() -> usize {
    3
}
fn default_search_timeout() -> u64 {
    5
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            time_format: default_time_format(),
            utc_offset_minutes: 0,
            trigger_keywords: default_trigger_keywords(),
            search_max_results: default_search_max_results(),
            search_timeout_secs: default_search_timeout(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Whether audit events are forwarded to the ops chat
    #[serde(default)]
    pub enabled: bool,

    /// Token of the bot that posts audit reports
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_token: Option<String>,

    /// Chat that receives audit reports
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bot_token: None,
            chat_id: None,
        }
    }
}

impl std::fmt::Debug for AuditConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditConfig")
            .field("enabled", &self.enabled)
            .field("bot_token", &redact(&self.bot_token))
            .field("chat_id", &self.chat_id)
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.palaver/config.toml).
    ///
    /// Also checks environment variables for secrets:
    /// - `PALAVER_BOT_TOKEN` / `TELEGRAM_TOKEN` for the transport
    /// - `PALAVER_API_KEY` / `HF_TOKEN` for the generation backend
    /// - `REDIS_URL` for the store
    /// - `PALAVER_AUDIT_BOT_TOKEN` / `PALAVER_AUDIT_CHAT_ID` for audit
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        Self::load_with_env(&config_path)
    }

    /// Load configuration from a specific file path, then apply env overrides.
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;

        if config.telegram.bot_token.is_none() {
            config.telegram.bot_token = std::env::var("PALAVER_BOT_TOKEN")
                .ok()
                .or_else(|| std::env::var("TELEGRAM_TOKEN").ok());
        }

        if config.generation.api_key.is_none() {
            config.generation.api_key = std::env::var("PALAVER_API_KEY")
                .ok()
                .or_else(|| std::env::var("HF_TOKEN").ok());
        }

        if let Ok(url) = std::env::var("REDIS_URL") {
            config.store.redis_url = url;
        }

        if config.audit.bot_token.is_none() {
            config.audit.bot_token = std::env::var("PALAVER_AUDIT_BOT_TOKEN").ok();
        }
        if config.audit.chat_id.is_none() {
            config.audit.chat_id = std::env::var("PALAVER_AUDIT_CHAT_ID").ok();
        }

        Ok(config)
    }

    /// Load configuration from a specific file path.
    ///
    /// A missing file yields defaults; a malformed or invalid file is an error.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".palaver")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.generation.temperature < 0.0 || self.generation.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "generation.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.generation.max_tokens == 0 {
            return Err(ConfigError::ValidationError(
                "generation.max_tokens must be > 0".into(),
            ));
        }

        if self.session.max_history == 0 {
            return Err(ConfigError::ValidationError(
                "session.max_history must be > 0".into(),
            ));
        }

        if self.session.ttl_secs == 0 {
            return Err(ConfigError::ValidationError(
                "session.ttl_secs must be > 0".into(),
            ));
        }

        match self.store.backend.as_str() {
            "redis" | "memory" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "store.backend must be \"redis\" or \"memory\", got \"{other}\""
                )));
            }
        }

        // Search must give up well before the generation call would; a slow
        // lookup may delay a turn but never dominate it.
        if self.enrichment.search_timeout_secs >= self.generation.timeout_secs {
            return Err(ConfigError::ValidationError(
                "enrichment.search_timeout_secs must be below generation.timeout_secs".into(),
            ));
        }

        Ok(())
    }

    /// Check if the transport token is available (from config or environment).
    pub fn has_bot_token(&self) -> bool {
        self.telegram.bot_token.is_some()
    }

    /// Check if the generation API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.generation.api_key.is_some()
    }

    /// Generate a default config TOML string (for the `init` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            telegram: TelegramConfig::default(),
            generation: GenerationConfig::default(),
            session: SessionConfig::default(),
            store: StoreConfig::default(),
            enrichment: EnrichmentConfig::default(),
            audit: AuditConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.session.max_history, 20);
        assert_eq!(config.session.ttl_secs, 60 * 60 * 24 * 15);
        assert_eq!(config.generation.max_tokens, 600);
        assert_eq!(config.store.backend, "redis");
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.session.max_history, config.session.max_history);
        assert_eq!(parsed.enrichment.trigger_keywords, config.enrichment.trigger_keywords);
    }

    #[test]
    fn invalid_temperature_rejected() {
        let config = AppConfig {
            generation: GenerationConfig {
                temperature: 5.0,
                ..GenerationConfig::default()
            },
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn search_timeout_must_undercut_generation_timeout() {
        let config = AppConfig {
            enrichment: EnrichmentConfig {
                search_timeout_secs: 60,
                ..EnrichmentConfig::default()
            },
            ..AppConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("search_timeout_secs"));
    }

    #[test]
    fn unknown_store_backend_rejected() {
        let config = AppConfig {
            store: StoreConfig {
                backend: "postgres".into(),
                ..StoreConfig::default()
            },
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let result = AppConfig::load_from(Path::new("/nonexistent/config.toml"));
        assert!(result.is_ok());
        let config = result.unwrap();
        assert_eq!(config.session.max_history, 20);
    }

    #[test]
    fn config_file_parsing() {
        let toml_str = r#"
[session]
system_instruction = "You are a terse operations assistant."
max_history = 8
unlock_token = "let me in"

[enrichment]
trigger_keywords = ["weather", "score"]
utc_offset_minutes = 60

[store]
backend = "memory"
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.session.max_history, 8);
        assert_eq!(config.session.unlock_token, "let me in");
        assert_eq!(config.enrichment.trigger_keywords, vec!["weather", "score"]);
        assert_eq!(config.enrichment.utc_offset_minutes, 60);
        assert_eq!(config.store.backend, "memory");
        // Untouched sections keep their defaults
        assert_eq!(config.generation.max_tokens, 600);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn load_from_disk_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, AppConfig::default_toml()).unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.session.max_history, 20);
        assert_eq!(config.generation.temperature, 0.7);
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("[session]"));
        assert!(toml_str.contains("max_history = 20"));
        assert!(toml_str.contains("[enrichment]"));
    }

    #[test]
    fn debug_redacts_secrets() {
        let config = AppConfig {
            telegram: TelegramConfig {
                bot_token: Some("123456:secret-token".into()),
                ..TelegramConfig::default()
            },
            generation: GenerationConfig {
                api_key: Some("hf_secret".into()),
                ..GenerationConfig::default()
            },
            ..AppConfig::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("secret-token"));
        assert!(!debug.contains("hf_secret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
