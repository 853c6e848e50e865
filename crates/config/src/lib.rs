//! Configuration loading, validation, and management for streamchat.
//!
//! Loads configuration from `~/.streamchat/config.toml` with environment
//! variable overrides. Validates all settings at startup: a bad bound is
//! fatal before the first event is read, never at runtime.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The root configuration structure.
///
/// Maps directly to `~/.streamchat/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// The bot's own chat name (self-messages are ignored, mentions detected)
    #[serde(default = "default_bot_username")]
    pub bot_username: String,

    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Event pipeline tuning
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Text-generation settings
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Reaction templates for platform events
    #[serde(default)]
    pub templates: TemplateConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

fn default_bot_username() -> String {
    "streamchat".into()
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
            .field("bot_username", &self.bot_username)
            .field("api_key", &redact(&self.api_key))
            .field("pipeline", &self.pipeline)
            .field("generation", &self.generation)
            .field("templates", &self.templates)
            .field("logging", &self.logging)
            .field("providers", &self.providers)
            .finish()
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

/// What to do with a new event when the ingestion queue is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShedPolicy {
    /// Evict the oldest buffered event to make room
    #[default]
    DropOldest,
    /// Refuse the new event
    RejectNewest,
}

/// Which plain chat messages reach the text-generation service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RespondTo {
    /// Every non-command chat message
    #[default]
    All,
    /// Only messages containing `@<bot_username>`
    Mentions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Max history entries kept per channel
    #[serde(default = "default_context_window_size")]
    pub context_window_size: usize,

    /// History entries older than this are left out of prompts (0 = no limit)
    #[serde(default)]
    pub context_max_age_secs: u64,

    /// Max buffered events
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    #[serde(default)]
    pub queue_shed_policy: ShedPolicy,

    /// Generation requests per second, across all channels
    #[serde(default = "default_generation_rate_limit")]
    pub generation_rate_limit: f64,

    #[serde(default = "default_generation_timeout_ms")]
    pub generation_timeout_ms: u64,

    /// Extra attempts after a failed generation call (0 or 1)
    #[serde(default = "default_generation_max_retries")]
    pub generation_max_retries: u32,

    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Events older than this when generation would start are not answered
    #[serde(default = "default_staleness_threshold_ms")]
    pub staleness_threshold_ms: u64,

    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,

    /// Number of worker tasks pulling from the queue
    #[serde(default = "default_workers")]
    pub workers: usize,

    #[serde(default)]
    pub respond_to: RespondTo,

    /// Channels untouched for this long are dropped from memory
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    #[serde(default = "default_reap_interval_secs")]
    pub reap_interval_secs: u64,
}

fn default_context_window_size() -> usize {
    50
}
fn default_queue_capacity() -> usize {
    256
}
fn default_generation_rate_limit() -> f64 {
    1.0
}
fn default_generation_timeout_ms() -> u64 {
    10_000
}
fn default_generation_max_retries() -> u32 {
    1
}
fn default_retry_backoff_ms() -> u64 {
    500
}
fn default_staleness_threshold_ms() -> u64 {
    30_000
}
fn default_command_prefix() -> String {
    "!".into()
}
fn default_workers() -> usize {
    2
}
fn default_idle_timeout_secs() -> u64 {
    1800
}
fn default_reap_interval_secs() -> u64 {
    60
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            context_window_size: default_context_window_size(),
            context_max_age_secs: 0,
            queue_capacity: default_queue_capacity(),
            queue_shed_policy: ShedPolicy::default(),
            generation_rate_limit: default_generation_rate_limit(),
            generation_timeout_ms: default_generation_timeout_ms(),
            generation_max_retries: default_generation_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            staleness_threshold_ms: default_staleness_threshold_ms(),
            command_prefix: default_command_prefix(),
            workers: default_workers(),
            respond_to: RespondTo::default(),
            idle_timeout_secs: default_idle_timeout_secs(),
            reap_interval_secs: default_reap_interval_secs(),
        }
    }
}

impl PipelineConfig {
    pub fn generation_timeout(&self) -> Duration {
        Duration::from_millis(self.generation_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn staleness_threshold(&self) -> Duration {
        Duration::from_millis(self.staleness_threshold_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval_secs)
    }

    pub fn context_max_age(&self) -> Option<Duration> {
        (self.context_max_age_secs > 0).then(|| Duration::from_secs(self.context_max_age_secs))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.context_window_size == 0 {
            return Err(ConfigError::ValidationError(
                "pipeline.context_window_size must be > 0".into(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "pipeline.queue_capacity must be > 0".into(),
            ));
        }
        if self.workers == 0 {
            return Err(ConfigError::ValidationError(
                "pipeline.workers must be > 0".into(),
            ));
        }
        if !self.generation_rate_limit.is_finite() || self.generation_rate_limit <= 0.0 {
            return Err(ConfigError::ValidationError(
                "pipeline.generation_rate_limit must be a positive number".into(),
            ));
        }
        if self.generation_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "pipeline.generation_timeout_ms must be > 0".into(),
            ));
        }
        if self.generation_max_retries > 1 {
            return Err(ConfigError::ValidationError(
                "pipeline.generation_max_retries must be 0 or 1".into(),
            ));
        }
        if self.idle_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "pipeline.idle_timeout_secs must be > 0".into(),
            ));
        }
        if self.reap_interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "pipeline.reap_interval_secs must be > 0".into(),
            ));
        }
        if self.command_prefix.is_empty() || self.command_prefix.chars().any(char::is_whitespace)
        {
            return Err(ConfigError::ValidationError(
                "pipeline.command_prefix must be non-empty and contain no whitespace".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Which entry of `providers` to use
    #[serde(default = "default_provider")]
    pub provider: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// How many recent context entries go into the prompt
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Replies longer than this are cut and end in "..."
    #[serde(default = "default_max_reply_chars")]
    pub max_reply_chars: usize,

    /// System prompt
    #[serde(default = "default_persona")]
    pub persona: String,
}

fn default_provider() -> String {
    "openai".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    150
}
fn default_history_limit() -> usize {
    10
}
fn default_max_reply_chars() -> usize {
    500
}
fn default_persona() -> String {
    "You are a friendly, entertaining live-stream chatbot. Keep responses short \
     (1-2 sentences max) and conversational. Be helpful and engaging but concise; \
     stream chat is fast-paced."
        .into()
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            history_limit: default_history_limit(),
            max_reply_chars: default_max_reply_chars(),
            persona: default_persona(),
        }
    }
}

/// Reaction templates. Placeholders: `{user}`, `{channel}`, `{months}`, `{viewers}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateConfig {
    #[serde(default = "default_follow_template")]
    pub follow: String,

    #[serde(default = "default_subscription_template")]
    pub subscription: String,

    #[serde(default = "default_raid_template")]
    pub raid: String,
}

fn default_follow_template() -> String {
    "Thanks for the follow, {user}! Welcome in!".into()
}
fn default_subscription_template() -> String {
    "{user} just subscribed ({months} months)! Thank you so much!".into()
}
fn default_raid_template() -> String {
    "Incoming raid! {user} is here with {viewers} viewers, welcome everyone!".into()
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            follow: default_follow_template(),
            subscription: default_subscription_template(),
            raid: default_raid_template(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Emit JSON log lines instead of human-readable ones
    #[serde(default)]
    pub json: bool,

    /// Log a metrics snapshot this often (0 = never)
    #[serde(default = "default_stats_interval_secs")]
    pub stats_interval_secs: u64,
}

fn default_stats_interval_secs() -> u64 {
    60
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            json: false,
            stats_interval_secs: default_stats_interval_secs(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

impl AppConfig {
    /// Load configuration from the default path (~/.streamchat/config.toml).
    ///
    /// Environment overrides:
    /// - `STREAMCHAT_API_KEY`, then `OPENAI_API_KEY` (when no key is configured)
    /// - `STREAMCHAT_PROVIDER`, `STREAMCHAT_MODEL`, `STREAMCHAT_BOT_USERNAME`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
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

    /// Apply overrides from a variable lookup (the process environment in production).
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.api_key.is_none() {
            self.api_key = lookup("STREAMCHAT_API_KEY").or_else(|| lookup("OPENAI_API_KEY"));
        }
        if let Some(provider) = lookup("STREAMCHAT_PROVIDER") {
            self.generation.provider = provider;
        }
        if let Some(model) = lookup("STREAMCHAT_MODEL") {
            self.generation.model = model;
        }
        if let Some(name) = lookup("STREAMCHAT_BOT_USERNAME") {
            self.bot_username = name;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".streamchat")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bot_username.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "bot_username must not be empty".into(),
            ));
        }

        self.pipeline.validate()?;

        if self.generation.temperature < 0.0 || self.generation.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "generation.temperature must be between 0.0 and 2.0".into(),
            ));
        }
        if self.generation.max_reply_chars < 4 {
            return Err(ConfigError::ValidationError(
                "generation.max_reply_chars must be at least 4".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
            || self
                .providers
                .get(&self.generation.provider)
                .is_some_and(|p| p.api_key.is_some())
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bot_username: default_bot_username(),
            api_key: None,
            pipeline: PipelineConfig::default(),
            generation: GenerationConfig::default(),
            templates: TemplateConfig::default(),
            logging: LoggingConfig::default(),
            providers: HashMap::new(),
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
