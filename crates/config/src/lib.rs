//! Configuration loading, validation, and management for LedgerClaw.
//!
//! Loads configuration from `~/.ledgerclaw/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.ledgerclaw/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default model backend
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Default max tokens per model response
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Agent loop and confirmation settings
    #[serde(default)]
    pub agent: AgentConfig,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Conversation history storage
    #[serde(default)]
    pub history: HistoryConfig,

    /// The financial dataset read by the ledger tools
    #[serde(default)]
    pub ledger: LedgerConfig,

    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

fn default_provider() -> String {
    "anthropic".into()
}
fn default_model() -> String {
    "claude-sonnet-4-20250514".into()
}
fn default_temperature() -> f32 {
    0.3
}
fn default_max_tokens() -> u32 {
    4096
}

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("agent", &self.agent)
            .field("rate_limit", &self.rate_limit)
            .field("history", &self.history)
            .field("ledger", &self.ledger)
            .field("gateway", &self.gateway)
            .field("providers", &self.providers)
            .finish()
    }
}

/// Agent loop bounds and confirmation lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Model round-trips allowed per request before giving up
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Stored messages loaded as context for each new message
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// How long a pending action waits for approval
    #[serde(default = "default_confirmation_ttl_secs")]
    pub confirmation_ttl_secs: u64,

    /// Size of each streamed text fragment, in characters
    #[serde(default = "default_stream_chunk_chars")]
    pub stream_chunk_chars: usize,

    /// How often the gateway purges expired pending actions
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Replaces the generated financial-assistant system prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt_override: Option<String>,
}

fn default_max_iterations() -> usize {
    10
}
fn default_history_limit() -> usize {
    20
}
/// Longest accepted `agent.confirmation_ttl_secs` (one day).
pub const MAX_CONFIRMATION_TTL_SECS: u64 = 86_400;

fn default_confirmation_ttl_secs() -> u64 {
    300
}
fn default_stream_chunk_chars() -> usize {
    20
}
fn default_sweep_interval_secs() -> u64 {
    60
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            history_limit: default_history_limit(),
            confirmation_ttl_secs: default_confirmation_ttl_secs(),
            stream_chunk_chars: default_stream_chunk_chars(),
            sweep_interval_secs: default_sweep_interval_secs(),
            system_prompt_override: None,
        }
    }
}

/// Sliding-window admission control per client key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_max_requests")]
    pub max_requests: usize,

    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

fn default_max_requests() -> usize {
    10
}
fn default_window_secs() -> u64 {
    60
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_secs: default_window_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// "sqlite" or "memory"
    #[serde(default = "default_history_backend")]
    pub backend: String,

    /// Database file; defaults to `~/.ledgerclaw/history.sqlite`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

fn default_history_backend() -> String {
    "sqlite".into()
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            backend: default_history_backend(),
            path: None,
        }
    }
}

impl HistoryConfig {
    pub fn resolved_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| AppConfig::config_dir().join("history.sqlite"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Database file; defaults to `~/.ledgerclaw/ledger.sqlite`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Mutating tools only record what they would have done
    #[serde(default = "default_true")]
    pub simulate_writes: bool,
}

fn default_true() -> bool {
    true
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: None,
            simulate_writes: true,
        }
    }
}

impl LedgerConfig {
    pub fn resolved_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| AppConfig::config_dir().join("ledger.sqlite"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// Allowed browser origin for the HTTP API
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
}

fn default_port() -> u16 {
    42618
}
fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_cors_origin() -> String {
    "http://localhost:8080".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            cors_origin: default_cors_origin(),
        }
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
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

impl AppConfig {
    /// Load configuration from the default path (~/.ledgerclaw/config.toml).
    ///
    /// Also checks environment variables for API keys:
    /// - `LEDGERCLAW_API_KEY` (highest priority)
    /// - `ANTHROPIC_API_KEY`
    /// - `OPENAI_API_KEY`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if self.api_key.is_none() {
            self.api_key = std::env::var("LEDGERCLAW_API_KEY")
                .ok()
                .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok())
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(provider) = std::env::var("LEDGERCLAW_PROVIDER") {
            self.default_provider = provider;
        }

        if let Ok(model) = std::env::var("LEDGERCLAW_MODEL") {
            self.default_model = model;
        }
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

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".ledgerclaw")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.default_temperature) {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        let positive = [
            ("agent.max_iterations", self.agent.max_iterations as u64),
            ("agent.history_limit", self.agent.history_limit as u64),
            ("agent.confirmation_ttl_secs", self.agent.confirmation_ttl_secs),
            ("agent.stream_chunk_chars", self.agent.stream_chunk_chars as u64),
            ("agent.sweep_interval_secs", self.agent.sweep_interval_secs),
            ("rate_limit.max_requests", self.rate_limit.max_requests as u64),
            ("rate_limit.window_secs", self.rate_limit.window_secs),
        ];
        if let Some((field, _)) = positive.iter().find(|(_, v)| *v == 0) {
            return Err(ConfigError::ValidationError(format!("{field} must be > 0")));
        }

        if self.agent.confirmation_ttl_secs > MAX_CONFIRMATION_TTL_SECS {
            return Err(ConfigError::ValidationError(format!(
                "agent.confirmation_ttl_secs must be at most {MAX_CONFIRMATION_TTL_SECS}"
            )));
        }

        // Only the dry-run business client exists
        if !self.ledger.simulate_writes {
            return Err(ConfigError::ValidationError(
                "ledger.simulate_writes = false needs a live business connector, and none is available".into(),
            ));
        }

        if !matches!(self.history.backend.as_str(), "sqlite" | "memory") {
            return Err(ConfigError::ValidationError(format!(
                "Unknown history backend '{}' (expected sqlite or memory)",
                self.history.backend
            )));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
            || self
                .providers
                .get(&self.default_provider)
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
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            agent: AgentConfig::default(),
            rate_limit: RateLimitConfig::default(),
            history: HistoryConfig::default(),
            ledger: LedgerConfig::default(),
            gateway: GatewayConfig::default(),
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

impl From<ConfigError> for ledgerclaw_core::Error {
    fn from(e: ConfigError) -> Self {
        ledgerclaw_core::Error::Config {
            message: e.to_string(),
        }
    }
}
