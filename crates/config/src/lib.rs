//! Configuration loading, validation, and management for ToolRelay.
//!
//! Loads configuration from `~/.toolrelay/config.toml` with environment
//! variable overrides. Validates all settings at startup. Nothing below the
//! CLI reads the environment; every capability receives its settings from
//! this struct through its constructor.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.toolrelay/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the chat-completion endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL of an OpenAI-compatible endpoint
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Chat model
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Max tokens per model response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Agent loop settings
    #[serde(default)]
    pub agent: AgentSettings,

    /// Retrieval-augmented context settings
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Tool servers, in registration order (first wins on name collisions)
    #[serde(default)]
    pub tool_servers: Vec<ToolServerConfig>,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    4096
}

/// Redact a secret for Debug output.
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
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("agent", &self.agent)
            .field("retrieval", &self.retrieval)
            .field("tool_servers", &self.tool_servers)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    /// System prompt placed at the head of every conversation
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Upper bound on model round-trips per invocation
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
}

fn default_system_prompt() -> String {
    "You are a helpful assistant. Use the available tools when they help answer the task.".into()
}
fn default_max_iterations() -> u32 {
    25
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            max_iterations: default_max_iterations(),
        }
    }
}

/// Which ranking path builds the retrieval context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalStrategy {
    /// Remote reranking service scores the documents
    #[default]
    Rerank,
    /// Local cosine similarity over embeddings from the chat endpoint
    Vector,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub strategy: RetrievalStrategy,

    /// API key for the reranking service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL of the reranking service
    #[serde(default = "default_rerank_base_url")]
    pub base_url: String,

    /// Reranking model
    #[serde(default = "default_rerank_model")]
    pub model: String,

    /// Embedding model (vector strategy only)
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Documents returned into the context turn
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Directory of `.md`/`.txt` files forming the document store
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documents_dir: Option<String>,
}

fn default_rerank_base_url() -> String {
    "https://dashscope.aliyuncs.com/api/v1".into()
}
fn default_rerank_model() -> String {
    "gte-rerank".into()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}
fn default_top_k() -> usize {
    3
}

impl std::fmt::Debug for RetrievalConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrievalConfig")
            .field("enabled", &self.enabled)
            .field("strategy", &self.strategy)
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("embedding_model", &self.embedding_model)
            .field("top_k", &self.top_k)
            .field("documents_dir", &self.documents_dir)
            .finish()
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            strategy: RetrievalStrategy::default(),
            api_key: None,
            base_url: default_rerank_base_url(),
            model: default_rerank_model(),
            embedding_model: default_embedding_model(),
            top_k: default_top_k(),
            documents_dir: None,
        }
    }
}

/// A tool server launched as a child process speaking JSON-RPC over stdio.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolServerConfig {
    /// Display name (e.g. "filesystem", "fetch")
    pub name: String,

    /// Executable to spawn (e.g. "npx", "uvx")
    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,

    /// Working directory for the server process
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,
}

impl AppConfig {
    /// Load configuration from the default path (~/.toolrelay/config.toml)
    /// and apply environment overrides.
    ///
    /// - `TOOLRELAY_API_KEY` (highest priority), then `OPENAI_API_KEY`
    /// - `TOOLRELAY_BASE_URL`, `TOOLRELAY_MODEL`
    /// - `TOOLRELAY_RERANK_API_KEY`, `TOOLRELAY_RERANK_BASE_URL`
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_env(&Self::config_path())
    }

    /// Like [`AppConfig::load`], but from an explicit file path.
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_env(|key| std::env::var(key).ok());
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

    /// Apply overrides from an environment lookup.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.api_key.is_none() {
            self.api_key = lookup("TOOLRELAY_API_KEY").or_else(|| lookup("OPENAI_API_KEY"));
        }
        if let Some(base_url) = lookup("TOOLRELAY_BASE_URL") {
            self.base_url = base_url;
        }
        if let Some(model) = lookup("TOOLRELAY_MODEL") {
            self.model = model;
        }
        if self.retrieval.api_key.is_none() {
            self.retrieval.api_key = lookup("TOOLRELAY_RERANK_API_KEY");
        }
        if let Some(base_url) = lookup("TOOLRELAY_RERANK_BASE_URL") {
            self.retrieval.base_url = base_url;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".toolrelay")
    }

    /// Default config file location.
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.temperature < 0.0 || self.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.agent.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_iterations must be > 0".into(),
            ));
        }

        if self.retrieval.top_k == 0 {
            return Err(ConfigError::ValidationError(
                "retrieval.top_k must be > 0".into(),
            ));
        }

        if let Some(server) = self.tool_servers.iter().find(|s| s.command.trim().is_empty()) {
            return Err(ConfigError::ValidationError(format!(
                "tool server '{}' has an empty command",
                server.name
            )));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string (for `config init`).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            agent: AgentSettings::default(),
            retrieval: RetrievalConfig::default(),
            tool_servers: vec![],
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
