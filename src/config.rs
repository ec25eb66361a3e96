//! Configuration management for qbatch.
//!
//! Configuration is loaded from `~/.config/qbatch/config.toml` (or a path
//! given on the command line). Every section is optional; missing values fall
//! back to defaults. The API credential is resolved once, here, and handed to
//! the completer explicitly.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Placeholder substituted with the user's question in the prompt template.
pub const QUESTION_PLACEHOLDER: &str = "{question}";

/// Environment variables consulted for the credential, highest precedence first.
pub const API_KEY_VARS: [&str; 2] = ["GROQ_API_KEY", "OPENAI_API_KEY"];

/// Main configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub terminal: TerminalConfig,
}

/// Upstream completion endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionConfig {
    /// API root; `/chat/completions` is appended.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Model used for batch questions.
    #[serde(default = "default_model")]
    pub model: String,
    /// Upper bound on generated tokens per answer.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// API key (prefer GROQ_API_KEY / OPENAI_API_KEY env vars).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
            api_key: None,
        }
    }
}

impl CompletionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Batch dispatch settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Template wrapped around every question. Must contain `{question}`.
    #[serde(default = "default_prompt_template")]
    pub prompt_template: String,
    /// Ceiling on simultaneous upstream calls. Unset means one per question.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<usize>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            prompt_template: default_prompt_template(),
            max_concurrency: None,
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Interactive terminal settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerminalConfig {
    /// Model for `chat` and `terminal` commands.
    #[serde(default = "default_terminal_model")]
    pub model: String,
    /// Number of `run` outputs kept as context.
    #[serde(default = "default_history_len")]
    pub history_len: usize,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            model: default_terminal_model(),
            history_len: default_history_len(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.groq.com/openai/v1".to_string()
}

fn default_model() -> String {
    "llama3-70b-8192".to_string()
}

fn default_terminal_model() -> String {
    "llama3-8b-8192".to_string()
}

fn default_max_tokens() -> u32 {
    2048
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_prompt_template() -> String {
    "Answer the following question clearly and concisely: {question}".to_string()
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_history_len() -> usize {
    3
}

impl Config {
    /// Get the config directory path.
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|p| p.join("qbatch"))
            .ok_or_else(|| ConfigError::Invalid("could not determine config directory".into()))
    }

    /// Get the default config file path.
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from `path` (or the default location), using
    /// defaults if the file does not exist, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };
        let mut config = Self::load_file(&path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    fn load_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&contents, path)
    }

    fn from_toml(contents: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply environment overrides. Only `PORT` is read here; credentials go
    /// through [`Config::resolve_api_key`].
    fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(port) = env("PORT").filter(|p| !p.trim().is_empty()) {
            self.server.port = port
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("PORT is not a valid port: {}", port)))?;
        }
        Ok(())
    }

    /// Reject configurations that could only fail later.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.dispatch.prompt_template.contains(QUESTION_PLACEHOLDER) {
            return Err(ConfigError::Invalid(format!(
                "dispatch.prompt_template must contain {}",
                QUESTION_PLACEHOLDER
            )));
        }
        if self.dispatch.max_concurrency == Some(0) {
            return Err(ConfigError::Invalid(
                "dispatch.max_concurrency must be at least 1".into(),
            ));
        }
        if self.completion.max_tokens == 0 {
            return Err(ConfigError::Invalid(
                "completion.max_tokens must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Resolve the API credential from the process environment, then the
    /// config file. Missing credential is fatal.
    pub fn resolve_api_key(&self) -> Result<String, ConfigError> {
        self.resolve_api_key_with(|key| std::env::var(key).ok())
    }

    fn resolve_api_key_with(
        &self,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<String, ConfigError> {
        API_KEY_VARS
            .iter()
            .filter_map(|var| env(var))
            .chain(self.completion.api_key.clone())
            .map(|key| key.trim().to_string())
            .find(|key| !key.is_empty())
            .ok_or(ConfigError::MissingApiKey)
    }

    /// Save configuration to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        use anyhow::Context;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }
}
