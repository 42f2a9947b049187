//! Assistant configuration loaded from TOML files
//!
//! Every section is optional and falls back to defaults:
//!
//! ```toml
//! [llm]
//! chat_model = "gpt-4o"
//! fallback_model = "gpt-4o-mini"
//!
//! [chat_history]
//! max_history_pairs = 5
//!
//! [agent]
//! max_function_calls = 3
//!
//! [memory]
//! db_path = "memori.db"
//! k = 3
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Root assistant configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssistantConfig {
    /// Model provider settings
    #[serde(default)]
    pub llm: LlmConfig,

    /// History window and summary settings
    #[serde(default)]
    pub chat_history: ChatHistoryConfig,

    /// Turn loop settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// Storage settings
    #[serde(default)]
    pub memory: MemoryConfig,
}

impl AssistantConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        content.parse()
    }

    /// Load from `path` when it exists, defaults otherwise
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) if path.exists() => Self::from_file(path)?,
            Some(path) => {
                tracing::warn!(path = %path.display(), "Config file not found, using defaults");
                Self::default()
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agent.max_function_calls == 0 {
            return Err(ConfigError::Validation(
                "agent.max_function_calls must be at least 1".into(),
            ));
        }
        if self.chat_history.max_history_pairs == 0 {
            return Err(ConfigError::Validation(
                "chat_history.max_history_pairs must be at least 1".into(),
            ));
        }
        if self.memory.k == 0 {
            return Err(ConfigError::Validation("memory.k must be at least 1".into()));
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(ConfigError::Validation(format!(
                "llm.temperature must be between 0 and 2, got {}",
                self.llm.temperature
            )));
        }
        Ok(())
    }
}

impl FromStr for AssistantConfig {
    type Err = ConfigError;

    fn from_str(content: &str) -> Result<Self, Self::Err> {
        let config: AssistantConfig = toml::from_str(content)?;
        Ok(config)
    }
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider name; only "openai" (and compatible servers) is supported
    #[serde(default = "default_provider")]
    pub provider: String,

    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    /// Used once per call when the chat model is rate limited
    #[serde(default = "default_fallback_model")]
    pub fallback_model: String,

    #[serde(default = "default_summary_model")]
    pub summary_model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// API key environment variable name
    #[serde(default)]
    pub api_key_env: Option<String>,

    /// Custom API endpoint
    #[serde(default)]
    pub base_url: Option<String>,

    /// HTTP request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_chat_model() -> String {
    "gpt-4o".to_string()
}

fn default_fallback_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_summary_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_timeout_secs() -> u64 {
    60
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            chat_model: default_chat_model(),
            fallback_model: default_fallback_model(),
            summary_model: default_summary_model(),
            temperature: default_temperature(),
            api_key_env: None,
            base_url: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatHistoryConfig {
    /// Turns shown to the model, and the summary window
    #[serde(default = "default_max_history_pairs")]
    pub max_history_pairs: usize,

    /// Upper bound for the fallback digest summary
    #[serde(default = "default_max_characters")]
    pub max_characters: usize,
}

fn default_max_history_pairs() -> usize {
    5
}

fn default_max_characters() -> usize {
    1000
}

impl Default for ChatHistoryConfig {
    fn default() -> Self {
        Self {
            max_history_pairs: default_max_history_pairs(),
            max_characters: default_max_characters(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_max_function_calls")]
    pub max_function_calls: usize,

    /// Answer with a canned echo instead of calling the model
    #[serde(default)]
    pub use_mock_llm: bool,
}

fn default_max_function_calls() -> usize {
    3
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_function_calls: default_max_function_calls(),
            use_mock_llm: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// SQLite file, relative to the data directory
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Number of memories returned per search
    #[serde(default = "default_k")]
    pub k: usize,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("memori.db")
}

fn default_k() -> usize {
    3
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            k: default_k(),
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}
