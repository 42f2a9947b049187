//! Application configuration

pub mod prompts;
pub mod settings;

use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub use prompts::{builtin as prompts_builtin, compose, ToolSection};
pub use settings::{AssistantConfig, LlmConfig};

/// Process settings read from the environment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub openai_api_key: Option<String>,
    pub openai_base_url: Option<String>,
    /// TOML file with the assistant settings
    pub config_path: Option<PathBuf>,
    pub data_dir: PathBuf,
    pub use_mock_llm: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 3000,
            openai_api_key: None,
            openai_base_url: None,
            config_path: None,
            data_dir: PathBuf::from("./data"),
            use_mock_llm: false,
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            host: env::var("HOST").unwrap_or(defaults.host),
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            openai_api_key: env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty()),
            openai_base_url: env::var("OPENAI_BASE_URL").ok().filter(|u| !u.is_empty()),
            config_path: env::var("MEMORI_CONFIG").ok().map(PathBuf::from),
            data_dir: env::var("MEMORI_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            use_mock_llm: env::var("USE_MOCK_LLM")
                .map(|v| v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        })
    }
}
