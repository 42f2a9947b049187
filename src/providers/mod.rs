//! AI provider integrations
//!
//! A provider turns one [`CompletionRequest`] into exactly one [`ModelReply`].
//! Retry and fallback policy lives in the gateway, not here.

pub mod openai_compat;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::config::{Config, LlmConfig};
use crate::conversation::Message;
use crate::tools::ToolDefinition;

pub use openai_compat::{OpenAICompatConfig, OpenAICompatProvider};

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("Authentication failed: {0}")]
    Unauthorized(String),

    #[error("Request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Provider panicked: {0}")]
    Panicked(String),
}

/// Coarse classification the gateway uses to pick a recovery path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    RateLimit,
    Auth,
    Connection,
    Api,
    InvalidResponse,
}

impl ProviderError {
    pub fn kind(&self) -> ProviderErrorKind {
        match self {
            ProviderError::RateLimited(_) => ProviderErrorKind::RateLimit,
            ProviderError::Unauthorized(_) | ProviderError::NotConfigured(_) => {
                ProviderErrorKind::Auth
            }
            ProviderError::RequestFailed(e) if e.is_decode() => ProviderErrorKind::InvalidResponse,
            ProviderError::RequestFailed(_) => ProviderErrorKind::Connection,
            ProviderError::Api { .. } | ProviderError::UnknownProvider(_) => ProviderErrorKind::Api,
            ProviderError::InvalidResponse(_) | ProviderError::Panicked(_) => {
                ProviderErrorKind::InvalidResponse
            }
        }
    }
}

/// Whether the model may answer with a tool request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolPolicy {
    Auto,
    None,
}

/// What the model answered. Never both text and a tool request.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelReply {
    FinalText(String),
    ToolRequest {
        name: String,
        arguments: Map<String, Value>,
    },
}

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDefinition>,
    pub policy: ToolPolicy,
    pub temperature: f32,
}

impl CompletionRequest {
    /// Same request against a different model
    pub fn with_model(&self, model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..self.clone()
        }
    }

    /// Tools actually offered to the model under the current policy
    pub fn offered_tools(&self) -> &[ToolDefinition] {
        match self.policy {
            ToolPolicy::Auto => &self.tools,
            ToolPolicy::None => &[],
        }
    }
}

#[async_trait]
pub trait ModelProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, request: &CompletionRequest) -> Result<ModelReply, ProviderError>;
}

/// Build the configured provider
pub fn from_config(
    config: &Config,
    llm: &LlmConfig,
) -> Result<Arc<dyn ModelProvider>, ProviderError> {
    match llm.provider.to_lowercase().as_str() {
        "openai" => {
            let api_key = llm
                .api_key_env
                .as_deref()
                .and_then(|var| std::env::var(var).ok())
                .or_else(|| config.openai_api_key.clone());

            let base_url = llm
                .base_url
                .clone()
                .or_else(|| config.openai_base_url.clone());

            let provider_config = match base_url {
                Some(url) => OpenAICompatConfig {
                    api_key,
                    timeout_secs: llm.timeout_secs,
                    ..OpenAICompatConfig::local(url)
                },
                None => {
                    let key = api_key.ok_or_else(|| {
                        ProviderError::NotConfigured("OPENAI_API_KEY is not set".to_string())
                    })?;
                    OpenAICompatConfig {
                        timeout_secs: llm.timeout_secs,
                        ..OpenAICompatConfig::openai(key)
                    }
                }
            };

            Ok(Arc::new(OpenAICompatProvider::new(provider_config)?))
        }
        other => Err(ProviderError::UnknownProvider(other.to_string())),
    }
}
