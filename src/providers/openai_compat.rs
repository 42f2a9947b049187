//! OpenAI-compatible provider
//!
//! Works with any API that implements the OpenAI chat completions format:
//! - OpenAI (api.openai.com)
//! - vLLM, LM Studio, LocalAI, Ollama's `/v1` endpoint
//!
//! # Configuration
//!
//! ```toml
//! [llm]
//! provider = "openai"
//! base_url = "https://api.openai.com/v1"  # or a local server
//! api_key_env = "OPENAI_API_KEY"
//! chat_model = "gpt-4o"
//! fallback_model = "gpt-4o-mini"
//! ```

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::conversation::Message;
use crate::tools::ToolDefinition;

use super::{CompletionRequest, ModelProvider, ModelReply, ProviderError};

/// OpenAI-compatible chat message
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

impl From<&Message> for ChatMessage {
    fn from(msg: &Message) -> Self {
        Self {
            role: msg.role.as_str().to_string(),
            content: msg.content.clone(),
        }
    }
}

/// Tool definition for function calling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDef {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: FunctionDef,
}

/// Function definition for tool calling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDef {
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

impl From<&ToolDefinition> for ToolDef {
    fn from(tool: &ToolDefinition) -> Self {
        Self {
            tool_type: "function".to_string(),
            function: FunctionDef {
                name: tool.name.clone(),
                description: tool.description.clone(),
                parameters: Some(tool.parameters.clone()),
            },
        }
    }
}

/// Chat completion request
#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ToolDef>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<String>,
}

impl From<&CompletionRequest> for ChatCompletionRequest {
    fn from(request: &CompletionRequest) -> Self {
        let offered = request.offered_tools();
        let (tools, tool_choice) = if offered.is_empty() {
            (None, None)
        } else {
            (
                Some(offered.iter().map(ToolDef::from).collect()),
                Some("auto".to_string()),
            )
        };

        Self {
            model: request.model.clone(),
            messages: request.messages.iter().map(ChatMessage::from).collect(),
            temperature: Some(request.temperature),
            tools,
            tool_choice,
        }
    }
}

/// Chat completion response
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCallResponse>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallResponse {
    pub id: String,
    pub function: FunctionCallResponse,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FunctionCallResponse {
    pub name: String,
    pub arguments: String, // JSON string of arguments
}

/// Error response from API
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
    #[serde(rename = "type", default)]
    error_type: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

impl ApiError {
    fn is_quota(&self) -> bool {
        let quota = |s: &Option<String>| {
            s.as_deref()
                .is_some_and(|v| v == "insufficient_quota" || v == "rate_limit_exceeded")
        };
        quota(&self.code) || quota(&self.error_type)
    }
}

/// OpenAI-compatible provider configuration
#[derive(Debug, Clone)]
pub struct OpenAICompatConfig {
    /// Base URL for the API (e.g., https://api.openai.com/v1)
    pub base_url: String,
    /// API key (optional for local servers)
    pub api_key: Option<String>,
    /// Optional organization ID (OpenAI)
    pub organization: Option<String>,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for OpenAICompatConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            organization: None,
            timeout_secs: 120,
        }
    }
}

impl OpenAICompatConfig {
    /// Create config for OpenAI
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            ..Self::default()
        }
    }

    /// Create config for a local server (vLLM, LM Studio, etc.)
    pub fn local(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            organization: None,
            timeout_secs: 300, // Local inference can be slower
        }
    }
}

/// OpenAI-compatible API provider
pub struct OpenAICompatProvider {
    config: OpenAICompatConfig,
    client: Client,
}

impl OpenAICompatProvider {
    /// Create a new provider with the given configuration
    pub fn new(config: OpenAICompatConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }

    fn classify_failure(status: StatusCode, body: &str) -> ProviderError {
        let api_error = serde_json::from_str::<ErrorResponse>(body).ok().map(|r| r.error);
        let message = api_error
            .as_ref()
            .map(|e| e.message.clone())
            .unwrap_or_else(|| body.to_string());

        if status == StatusCode::TOO_MANY_REQUESTS || api_error.as_ref().is_some_and(ApiError::is_quota) {
            return ProviderError::RateLimited(message);
        }

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return ProviderError::Unauthorized(message);
        }

        ProviderError::Api {
            status: status.as_u16(),
            message,
        }
    }

    fn parse_reply(body: &str) -> Result<ModelReply, ProviderError> {
        let completion: ChatCompletionResponse = serde_json::from_str(body).map_err(|e| {
            ProviderError::InvalidResponse(format!("Failed to parse response: {} - Body: {}", e, body))
        })?;

        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::InvalidResponse("No choices in response".to_string()))?;

        // Only the first tool call is honoured; one dispatch per model reply
        if let Some(call) = choice.message.tool_calls.and_then(|calls| calls.into_iter().next()) {
            let raw = if call.function.arguments.trim().is_empty() {
                "{}"
            } else {
                call.function.arguments.as_str()
            };
            let arguments: Map<String, Value> = serde_json::from_str(raw).map_err(|e| {
                ProviderError::InvalidResponse(format!(
                    "Tool call {} has malformed arguments: {}",
                    call.id, e
                ))
            })?;

            return Ok(ModelReply::ToolRequest {
                name: call.function.name,
                arguments,
            });
        }

        Ok(ModelReply::FinalText(choice.message.content.unwrap_or_default()))
    }
}

#[async_trait]
impl ModelProvider for OpenAICompatProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<ModelReply, ProviderError> {
        let url = format!("{}/chat/completions", self.config.base_url);
        let body = ChatCompletionRequest::from(request);

        let mut req_builder = self.client.post(&url);

        // Add authorization if API key is provided
        if let Some(ref api_key) = self.config.api_key {
            req_builder = req_builder.header("Authorization", format!("Bearer {}", api_key));
        }

        // Add organization header if provided (OpenAI specific)
        if let Some(ref org) = self.config.organization {
            req_builder = req_builder.header("OpenAI-Organization", org);
        }

        let response = req_builder.json(&body).send().await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(Self::classify_failure(status, &text));
        }

        Self::parse_reply(&text)
    }
}
