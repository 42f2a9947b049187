//! Tool registry and dispatcher
//!
//! The assistant exposes a fixed table of tools to the model. Each entry pairs
//! a [`ToolDefinition`] (name, description, JSON schema) with a [`ToolHandler`].
//! Nothing is discovered at runtime: the table is built once in
//! [`ToolRegistry::new`] and the model can only ever see those entries.
//!
//! # Tools
//!
//! - `search_vector_db` - semantic search over one memory category
//! - `add_user_info_to_database` - merge fields into the user profile

pub mod memory_search;
pub mod profile_update;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::core::{ProfileStore, SemanticMemory};

pub use memory_search::MemorySearchTool;
pub use profile_update::ProfileUpdateTool;

pub const SEARCH_VECTOR_DB: &str = "search_vector_db";
pub const ADD_USER_INFO: &str = "add_user_info_to_database";

/// Errors raised by a tool handler before it could produce an outcome
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),
}

/// Definition of a tool that the model can call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Unique name of the tool
    pub name: String,

    /// Human-readable description for the model to understand when to use this tool
    pub description: String,

    /// JSON Schema defining the expected parameters
    pub parameters: Value,
}

impl ToolDefinition {
    /// Create a new tool definition
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {},
                "required": []
            }),
        }
    }

    /// Set the parameters schema for this tool
    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = parameters;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Success,
    Failure,
}

impl fmt::Display for ToolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolStatus::Success => f.write_str("Function call successful."),
            ToolStatus::Failure => f.write_str("Function call failed."),
        }
    }
}

/// Normalized result of one tool call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub status: ToolStatus,
    pub message: String,
}

impl ToolOutcome {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: ToolStatus::Success,
            message: message.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            status: ToolStatus::Failure,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ToolStatus::Success
    }
}

/// One tool call requested by the model, with its recorded outcome
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub name: String,
    pub arguments: Map<String, Value>,
    pub outcome: ToolOutcome,
}

impl ToolInvocation {
    pub fn succeeded(&self) -> bool {
        self.outcome.is_success()
    }
}

#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, arguments: &Map<String, Value>) -> Result<ToolOutcome, ToolError>;
}

/// A row of the tool table
pub struct ToolDescriptor {
    pub definition: ToolDefinition,
    pub handler: Arc<dyn ToolHandler>,
}

pub struct ToolRegistry {
    tools: Vec<ToolDescriptor>,
}

impl ToolRegistry {
    /// Build the assistant's tool table
    pub fn new(profiles: Arc<dyn ProfileStore>, memory: Arc<dyn SemanticMemory>) -> Self {
        Self {
            tools: vec![
                ToolDescriptor {
                    definition: MemorySearchTool::definition(),
                    handler: Arc::new(MemorySearchTool::new(memory)),
                },
                ToolDescriptor {
                    definition: ProfileUpdateTool::definition(),
                    handler: Arc::new(ProfileUpdateTool::new(profiles)),
                },
            ],
        }
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition.clone()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.iter().find(|t| t.definition.name == name)
    }

    /// Run a tool by name. Always yields an outcome; unknown names and handler
    /// errors become failures.
    pub async fn dispatch(&self, name: &str, arguments: &Map<String, Value>) -> ToolOutcome {
        let Some(tool) = self.get(name) else {
            tracing::warn!(tool = name, "Model requested an unknown tool");
            return ToolOutcome::failure(format!("Unknown function '{}'", name));
        };

        let outcome = match tool.handler.call(arguments).await {
            Ok(outcome) => outcome,
            Err(e) => ToolOutcome::failure(format!("Error: {}", e)),
        };

        tracing::debug!(tool = name, status = ?outcome.status, "Tool dispatched");
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::MemoryStore;
    use serde_json::json;

    async fn registry() -> (ToolRegistry, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new_in_memory_async().await.unwrap());
        (ToolRegistry::new(store.clone(), store.clone()), store)
    }

    #[test]
    fn test_tool_definition() {
        let tool = ToolDefinition::new("my_tool", "Does something");
        assert_eq!(tool.name, "my_tool");
        assert_eq!(tool.parameters["type"], "object");
    }

    #[test]
    fn test_tool_outcome() {
        assert!(ToolOutcome::success("done").is_success());
        assert!(!ToolOutcome::failure("nope").is_success());
        assert_eq!(ToolStatus::Success.to_string(), "Function call successful.");
    }

    #[tokio::test]
    async fn test_registry_has_exactly_two_tools() {
        let (registry, _) = registry().await;
        let names: Vec<String> = registry.definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec![SEARCH_VECTOR_DB, ADD_USER_INFO]);
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let (registry, _) = registry().await;
        let outcome = registry.dispatch("read_file", &Map::new()).await;
        assert_eq!(outcome, ToolOutcome::failure("Unknown function 'read_file'"));
    }

    #[tokio::test]
    async fn test_handler_error_becomes_failure() {
        let (registry, _) = registry().await;
        // query is required
        let outcome = registry.dispatch(SEARCH_VECTOR_DB, &Map::new()).await;
        assert!(!outcome.is_success());
        assert!(outcome.message.contains("Invalid parameters"));
    }

    #[tokio::test]
    async fn test_dispatch_profile_update() {
        let (registry, store) = registry().await;
        let args = json!({ "location": "Lisbon" });
        let outcome = registry
            .dispatch(ADD_USER_INFO, args.as_object().unwrap())
            .await;
        assert!(outcome.is_success());

        let profile = store.read().await.unwrap().unwrap();
        assert_eq!(profile.location.as_deref(), Some("Lisbon"));
    }
}
