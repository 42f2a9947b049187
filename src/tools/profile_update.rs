//! `add_user_info_to_database` - merge new details into the stored profile

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;

use crate::core::ProfileStore;

use super::{ToolDefinition, ToolError, ToolHandler, ToolOutcome, ADD_USER_INFO};

pub struct ProfileUpdateTool {
    profiles: Arc<dyn ProfileStore>,
}

impl ProfileUpdateTool {
    pub fn new(profiles: Arc<dyn ProfileStore>) -> Self {
        Self { profiles }
    }

    pub fn definition() -> ToolDefinition {
        ToolDefinition::new(
            ADD_USER_INFO,
            "Update the user's stored profile with new details shared in the conversation. Interests are merged, never replaced.",
        )
        .with_parameters(json!({
            "type": "object",
            "properties": {
                "name": { "type": "string" },
                "last_name": { "type": "string" },
                "age": { "type": "integer" },
                "gender": { "type": "string" },
                "location": { "type": "string" },
                "occupation": { "type": "string" },
                "interests": {
                    "type": "array",
                    "items": { "type": "string" }
                }
            },
            "additionalProperties": false
        }))
    }
}

/// Models sometimes wrap the fields in a single `fields` / `user_info` object
fn unwrap_fields(arguments: &Map<String, Value>) -> &Map<String, Value> {
    if arguments.len() == 1 {
        for key in ["fields", "user_info"] {
            if let Some(Value::Object(inner)) = arguments.get(key) {
                return inner;
            }
        }
    }
    arguments
}

#[async_trait]
impl ToolHandler for ProfileUpdateTool {
    async fn call(&self, arguments: &Map<String, Value>) -> Result<ToolOutcome, ToolError> {
        self.profiles
            .update(unwrap_fields(arguments))
            .await
            .map_err(|e| ToolError::ExecutionFailed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::MemoryStore;

    #[tokio::test]
    async fn test_update_and_merge_interests() {
        let store = Arc::new(MemoryStore::new_in_memory_async().await.unwrap());
        let tool = ProfileUpdateTool::new(store.clone());

        let first = json!({ "interests": ["AI"] });
        let second = json!({ "interests": ["AI", "ML"] });
        assert!(tool.call(first.as_object().unwrap()).await.unwrap().is_success());
        assert!(tool.call(second.as_object().unwrap()).await.unwrap().is_success());

        let profile = store.read().await.unwrap().unwrap();
        assert_eq!(profile.interests_list(), vec!["AI", "ML"]);
    }

    #[tokio::test]
    async fn test_wrapped_fields() {
        let store = Arc::new(MemoryStore::new_in_memory_async().await.unwrap());
        let tool = ProfileUpdateTool::new(store.clone());

        let args = json!({ "user_info": { "occupation": "nurse" } });
        let outcome = tool.call(args.as_object().unwrap()).await.unwrap();
        assert!(outcome.is_success());
        assert!(outcome.message.starts_with("Profile updated:"));

        let profile = store.read().await.unwrap().unwrap();
        assert_eq!(profile.occupation.as_deref(), Some("nurse"));
    }

    #[tokio::test]
    async fn test_invalid_key_is_a_failure_outcome() {
        let store = Arc::new(MemoryStore::new_in_memory_async().await.unwrap());
        let tool = ProfileUpdateTool::new(store);

        let args = json!({ "favourite_color": "green" });
        let outcome = tool.call(args.as_object().unwrap()).await.unwrap();
        assert!(!outcome.is_success());
        assert!(outcome.message.contains("valid key"));
    }
}
