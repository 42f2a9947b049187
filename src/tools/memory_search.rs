//! `search_vector_db` - semantic search over the assistant's memory

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;

use crate::core::{MemoryCategory, SemanticMemory};

use super::{ToolDefinition, ToolError, ToolHandler, ToolOutcome, SEARCH_VECTOR_DB};

/// Longest snippet shown to the model per memory
const SNIPPET_CHARS: usize = 280;

pub struct MemorySearchTool {
    memory: Arc<dyn SemanticMemory>,
    enabled: bool,
}

impl MemorySearchTool {
    pub fn new(memory: Arc<dyn SemanticMemory>) -> Self {
        let enabled = memory.capabilities().search;
        Self { memory, enabled }
    }

    pub fn definition() -> ToolDefinition {
        ToolDefinition::new(
            SEARCH_VECTOR_DB,
            "Retrieve relevant user information or prior context through semantic search over stored memories.",
        )
        .with_parameters(json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "What to look for"
                },
                "category": {
                    "type": "string",
                    "enum": MemoryCategory::ALL.iter().map(|c| c.as_str()).collect::<Vec<_>>(),
                    "description": "Memory collection to search (default: cognitive_memories)"
                }
            },
            "required": ["query"]
        }))
    }
}

#[async_trait]
impl ToolHandler for MemorySearchTool {
    async fn call(&self, arguments: &Map<String, Value>) -> Result<ToolOutcome, ToolError> {
        let query = arguments
            .get("query")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .ok_or_else(|| ToolError::InvalidParameters("'query' must be a non-empty string".into()))?;

        let category = match arguments.get("category").and_then(Value::as_str) {
            Some(raw) => match raw.parse::<MemoryCategory>() {
                Ok(category) => category,
                Err(e) => return Ok(ToolOutcome::failure(e.to_string())),
            },
            None => MemoryCategory::Cognitive,
        };

        if !self.enabled {
            return Ok(ToolOutcome::failure("Memory search is not available."));
        }

        match self.memory.search(category, query).await {
            Ok(hits) if hits.is_empty() => Ok(ToolOutcome::failure(format!(
                "No relevant memories found for: {}",
                query
            ))),
            Ok(hits) => Ok(ToolOutcome::success(format_hits(query, category, &hits))),
            Err(e) => Err(ToolError::ExecutionFailed(e.to_string())),
        }
    }
}

fn format_hits(query: &str, category: MemoryCategory, hits: &[String]) -> String {
    let mut out = format!(
        "Top-{} memories for '{}' in '{}':",
        hits.len(),
        query,
        category.as_str()
    );
    for hit in hits {
        out.push_str("\n- ");
        out.extend(hit.chars().take(SNIPPET_CHARS));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::MemoryStore;

    async fn tool_with(entries: &[(MemoryCategory, &str)]) -> MemorySearchTool {
        let store = Arc::new(MemoryStore::new_in_memory_async().await.unwrap());
        for (category, text) in entries {
            store.add(*category, text).await.unwrap();
        }
        MemorySearchTool::new(store)
    }

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_search_hit() {
        let tool = tool_with(&[
            (MemoryCategory::PersonalFact, "User enjoys rock climbing on weekends"),
            (MemoryCategory::PersonalFact, "User is allergic to peanuts"),
        ])
        .await;

        let outcome = tool
            .call(&args(json!({ "query": "climbing hobby", "category": "personal_facts" })))
            .await
            .unwrap();

        assert!(outcome.is_success());
        assert!(outcome.message.starts_with("Top-1 memories for 'climbing hobby' in 'personal_facts':"));
        assert!(outcome.message.contains("rock climbing"));
    }

    #[tokio::test]
    async fn test_search_is_scoped_to_category() {
        let tool = tool_with(&[(MemoryCategory::Identity, "User's name is Dana.")]).await;

        let outcome = tool
            .call(&args(json!({ "query": "name", "category": "cognitive_memories" })))
            .await
            .unwrap();

        assert!(!outcome.is_success());
        assert_eq!(outcome.message, "No relevant memories found for: name");
    }

    #[tokio::test]
    async fn test_invalid_category() {
        let tool = tool_with(&[]).await;
        let outcome = tool
            .call(&args(json!({ "query": "x", "category": "dreams" })))
            .await
            .unwrap();
        assert_eq!(outcome, ToolOutcome::failure("Invalid memory category: dreams"));
    }

    #[tokio::test]
    async fn test_missing_query() {
        let tool = tool_with(&[]).await;
        let result = tool.call(&args(json!({ "query": "   " }))).await;
        assert!(matches!(result, Err(ToolError::InvalidParameters(_))));
    }

    #[test]
    fn test_snippets_are_capped() {
        let long = "a".repeat(1000);
        let text = format_hits("q", MemoryCategory::Cognitive, &[long]);
        let line = text.lines().nth(1).unwrap();
        assert_eq!(line.len(), 2 + SNIPPET_CHARS);
    }
}
