//! Chat history and rolling summaries

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::config::prompts_builtin;
use crate::conversation::{ChatTurn, Message};
use crate::providers::{CompletionRequest, ModelProvider, ModelReply, ProviderError, ToolPolicy};

use super::memory::{MemoryError, MemoryStore};

#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn append_turn(&self, user_message: &str, assistant_message: &str) -> Result<(), MemoryError>;

    async fn latest_summary(&self) -> Result<Option<String>, MemoryError>;

    /// The configured window of recent turns, oldest first
    async fn recent_history(&self) -> Result<Vec<ChatTurn>, MemoryError>;

    /// Fold the latest `max_pairs` turns into a new summary once a full window
    /// has accumulated
    async fn update_summary(&self, max_pairs: usize) -> Result<(), MemoryError>;
}

/// Writes summaries with the summary model
pub struct Summarizer {
    provider: Arc<dyn ModelProvider>,
    model: String,
}

impl Summarizer {
    pub fn new(provider: Arc<dyn ModelProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    pub async fn summarize(
        &self,
        previous: Option<&str>,
        turns: &[ChatTurn],
        max_characters: usize,
    ) -> Result<String, ProviderError> {
        let transcript = turns
            .iter()
            .map(ChatTurn::as_exchange)
            .collect::<Vec<_>>()
            .join("\n");

        let request = CompletionRequest {
            model: self.model.clone(),
            messages: vec![
                Message::system(format!(
                    "{} Keep it within {} characters.",
                    prompts_builtin::SUMMARY,
                    max_characters
                )),
                Message::user(format!(
                    "Previous summary:\n{}\n\nRecent conversation:\n{}",
                    previous.unwrap_or("(none)"),
                    transcript
                )),
            ],
            tools: Vec::new(),
            policy: ToolPolicy::None,
            temperature: 0.0,
        };

        match self.provider.complete(&request).await? {
            ModelReply::FinalText(text) if !text.trim().is_empty() => Ok(text.trim().to_string()),
            ModelReply::FinalText(_) => Err(ProviderError::InvalidResponse("Empty summary".into())),
            ModelReply::ToolRequest { name, .. } => Err(ProviderError::InvalidResponse(format!(
                "Summarizer asked for tool '{}'",
                name
            ))),
        }
    }
}

/// Deterministic summary used when no model is available
pub fn digest(previous: Option<&str>, turns: &[ChatTurn], max_characters: usize) -> String {
    let mut lines: Vec<String> = previous.map(|p| p.to_string()).into_iter().collect();
    lines.extend(turns.iter().map(ChatTurn::as_exchange));
    let text = lines.join("\n");

    if text.chars().count() <= max_characters {
        return text;
    }

    // Keep the newest part
    let skip = text.chars().count() - max_characters;
    text.chars().skip(skip).collect()
}

impl MemoryStore {
    async fn fetch_recent(&self, limit: usize) -> Result<Vec<ChatTurn>, MemoryError> {
        let rows: Vec<(String, String, String)> = sqlx::query_as(
            r#"
            SELECT user_message, assistant_message, created_at
            FROM chat_history
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        // Reverse to get chronological order
        Ok(rows
            .into_iter()
            .rev()
            .map(|(user_message, assistant_message, created_at)| ChatTurn {
                user_message,
                assistant_message,
                created_at: DateTime::parse_from_rfc3339(&created_at)
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or_else(|_| Utc::now()),
            })
            .collect())
    }
}

#[async_trait]
impl HistoryStore for MemoryStore {
    async fn append_turn(&self, user_message: &str, assistant_message: &str) -> Result<(), MemoryError> {
        sqlx::query(
            r#"
            INSERT INTO chat_history (user_message, assistant_message, created_at)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(user_message)
        .bind(assistant_message)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn latest_summary(&self) -> Result<Option<String>, MemoryError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT summary_text FROM summary ORDER BY id DESC LIMIT 1")
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(text,)| text))
    }

    async fn recent_history(&self) -> Result<Vec<ChatTurn>, MemoryError> {
        self.fetch_recent(self.settings.max_history_pairs).await
    }

    async fn update_summary(&self, max_pairs: usize) -> Result<(), MemoryError> {
        let count = self.count_turns().await?;
        if max_pairs == 0 || count == 0 || count % max_pairs as i64 != 0 {
            return Ok(());
        }

        let turns = self.fetch_recent(max_pairs).await?;
        let previous = self.latest_summary().await?;
        let max_characters = self.settings.max_characters;

        let summary = match &self.summarizer {
            Some(summarizer) => match summarizer
                .summarize(previous.as_deref(), &turns, max_characters)
                .await
            {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(error = %e, "Summary model failed, using digest");
                    digest(previous.as_deref(), &turns, max_characters)
                }
            },
            None => digest(previous.as_deref(), &turns, max_characters),
        };

        sqlx::query("INSERT INTO summary (summary_text, created_at) VALUES (?, ?)")
            .bind(&summary)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?;

        tracing::debug!(turns = count, "Conversation summary updated");
        Ok(())
    }
}
