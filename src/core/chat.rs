//! Chat engine with turn orchestration
//!
//! The ChatEngine answers one user message at a time:
//! 1. Stores any personal facts it recognizes in the message
//! 2. Answers questions about the user straight from the profile when it can
//! 3. Otherwise runs the model with the two assistant tools, folding each tool
//!    outcome back into the system prompt, within the tool-call budget
//! 4. Persists the exchange and returns the reply
//!
//! [`ChatEngine::chat`] never fails: model outages become an apology and any
//! other fault becomes an `Error: ...` string.

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::{compose, AssistantConfig, ToolSection};
use crate::conversation::{ChatTurn, Message};
use crate::providers::{ModelReply, ToolPolicy};
use crate::tools::{ToolInvocation, ToolRegistry, ADD_USER_INFO};

use super::facts::FactRecognizer;
use super::gateway::{panic_message, ModelGateway};
use super::history::HistoryStore;
use super::memory::{MemoryCapabilities, MemoryCategory, MemoryError, MemoryStore, SemanticMemory};
use super::profile::{Profile, ProfileStore};
use super::recall::RecallShortcut;

pub const EMPTY_REPLY_WARNING: &str =
    "Warning: No valid assistant response from the chatbot. Please try again.";

/// Errors from the chat engine
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    #[error("Turn panicked: {0}")]
    Panicked(String),
}

/// Turn loop settings
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub max_function_calls: usize,
    pub max_history_pairs: usize,
    /// Answer with a canned echo instead of calling the model
    pub use_mock: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_function_calls: 3,
            max_history_pairs: 5,
            use_mock: false,
        }
    }
}

impl From<&AssistantConfig> for EngineSettings {
    fn from(config: &AssistantConfig) -> Self {
        Self {
            max_function_calls: config.agent.max_function_calls,
            max_history_pairs: config.chat_history.max_history_pairs,
            use_mock: config.agent.use_mock_llm,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TurnState {
    Thinking,
    Finished,
}

/// Working state of one turn
struct Turn {
    function_call_count: usize,
    max_function_calls: usize,
    state: TurnState,
    last: Option<ToolInvocation>,
}

impl Turn {
    fn new(max_function_calls: usize) -> Self {
        Self {
            function_call_count: 0,
            max_function_calls,
            state: TurnState::Thinking,
            last: None,
        }
    }

    fn budget_spent(&self) -> bool {
        self.function_call_count >= self.max_function_calls
    }

    /// Tool requests are only honoured while thinking and within budget
    fn may_call_tool(&self) -> bool {
        self.state == TurnState::Thinking && !self.budget_spent()
    }

    /// A successful result is shown even when it used the last budget slot
    fn tool_section(&self) -> ToolSection<'_> {
        match self.last.as_ref() {
            Some(last) if self.state == TurnState::Finished => ToolSection::Success(last),
            _ if self.budget_spent() => ToolSection::BudgetExhausted,
            last => ToolSection::from_last(last),
        }
    }
}

fn apology(message: &str) -> String {
    format!(
        "I'm having trouble reaching the language model right now. \
         Based on what you said, here's a brief response for now:\n\n\
         - You said: “{}”. I'll keep this in mind for continuity.",
        message
    )
}

fn mock_reply(message: &str) -> String {
    format!("(mock) I heard: {}. I'll remember this context.", message)
}

/// The core chat engine
pub struct ChatEngine {
    settings: EngineSettings,
    gateway: ModelGateway,
    tools: Arc<ToolRegistry>,
    facts: FactRecognizer,
    recall: RecallShortcut,
    history: Arc<dyn HistoryStore>,
    profiles: Arc<dyn ProfileStore>,
    memory: Arc<dyn SemanticMemory>,
    capabilities: MemoryCapabilities,
}

impl ChatEngine {
    /// Create a new chat engine
    pub fn new(
        settings: EngineSettings,
        gateway: ModelGateway,
        history: Arc<dyn HistoryStore>,
        profiles: Arc<dyn ProfileStore>,
        memory: Arc<dyn SemanticMemory>,
    ) -> Self {
        let tools = Arc::new(ToolRegistry::new(profiles.clone(), memory.clone()));
        let capabilities = memory.capabilities();

        Self {
            settings,
            gateway,
            facts: FactRecognizer::new(tools.clone(), memory.clone()),
            recall: RecallShortcut::new(memory.clone()),
            tools,
            history,
            profiles,
            memory,
            capabilities,
        }
    }

    /// Engine backed by a single SQLite store
    pub fn with_store(settings: EngineSettings, gateway: ModelGateway, store: Arc<MemoryStore>) -> Self {
        Self::new(settings, gateway, store.clone(), store.clone(), store)
    }

    /// Answer one user message. Never fails.
    pub async fn chat(&self, message: &str) -> String {
        match AssertUnwindSafe(self.run_turn(message)).catch_unwind().await {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                error!(error = %e, "Turn failed");
                format!("Error: {}", e)
            }
            Err(payload) => {
                let e = ChatError::Panicked(panic_message(payload));
                error!(error = %e, "Turn panicked");
                format!("Error: {}", e)
            }
        }
    }

    async fn run_turn(&self, message: &str) -> Result<String, ChatError> {
        if self.settings.use_mock {
            let reply = mock_reply(message);
            self.persist(message, &reply).await;
            return Ok(reply);
        }

        let facts = self.facts.extract(message);
        let stored = if facts.is_empty() {
            0
        } else {
            debug!(count = facts.len(), "Recognized personal facts");
            self.facts.record(&facts).await
        };

        let mut profile = self.profiles.read().await?;

        if let Some(answer) = self
            .recall
            .try_recall(message, profile.as_ref(), stored > 0)
            .await
        {
            info!("Answered from recall");
            self.persist(message, &answer).await;
            return Ok(answer);
        }

        let summary = self.history.latest_summary().await.unwrap_or_else(|e| {
            warn!(error = %e, "Could not load summary");
            None
        });
        let history = self.history.recent_history().await.unwrap_or_else(|e| {
            warn!(error = %e, "Could not load chat history");
            Vec::new()
        });

        let tools = self.tools.definitions();
        let mut turn = Turn::new(self.settings.max_function_calls);

        loop {
            if let Some(last) = turn.last.as_ref().filter(|last| last.succeeded()) {
                turn.state = TurnState::Finished;
                if last.name == ADD_USER_INFO {
                    profile = self.refresh_profile(profile).await;
                }
            }

            let prompt = compose(
                profile.as_ref(),
                summary.as_deref(),
                &history,
                &turn.tool_section(),
            );
            let messages = vec![Message::system(prompt), Message::user(message)];

            let reply = match self
                .gateway
                .invoke(messages.clone(), &tools, ToolPolicy::Auto)
                .await
            {
                Ok(reply) => reply,
                Err(e) => {
                    warn!(error = %e, "Model unavailable, answering with apology");
                    return Ok(self.apologize(message).await);
                }
            };

            match reply {
                ModelReply::FinalText(text) => return Ok(self.finish(message, text).await),
                ModelReply::ToolRequest { name, .. } if !turn.may_call_tool() => {
                    debug!(
                        tool = %name,
                        calls = turn.function_call_count,
                        "Tool request refused, forcing a plain completion"
                    );
                    return Ok(self.force_completion(message, messages).await);
                }
                ModelReply::ToolRequest { name, arguments } => {
                    turn.function_call_count += 1;
                    info!(tool = %name, call = turn.function_call_count, "Dispatching tool call");

                    let outcome = self.tools.dispatch(&name, &arguments).await;
                    debug!(tool = %name, status = %outcome.status, "Tool call finished");
                    turn.last = Some(ToolInvocation {
                        name,
                        arguments,
                        outcome,
                    });
                }
            }
        }
    }

    async fn refresh_profile(&self, current: Option<Profile>) -> Option<Profile> {
        match self.profiles.read().await {
            Ok(profile) => profile,
            Err(e) => {
                warn!(error = %e, "Could not refresh profile");
                current
            }
        }
    }

    /// Tool-free completion with the same prompt
    async fn force_completion(&self, message: &str, messages: Vec<Message>) -> String {
        match self.gateway.invoke(messages, &[], ToolPolicy::None).await {
            Ok(ModelReply::FinalText(text)) => self.finish(message, text).await,
            Ok(ModelReply::ToolRequest { name, .. }) => {
                warn!(tool = %name, "Model asked for a tool on a tool-free call");
                EMPTY_REPLY_WARNING.to_string()
            }
            Err(e) => {
                warn!(error = %e, "Forced completion failed");
                self.apologize(message).await
            }
        }
    }

    async fn finish(&self, message: &str, text: String) -> String {
        if text.trim().is_empty() {
            warn!("Model returned an empty reply");
            return EMPTY_REPLY_WARNING.to_string();
        }
        self.persist(message, &text).await;
        text
    }

    async fn apologize(&self, message: &str) -> String {
        let reply = apology(message);
        self.persist(message, &reply).await;
        reply
    }

    /// Best effort; a failed write is logged and the turn goes on
    async fn persist(&self, message: &str, answer: &str) {
        match self.history.append_turn(message, answer).await {
            Ok(()) => {
                if let Err(e) = self
                    .history
                    .update_summary(self.settings.max_history_pairs)
                    .await
                {
                    warn!(error = %e, "Could not update summary");
                }
            }
            Err(e) => warn!(error = %e, "Could not save chat history"),
        }

        if self.capabilities.append {
            let exchange = ChatTurn::new(message, answer).as_exchange();
            if let Err(e) = self.memory.add(MemoryCategory::Cognitive, &exchange).await {
                warn!(error = %e, "Could not save exchange to memory");
            }
        }
    }
}
