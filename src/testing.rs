//! Test doubles shared by the unit tests

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::conversation::ChatTurn;
use crate::core::{
    HistoryStore, MemoryCapabilities, MemoryCategory, MemoryError, Profile, ProfileStore,
    SemanticMemory,
};
use crate::providers::{CompletionRequest, ModelProvider, ModelReply, ProviderError, ToolPolicy};
use crate::tools::ToolOutcome;

/// Plays back canned replies in order and records every request
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Result<ModelReply, ProviderError>>>,
    repeat: Option<ModelReply>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedProvider {
    pub fn new(script: Vec<Result<ModelReply, ProviderError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            repeat: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answers every call with the same reply
    pub fn always(reply: ModelReply) -> Self {
        Self {
            repeat: Some(reply),
            ..Self::new(Vec::new())
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn models(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.model.clone())
            .collect()
    }

    pub fn policies(&self) -> Vec<ToolPolicy> {
        self.requests.lock().unwrap().iter().map(|r| r.policy).collect()
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<ModelReply, ProviderError> {
        self.requests.lock().unwrap().push(request.clone());

        if let Some(next) = self.script.lock().unwrap().pop_front() {
            return next;
        }

        match &self.repeat {
            Some(reply) => Ok(reply.clone()),
            None => Err(ProviderError::InvalidResponse("script exhausted".into())),
        }
    }
}

pub fn text(content: &str) -> Result<ModelReply, ProviderError> {
    Ok(ModelReply::FinalText(content.to_string()))
}

pub fn tool_call(name: &str, arguments: Value) -> ModelReply {
    ModelReply::ToolRequest {
        name: name.to_string(),
        arguments: arguments.as_object().cloned().unwrap_or_else(Map::new),
    }
}

pub fn rate_limited() -> Result<ModelReply, ProviderError> {
    Err(ProviderError::RateLimited("quota exceeded".into()))
}

/// Panics on every call
#[derive(Default)]
pub struct PanickingProvider {
    calls: AtomicUsize,
}

impl PanickingProvider {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelProvider for PanickingProvider {
    fn name(&self) -> &str {
        "panicking"
    }

    async fn complete(&self, _request: &CompletionRequest) -> Result<ModelReply, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        panic!("provider exploded");
    }
}

fn write_failed() -> MemoryError {
    MemoryError::Database(sqlx::Error::PoolClosed)
}

/// Reads come back empty and every write fails
#[derive(Default)]
pub struct FailingStore {
    writes: AtomicUsize,
}

impl FailingStore {
    /// Attempted writes across history, profile and memory
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn fail(&self) -> MemoryError {
        self.writes.fetch_add(1, Ordering::SeqCst);
        write_failed()
    }
}

#[async_trait]
impl HistoryStore for FailingStore {
    async fn append_turn(&self, _user_message: &str, _assistant_message: &str) -> Result<(), MemoryError> {
        Err(self.fail())
    }

    async fn latest_summary(&self) -> Result<Option<String>, MemoryError> {
        Ok(None)
    }

    async fn recent_history(&self) -> Result<Vec<ChatTurn>, MemoryError> {
        Ok(Vec::new())
    }

    async fn update_summary(&self, _max_pairs: usize) -> Result<(), MemoryError> {
        Err(self.fail())
    }
}

#[async_trait]
impl ProfileStore for FailingStore {
    async fn read(&self) -> Result<Option<Profile>, MemoryError> {
        Ok(None)
    }

    async fn update(&self, _fields: &Map<String, Value>) -> Result<ToolOutcome, MemoryError> {
        Err(self.fail())
    }
}

#[async_trait]
impl SemanticMemory for FailingStore {
    fn capabilities(&self) -> MemoryCapabilities {
        MemoryCapabilities::FULL
    }

    async fn add(&self, _category: MemoryCategory, _text: &str) -> Result<(), MemoryError> {
        Err(self.fail())
    }

    async fn search(&self, _category: MemoryCategory, _query: &str) -> Result<Vec<String>, MemoryError> {
        Ok(Vec::new())
    }
}

/// Memory backend with fixed capabilities that counts what is asked of it.
/// Searches always find `hit`.
pub struct LimitedMemory {
    capabilities: MemoryCapabilities,
    hit: String,
    adds: AtomicUsize,
    searches: AtomicUsize,
}

impl LimitedMemory {
    pub fn new(capabilities: MemoryCapabilities, hit: &str) -> Self {
        Self {
            capabilities,
            hit: hit.to_string(),
            adds: AtomicUsize::new(0),
            searches: AtomicUsize::new(0),
        }
    }

    pub fn adds(&self) -> usize {
        self.adds.load(Ordering::SeqCst)
    }

    pub fn searches(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SemanticMemory for LimitedMemory {
    fn capabilities(&self) -> MemoryCapabilities {
        self.capabilities
    }

    async fn add(&self, _category: MemoryCategory, _text: &str) -> Result<(), MemoryError> {
        self.adds.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn search(&self, _category: MemoryCategory, _query: &str) -> Result<Vec<String>, MemoryError> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        Ok(vec![self.hit.clone()])
    }
}
