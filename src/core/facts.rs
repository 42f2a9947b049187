//! Fact recognizer
//!
//! Best-effort phrase matcher that picks personal facts out of a message
//! before the model sees it. Recognized facts go to the profile through the
//! `add_user_info_to_database` tool and to the `identity_links` memory.

use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

use crate::tools::{ToolRegistry, ADD_USER_INFO};

use super::memory::{MemoryCategory, SemanticMemory};

const NAME_TRIGGER: &str = "my name is";
const LOCATION_TRIGGERS: [&str; 2] = ["i live in", "i am from"];
const OCCUPATION_TRIGGER: &str = "i work as";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactKey {
    Name,
    Location,
    Occupation,
}

impl FactKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            FactKey::Name => "name",
            FactKey::Location => "location",
            FactKey::Occupation => "occupation",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fact {
    pub key: FactKey,
    pub value: String,
}

impl Fact {
    fn new(key: FactKey, value: &str) -> Option<Self> {
        let value = value.trim();
        (!value.is_empty()).then(|| Self {
            key,
            value: value.to_string(),
        })
    }

    /// Sentence stored in the identity memory
    pub fn memory_text(&self) -> String {
        match self.key {
            FactKey::Name => format!("User's name is {}.", self.value),
            FactKey::Location => format!("User lives in {}.", self.value),
            FactKey::Occupation => format!("User occupation: {}", self.value),
        }
    }
}

/// Text following `trigger`, matched case-insensitively. ASCII lowercasing
/// keeps byte offsets valid for slicing the original text.
fn after_trigger<'a>(text: &'a str, lowered: &str, trigger: &str) -> Option<&'a str> {
    lowered
        .find(trigger)
        .map(|idx| &text[idx + trigger.len()..])
}

fn until_sentence_end(span: &str) -> &str {
    let span = span.split('.').next().unwrap_or_default();
    span.trim().trim_end_matches(['!', '?', ',', ';', ':'])
}

fn first_token(span: &str) -> &str {
    span.split_whitespace()
        .next()
        .unwrap_or_default()
        .trim_matches(|c: char| !c.is_alphanumeric() && c != '-' && c != '\'')
}

/// Pull personal facts out of free text
pub fn extract(text: &str) -> Vec<Fact> {
    let lowered = text.to_ascii_lowercase();
    let mut facts = Vec::new();

    if let Some(span) = after_trigger(text, &lowered, NAME_TRIGGER) {
        facts.extend(Fact::new(FactKey::Name, first_token(span)));
    }

    // First location phrase present wins, even if its capture is empty
    if let Some(span) = LOCATION_TRIGGERS
        .iter()
        .find_map(|trigger| after_trigger(text, &lowered, trigger))
    {
        facts.extend(Fact::new(FactKey::Location, until_sentence_end(span)));
    }

    if let Some(span) = after_trigger(text, &lowered, OCCUPATION_TRIGGER) {
        facts.extend(Fact::new(FactKey::Occupation, until_sentence_end(span)));
    }

    facts
}

pub struct FactRecognizer {
    tools: Arc<ToolRegistry>,
    memory: Arc<dyn SemanticMemory>,
    append_memory: bool,
}

impl FactRecognizer {
    pub fn new(tools: Arc<ToolRegistry>, memory: Arc<dyn SemanticMemory>) -> Self {
        let append_memory = memory.capabilities().append;
        Self {
            tools,
            memory,
            append_memory,
        }
    }

    pub fn extract(&self, text: &str) -> Vec<Fact> {
        extract(text)
    }

    /// Store each fact and return how many reached the profile. Failures are
    /// logged and skipped.
    pub async fn record(&self, facts: &[Fact]) -> usize {
        let mut stored = 0;
        for fact in facts {
            let mut fields = Map::new();
            fields.insert(fact.key.as_str().to_string(), Value::String(fact.value.clone()));

            let outcome = self.tools.dispatch(ADD_USER_INFO, &fields).await;
            if !outcome.is_success() {
                debug!(key = fact.key.as_str(), message = %outcome.message, "Fact not stored");
                continue;
            }
            stored += 1;

            if self.append_memory {
                if let Err(e) = self.memory.add(MemoryCategory::Identity, &fact.memory_text()).await {
                    debug!(error = %e, "Identity memory not stored");
                }
            }
        }
        stored
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{MemoryStore, ProfileStore};

    fn values(text: &str) -> Vec<(FactKey, String)> {
        extract(text).into_iter().map(|f| (f.key, f.value)).collect()
    }

    #[test]
    fn test_extract_name() {
        assert_eq!(values("My name is Dana."), vec![(FactKey::Name, "Dana".into())]);
        assert_eq!(
            values("hi, MY NAME IS Jean-Luc and I like tea"),
            vec![(FactKey::Name, "Jean-Luc".into())]
        );
    }

    #[test]
    fn test_extract_location_first_trigger_wins() {
        assert_eq!(
            values("I live in New York City. I am from Ohio."),
            vec![(FactKey::Location, "New York City".into())]
        );
        assert_eq!(
            values("Originally I am from Porto!"),
            vec![(FactKey::Location, "Porto".into())]
        );
    }

    #[test]
    fn test_extract_occupation() {
        assert_eq!(
            values("These days I work as a data engineer. It's fun."),
            vec![(FactKey::Occupation, "a data engineer".into())]
        );
    }

    #[test]
    fn test_extract_several_facts_in_order() {
        let facts = values("My name is Ana. I live in Madrid. I work as a chef.");
        assert_eq!(
            facts,
            vec![
                (FactKey::Name, "Ana".into()),
                (FactKey::Location, "Madrid".into()),
                (FactKey::Occupation, "a chef".into()),
            ]
        );
    }

    #[test]
    fn test_empty_capture_is_skipped() {
        assert!(values("my name is").is_empty());
        assert!(values("I live in. Nothing else").is_empty());
        assert!(values("What's the weather like?").is_empty());
    }

    #[test]
    fn test_memory_text() {
        let fact = Fact::new(FactKey::Location, "Berlin").unwrap();
        assert_eq!(fact.memory_text(), "User lives in Berlin.");
    }

    async fn recognizer() -> (FactRecognizer, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new_in_memory_async().await.unwrap());
        let tools = Arc::new(ToolRegistry::new(store.clone(), store.clone()));
        (FactRecognizer::new(tools, store.clone()), store)
    }

    #[tokio::test]
    async fn test_record_updates_profile_and_memory() {
        let (recognizer, store) = recognizer().await;
        let facts = recognizer.extract("My name is Dana.");
        assert_eq!(recognizer.record(&facts).await, 1);

        let profile = store.read().await.unwrap().unwrap();
        assert_eq!(profile.name.as_deref(), Some("Dana"));

        let hits = store.search(MemoryCategory::Identity, "name").await.unwrap();
        assert_eq!(hits, vec!["User's name is Dana."]);
    }

    #[tokio::test]
    async fn test_record_twice_is_idempotent_for_profile() {
        let (recognizer, store) = recognizer().await;
        let message = "My name is Dana. I work as a pilot.";

        recognizer.record(&recognizer.extract(message)).await;
        let once = store.read().await.unwrap();
        recognizer.record(&recognizer.extract(message)).await;
        let twice = store.read().await.unwrap();

        assert_eq!(once, twice);
    }
}
