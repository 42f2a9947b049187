//! Recall shortcut: answers questions about the user without the model

use std::sync::Arc;
use tracing::{debug, warn};

use super::memory::{MemoryCategory, SemanticMemory};
use super::profile::Profile;

#[derive(Clone, Copy)]
enum RecallField {
    Location,
    Name,
    Occupation,
}

impl RecallField {
    fn read(self, profile: &Profile) -> Option<&str> {
        match self {
            RecallField::Location => profile.location.as_deref(),
            RecallField::Name => profile.name.as_deref(),
            RecallField::Occupation => profile.occupation.as_deref(),
        }
    }

    fn answer(self, value: &str) -> String {
        match self {
            RecallField::Location => format!("You live in {}.", value),
            RecallField::Name => format!("Your name is {}.", value),
            RecallField::Occupation => format!("You work as {}.", value),
        }
    }
}

/// Checked in order; the first rule whose trigger matches and whose field is
/// stored answers the question
const RULES: [(&[&str], RecallField); 3] = [
    (&["where do i live", "where am i from"], RecallField::Location),
    (&["what is my name", "who am i"], RecallField::Name),
    (&["what do i do", "my occupation"], RecallField::Occupation),
];

/// Answer straight from the stored profile
pub fn from_profile(question: &str, profile: &Profile) -> Option<String> {
    let q = question.to_lowercase();

    RULES.iter().find_map(|(triggers, field)| {
        if !triggers.iter().any(|t| q.contains(t)) {
            return None;
        }
        field
            .read(profile)
            .filter(|v| !v.trim().is_empty())
            .map(|v| field.answer(v))
    })
}

pub struct RecallShortcut {
    memory: Arc<dyn SemanticMemory>,
    search_memory: bool,
}

impl RecallShortcut {
    pub fn new(memory: Arc<dyn SemanticMemory>) -> Self {
        let search_memory = memory.capabilities().search;
        Self {
            memory,
            search_memory,
        }
    }

    /// `None` means the full turn loop has to run.
    ///
    /// `facts_stored` is set when the same message just recorded facts; the
    /// identity memory would only echo them back, so it is not searched.
    pub async fn try_recall(
        &self,
        question: &str,
        profile: Option<&Profile>,
        facts_stored: bool,
    ) -> Option<String> {
        if let Some(answer) = profile.and_then(|p| from_profile(question, p)) {
            debug!("Recall answered from profile");
            return Some(answer);
        }

        if !self.search_memory || facts_stored {
            return None;
        }

        match self.memory.search(MemoryCategory::Identity, question).await {
            Ok(hits) => {
                let text = hits.join("\n");
                if text.trim().is_empty() {
                    None
                } else {
                    debug!(hits = hits.len(), "Recall answered from identity memory");
                    Some(text)
                }
            }
            Err(e) => {
                warn!(error = %e, "Identity memory search failed");
                None
            }
        }
    }
}
