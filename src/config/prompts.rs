//! System prompt composition
//!
//! The assistant prompt is rebuilt on every model call from the stored
//! profile, the rolling summary, the recent history window and the outcome of
//! the last tool call.

use crate::conversation::ChatTurn;
use crate::core::Profile;
use crate::tools::{ToolInvocation, ToolStatus};

/// What the prompt says about tool calls made earlier in this turn
#[derive(Debug, Clone, Copy)]
pub enum ToolSection<'a> {
    Empty,
    Success(&'a ToolInvocation),
    Failure(&'a ToolInvocation),
    BudgetExhausted,
}

impl<'a> ToolSection<'a> {
    /// Section for the most recent invocation, if any
    pub fn from_last(last: Option<&'a ToolInvocation>) -> Self {
        match last {
            Some(invocation) if invocation.succeeded() => ToolSection::Success(invocation),
            Some(invocation) => ToolSection::Failure(invocation),
            None => ToolSection::Empty,
        }
    }

    pub fn render(&self) -> String {
        match self {
            ToolSection::Empty => String::new(),
            ToolSection::Success(invocation) => format!(
                "## Function Call Executed\n\n- name: `{}`\n- args:\n{}- outcome: ✅ {}\n\n{}",
                invocation.name,
                render_arguments(invocation),
                ToolStatus::Success,
                invocation.outcome.message
            ),
            ToolSection::Failure(invocation) => format!(
                "## Function Call Attempted\n\n- name: `{}`\n- args:\n{}- outcome: ❌ {} - {}\n\n\
                 Please continue helping the user with the available context.",
                invocation.name,
                render_arguments(invocation),
                ToolStatus::Failure,
                invocation.outcome.message
            ),
            ToolSection::BudgetExhausted => "# Function Call Limit Reached.\n\
                 Please conclude the conversation with the available information."
                .to_string(),
        }
    }
}

fn render_arguments(invocation: &ToolInvocation) -> String {
    invocation
        .arguments
        .iter()
        .map(|(key, value)| match value {
            serde_json::Value::String(s) => format!("  - {}: {}\n", key, s),
            other => format!("  - {}: {}\n", key, other),
        })
        .collect()
}

fn render_profile(profile: Option<&Profile>) -> String {
    let profile = match profile {
        Some(p) if !p.is_empty() => p,
        _ => return "No user information stored yet.".to_string(),
    };

    let mut lines = Vec::new();
    let mut push = |key: &str, value: Option<String>| {
        if let Some(value) = value {
            lines.push(format!("- {}: {}", key, value));
        }
    };
    push("name", profile.name.clone());
    push("last_name", profile.last_name.clone());
    push("age", profile.age.map(|a| a.to_string()));
    push("gender", profile.gender.clone());
    push("location", profile.location.clone());
    push("occupation", profile.occupation.clone());
    if !profile.interests.is_empty() {
        push("interests", Some(profile.interests_list().join(", ")));
    }

    lines.join("\n")
}

fn render_history(history: &[ChatTurn]) -> String {
    if history.is_empty() {
        return "No previous messages.".to_string();
    }
    history
        .iter()
        .map(ChatTurn::as_exchange)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Build the system prompt for one model call
pub fn compose(
    profile: Option<&Profile>,
    summary: Option<&str>,
    history: &[ChatTurn],
    tool_section: &ToolSection<'_>,
) -> String {
    format!(
        "{}\n\n{}\n\n### User Information\n{}\n\n### Summary of Previous Interactions\n{}\n\n\
         ### Recent Chat History\n{}\n\n### New User Message\n\
         The user will now ask their next question or share information. \
         Respond with reasoning, empathy, and continuity.",
        builtin::ASSISTANT,
        tool_section.render(),
        render_profile(profile),
        summary.filter(|s| !s.trim().is_empty()).unwrap_or("No summary yet."),
        render_history(history),
    )
}

/// Built-in prompts that don't require files
pub mod builtin {
    /// Persona and tool guidance for the cognitive assistant
    pub const ASSISTANT: &str = r#"## You are MemoriAI, a Cognitive Assistant: a thoughtful, empathetic and professional AI designed to remember, reason, and adapt to the user's needs.

### Personality & Communication Guidelines
- Communicate in a warm, respectful, and reflective tone.
- Recall user preferences, facts, and emotional context when answering.
- Write naturally; avoid robotic or overly formal phrasing.
- When helpful, briefly share reasoning or observations.
- If the user's emotion is implied (stress, excitement, confusion), adapt your tone.
- Be concise and helpful; end responses with confident, supportive language.

### Functional Abilities
You have access to two functions:
1) **search_vector_db**: retrieve relevant user information or prior context through semantic search.
2) **add_user_info_to_database**: update the user's stored profile with new details shared in the conversation.

Use functions responsibly:
- Only call a function when you have enough information.
- Avoid repetition: check chat history before recalling or re-adding user data.
- Keep the conversational flow; do not break natural tone with system-like statements.
- If the user asks something about themselves, check the stored profile and memories first.
  If information is missing, politely ask once and remember the answer.
- If a function result below confirms success, or the function call limit is reached, don't call it again."#;

    /// Instructions for the rolling conversation summary
    pub const SUMMARY: &str = "Summarize the conversation between the user and the assistant. \
Keep personal facts, preferences and open questions; drop small talk.";
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolOutcome;
    use serde_json::json;

    fn invocation(outcome: ToolOutcome) -> ToolInvocation {
        ToolInvocation {
            name: "search_vector_db".into(),
            arguments: json!({"query": "tea", "category": "personal_facts"})
                .as_object()
                .cloned()
                .unwrap(),
            outcome,
        }
    }

    #[test]
    fn test_empty_section() {
        let prompt = compose(None, None, &[], &ToolSection::Empty);
        assert!(prompt.starts_with(builtin::ASSISTANT));
        assert!(!prompt.contains("Function Call"));
        assert!(prompt.contains("No user information stored yet."));
        assert!(prompt.contains("No summary yet."));
        assert!(prompt.contains("No previous messages."));
    }

    #[test]
    fn test_success_section() {
        let call = invocation(ToolOutcome::success("- likes green tea"));
        let rendered = ToolSection::from_last(Some(&call)).render();

        assert!(rendered.starts_with("## Function Call Executed"));
        assert!(rendered.contains("- name: `search_vector_db`"));
        assert!(rendered.contains("  - query: tea\n"));
        assert!(rendered.contains("- outcome: ✅ Function call successful."));
        assert!(rendered.ends_with("- likes green tea"));
    }

    #[test]
    fn test_failure_section() {
        let call = invocation(ToolOutcome::failure("No relevant memories found for: tea"));
        let rendered = ToolSection::from_last(Some(&call)).render();

        assert!(rendered.starts_with("## Function Call Attempted"));
        assert!(rendered
            .contains("- outcome: ❌ Function call failed. - No relevant memories found for: tea"));
        assert!(rendered.ends_with("Please continue helping the user with the available context."));
    }

    #[test]
    fn test_budget_section() {
        let prompt = compose(None, None, &[], &ToolSection::BudgetExhausted);
        assert!(prompt.contains("# Function Call Limit Reached."));
        assert!(prompt.contains("Please conclude the conversation with the available information."));
    }

    #[test]
    fn test_profile_summary_and_history() {
        let mut profile = Profile::default();
        profile.name = Some("Dana".into());
        profile.age = Some(34);
        profile.interests.insert("AI".into());
        profile.interests.insert("ML".into());

        let history = vec![ChatTurn::new("Hi", "Hello Dana!")];
        let prompt = compose(
            Some(&profile),
            Some("The user shared their name."),
            &history,
            &ToolSection::Empty,
        );

        assert!(prompt.contains("- name: Dana\n- age: 34\n- interests: AI, ML"));
        assert!(prompt.contains("The user shared their name."));
        assert!(prompt.contains("user: Hi | assistant: Hello Dana!"));
    }
}
