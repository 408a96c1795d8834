//! Turn-based dialogue state machine
//!
//! A [`Flow`] owns a closed set of stages and one handler per stage.
//! [`advance`] moves a conversation exactly one turn:
//!
//! ```text
//! terminal stage         -> stays terminal (absorbing)
//! open stage + farewell  -> flow's terminal stage, terminated = true
//! otherwise              -> flow handler for the current stage
//! ```
//!
//! Handlers never fail. A generation error is turned into an apology and the
//! stage is left unchanged so the next input retries it.

pub mod assistant;
pub mod name;
pub mod order;

pub use assistant::{AssistantFlow, AssistantStage, Persona};
pub use name::extract_name;
pub use order::{Catalog, CatalogItem, OrderData, OrderFlow, OrderStage};

use crate::models::{ConversationState, Stage};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

/// Outcome of one stage handler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn<S> {
    pub next: S,
    pub response: String,
}

impl<S> Turn<S> {
    pub fn to(next: S, response: impl Into<String>) -> Self {
        Self {
            next,
            response: response.into(),
        }
    }
}

/// Phrases that end a conversation from any open stage
#[derive(Debug, Clone)]
pub struct TerminationPhrases {
    /// Matched anywhere in the message
    pub contains: Vec<String>,
    /// Matched against the whole message
    pub exact: Vec<String>,
}

impl Default for TerminationPhrases {
    fn default() -> Self {
        Self {
            contains: ["tchau", "bye", "adeus"].map(String::from).to_vec(),
            exact: ["sair", "exit", "quit"].map(String::from).to_vec(),
        }
    }
}

impl TerminationPhrases {
    /// Case-insensitive check against the trimmed input.
    pub fn matches(&self, input: &str) -> bool {
        let normalized = input.trim().to_lowercase();
        if normalized.is_empty() {
            return false;
        }
        self.contains.iter().any(|p| normalized.contains(p.as_str()))
            || self.exact.iter().any(|p| normalized == *p)
    }
}

/// A conversation flow: its stages and their handlers
#[async_trait::async_trait]
pub trait Flow: Send + Sync {
    type Stage: Stage;
    type Data: Default + Clone + Serialize + DeserializeOwned + Send + Sync;

    fn termination_phrases(&self) -> &TerminationPhrases;

    /// Turn taken when a termination phrase arrives in an open stage.
    /// Must lead to a terminal stage.
    fn farewell(&self, state: &mut ConversationState<Self::Stage, Self::Data>) -> Turn<Self::Stage>;

    /// Reply given to any input once the conversation is over.
    fn closed_reply(&self, state: &ConversationState<Self::Stage, Self::Data>) -> String;

    /// Handle `input` (already trimmed) in the current non-terminal stage.
    async fn handle(
        &self,
        state: &mut ConversationState<Self::Stage, Self::Data>,
        input: &str,
    ) -> Turn<Self::Stage>;
}

/// Advance `state` by one turn.
pub async fn advance<F: Flow + ?Sized>(
    flow: &F,
    mut state: ConversationState<F::Stage, F::Data>,
    input: &str,
) -> ConversationState<F::Stage, F::Data> {
    let input = input.trim();
    let from = state.stage;
    state.last_user_message = input.to_string();

    let turn = if from.is_terminal() {
        Turn::to(from, flow.closed_reply(&state))
    } else if from.is_open() && flow.termination_phrases().matches(input) {
        flow.farewell(&mut state)
    } else {
        flow.handle(&mut state, input).await
    };

    debug!(
        conversation_id = %state.conversation_id,
        from = from.tag(),
        to = turn.next.tag(),
        "dialogue turn"
    );

    state.last_response = turn.response;
    state.set_stage(turn.next);
    state
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_termination_substring_is_case_insensitive() {
        let phrases = TerminationPhrases::default();
        assert!(phrases.matches("ok vou dar tchau"));
        assert!(phrases.matches("  TCHAU!  "));
        assert!(phrases.matches("Goodbye"));
        assert!(!phrases.matches("o que é tcp?"));
        assert!(!phrases.matches(""));
    }

    #[test]
    fn test_exit_commands_match_whole_message_only() {
        let phrases = TerminationPhrases::default();
        assert!(phrases.matches("sair"));
        assert!(phrases.matches(" EXIT "));
        assert!(!phrases.matches("como quitar uma dívida?"));
        assert!(!phrases.matches("quero sair de casa cedo"));
    }
}
