pub mod frames;
pub mod ollama;

use serde::{Deserialize, Serialize};

pub use ollama::{OllamaClient, OllamaConfig, PromptHandle, PromptOutcome};

/// One event of a streaming prompt, delivered in generation order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamEvent {
    /// Incremental response text
    Token(String),
    /// The backend signalled completion; no more tokens follow
    Finished,
    /// Only sent by [`PromptHandle`]; the callback API returns the error instead
    Error(String),
}

/// A conversation with one model.
///
/// The history is the running transcript sent as the prompt of the next turn.
/// Switching model or resetting produces a new session (new id, empty
/// history) instead of clearing this one in place; the new id is how callers
/// notice a session change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    id: String,
    model: String,
    history: String,
}

impl Session {
    pub fn new(model: impl Into<String>) -> Self {
        let session = Self {
            id: uuid::Uuid::new_v4().to_string(),
            model: model.into(),
            history: String::new(),
        };
        log::info!("New session {} with model {}", session.id, session.model);
        session
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn history(&self) -> &str {
        &self.history
    }

    pub fn reset(&self) -> Session {
        Session::new(self.model.clone())
    }

    /// A fresh session for `model`, or `None` if this session already uses it.
    pub fn switch_model(&self, model: &str) -> Option<Session> {
        (self.model != model).then(|| Session::new(model))
    }

    /// History with the next question appended, in the transcript format
    pub(crate) fn prompt_for(&self, text: &str) -> String {
        format!("{}Prompter:{}\nAI:", self.history, text)
    }

    pub(crate) fn commit_prompt(&mut self, prompt: String) {
        self.history = prompt;
    }

    pub(crate) fn push_response(&mut self, fragment: &str) {
        self.history.push_str(fragment);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transcript_format() {
        let mut session = Session::new("llama3");
        let prompt = session.prompt_for("hi");
        assert_eq!(prompt, "Prompter:hi\nAI:");
        session.commit_prompt(prompt);
        session.push_response("hello");
        assert_eq!(session.prompt_for("again"), "Prompter:hi\nAI:helloPrompter:again\nAI:");
    }

    #[test]
    fn test_switch_model_clears_history() {
        let mut session = Session::new("llama3");
        session.commit_prompt(session.prompt_for("secret"));

        assert!(session.switch_model("llama3").is_none());
        let switched = session.switch_model("mistral").unwrap();
        assert_eq!(switched.model(), "mistral");
        assert!(switched.history().is_empty());
        assert_ne!(switched.id(), session.id());
        assert!(!switched.prompt_for("next").contains("secret"));
    }

    #[test]
    fn test_reset_keeps_model() {
        let mut session = Session::new("llama3");
        session.push_response("x");
        let fresh = session.reset();
        assert_eq!(fresh.model(), "llama3");
        assert!(fresh.history().is_empty());
        assert_eq!(session.history(), "x");
    }
}
