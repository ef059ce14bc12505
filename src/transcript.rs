//! Conversation history shared between the UI and the request payload.

use serde::{Deserialize, Serialize};

/// The role of a chat message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A single message in the conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Ordered, append-only conversation history for the active session.
///
/// A user message and its finalized assistant reply are appended together,
/// so a failed or cancelled request never leaves a half-written exchange
/// behind.
#[derive(Debug, Default, Clone)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a completed user/assistant exchange.
    pub fn append_exchange(&mut self, user: impl Into<String>, assistant: impl Into<String>) {
        self.messages.push(Message::user(user));
        self.messages.push(Message::assistant(assistant));
    }

    /// Reset the history to empty.
    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exchange_appends_user_then_assistant() {
        let mut transcript = Transcript::new();
        transcript.append_exchange("hi", "hello");
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript.messages()[0].role, Role::User);
        assert_eq!(transcript.messages()[0].content, "hi");
        assert_eq!(transcript.messages()[1].role, Role::Assistant);
        assert_eq!(transcript.messages()[1].content, "hello");
    }

    #[test]
    fn clear_empties_history() {
        let mut transcript = Transcript::new();
        transcript.append_exchange("a", "b");
        transcript.clear();
        assert!(transcript.is_empty());
    }

    #[test]
    fn roles_serialize_lowercase() {
        let json = serde_json::to_string(&Message::user("hey")).unwrap();
        assert_eq!(json, r#"{"role":"user","content":"hey"}"#);
        let json = serde_json::to_string(&Message::assistant("yo")).unwrap();
        assert!(json.contains(r#""role":"assistant""#));
    }
}
