//! Conversation types and state management

use serde::{Deserialize, Serialize};

use crate::config::prompts_builtin;

/// Maximum number of characters shown in a conversation title
const TITLE_MAX_CHARS: usize = 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

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

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One chat session, oldest message first.
///
/// Persisted as a bare JSON array of messages. The system prompt is never
/// stored here; it is prepended only when a request is built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn add_user(&mut self, content: &str) {
        self.append(Message::user(content));
    }

    /// Empties the conversation. Archiving beforehand is the caller's job.
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

    /// Same conversation with any `system` messages dropped
    pub fn without_system(self) -> Self {
        self.messages
            .into_iter()
            .filter(|m| m.role != Role::System)
            .collect::<Vec<_>>()
            .into()
    }

    /// Display title using the built-in empty-chat placeholder
    pub fn title(&self) -> String {
        self.title_or(prompts_builtin::EMPTY_CHAT_TITLE)
    }

    /// First message truncated to 30 chars (plus `...`), or `placeholder`
    pub fn title_or(&self, placeholder: &str) -> String {
        let Some(first) = self.messages.first() else {
            return placeholder.to_string();
        };

        let mut chars = first.content.chars();
        let head: String = chars.by_ref().take(TITLE_MAX_CHARS).collect();
        if chars.next().is_some() {
            format!("{}...", head)
        } else {
            head
        }
    }
}

impl From<Vec<Message>> for Conversation {
    fn from(messages: Vec<Message>) -> Self {
        Self { messages }
    }
}
