//! Persona and user-facing strings
//!
//! The assistant persona and the localized strings shown in the transcript
//! can be replaced with a TOML file.
//!
//! # Example Persona File
//!
//! ```toml
//! [persona]
//! name = "THB AI"
//! description = "Bilingual assistant"
//!
//! [system_prompt]
//! content = "You are THB AI, a helpful assistant that speaks Bengali and English."
//!
//! [messages]
//! greeting = "Hello! How can I help you today?"
//! error = "Sorry, something went wrong. Please try again later."
//! empty_title = "Empty chat"
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

/// A persona file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptTemplate {
    /// Persona metadata
    pub persona: PersonaInfo,

    /// The system prompt
    pub system_prompt: SystemPrompt,

    /// Transcript strings; anything left out keeps the built-in text
    #[serde(default)]
    pub messages: PromptMessages,
}

/// Persona metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaInfo {
    /// Display name of the persona
    pub name: String,

    /// Brief description
    #[serde(default)]
    pub description: String,
}

/// System prompt content
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemPrompt {
    /// The full system prompt content
    pub content: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptMessages {
    #[serde(default)]
    pub greeting: Option<String>,

    #[serde(default)]
    pub error: Option<String>,

    #[serde(default)]
    pub empty_title: Option<String>,
}

impl PromptTemplate {
    /// Load a persona from a TOML file
    pub async fn load(path: &Path) -> Result<Self, PromptError> {
        let content = tokio::fs::read_to_string(path).await?;
        Self::from_str(&content)
    }

    /// Parse a persona from a TOML string
    pub fn from_str(content: &str) -> Result<Self, PromptError> {
        let template: PromptTemplate = toml::from_str(content)?;
        if template.system_prompt.content.trim().is_empty() {
            return Err(PromptError::Validation(format!(
                "persona '{}' has an empty system prompt",
                template.persona.name
            )));
        }
        Ok(template)
    }
}

/// Resolved strings used by the chat client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompts {
    pub system_prompt: String,
    pub greeting: String,
    pub error_message: String,
    pub empty_title: String,
}

impl Default for Prompts {
    fn default() -> Self {
        Self {
            system_prompt: builtin::SYSTEM_PROMPT.to_string(),
            greeting: builtin::GREETING.to_string(),
            error_message: builtin::ERROR_MESSAGE.to_string(),
            empty_title: builtin::EMPTY_CHAT_TITLE.to_string(),
        }
    }
}

impl From<PromptTemplate> for Prompts {
    fn from(template: PromptTemplate) -> Self {
        let defaults = Prompts::default();
        let messages = template.messages;
        Self {
            system_prompt: template.system_prompt.content,
            greeting: messages.greeting.unwrap_or(defaults.greeting),
            error_message: messages.error.unwrap_or(defaults.error_message),
            empty_title: messages.empty_title.unwrap_or(defaults.empty_title),
        }
    }
}

/// Prompt errors
#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Built-in persona
pub mod builtin {
    pub const SYSTEM_PROMPT: &str =
        "You are THB AI, a helpful assistant that speaks Bengali and English.";

    pub const GREETING: &str = "হ্যালো! আমি THB AI, আপনার ব্যক্তিগত AI সহকারী। আজ আমি আপনাকে কিভাবে সাহায্য করতে পারি?";

    /// Shown in the transcript whenever a request fails
    pub const ERROR_MESSAGE: &str =
        "দুঃখিত, একটি ত্রুটি হয়েছে। অনুগ্রহপূর্বক পরে আবার চেষ্টা করুন।";

    pub const EMPTY_CHAT_TITLE: &str = "খালি চ্যাট";

    pub const CREDENTIAL_SAVED: &str =
        "API কী সফলভাবে সংরক্ষণ করা হয়েছে! এখন আপনি THB AI এর সাথে চ্যাট করতে পারেন।";
}
