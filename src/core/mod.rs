//! Core chat session
//!
//! Conversation state, history and the request cycle against the completion API.

mod chat;

pub use chat::{ChatClient, ChatError, ChatSettings, ChatState};
