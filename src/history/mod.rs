//! Archived conversations
//!
//! History is an insertion-ordered list of non-empty conversations, written
//! back to the store after every mutation. Store failures never reach the
//! caller: the manager logs them and keeps working from memory.

use std::sync::Arc;

use crate::conversation::Conversation;
use crate::store::{get_as, PersistentStore, HISTORY_KEY};

/// History errors
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("History index {index} out of range (length {len})")]
    OutOfRange { index: usize, len: usize },
}

pub struct HistoryManager {
    store: Arc<dyn PersistentStore>,
    entries: Vec<Conversation>,
}

impl HistoryManager {
    /// Load history from the store. A missing or unreadable value yields an
    /// empty history; stray `system` messages are dropped from every entry.
    pub async fn load(store: Arc<dyn PersistentStore>) -> Self {
        let entries = match get_as::<Vec<Conversation>>(&*store, HISTORY_KEY).await {
            Ok(Some(entries)) => entries
                .into_iter()
                .map(Conversation::without_system)
                .filter(|c| !c.is_empty())
                .collect(),
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::warn!("Discarding unreadable chat history: {}", e);
                Vec::new()
            }
        };

        tracing::debug!("Loaded {} archived chat(s)", entries.len());
        Self { store, entries }
    }

    /// Append `conversation` if it is non-empty and persist.
    ///
    /// Returns whether anything was stored.
    pub async fn archive(&mut self, conversation: Conversation) -> bool {
        if conversation.is_empty() {
            return false;
        }

        self.entries.push(conversation);
        self.persist().await;
        true
    }

    /// Remove and return the entry at `index`, then persist the remainder
    pub async fn take(&mut self, index: usize) -> Result<Conversation, HistoryError> {
        if index >= self.entries.len() {
            return Err(HistoryError::OutOfRange {
                index,
                len: self.entries.len(),
            });
        }

        let conversation = self.entries.remove(index);
        self.persist().await;
        Ok(conversation)
    }

    /// `(index, title)` pairs in history order
    pub fn list(&self) -> impl Iterator<Item = (usize, String)> + Clone + '_ {
        self.entries
            .iter()
            .enumerate()
            .map(|(index, conversation)| (index, conversation.title()))
    }

    /// Like [`list`](Self::list) with a custom empty-chat placeholder
    pub fn list_with<'a>(
        &'a self,
        placeholder: &'a str,
    ) -> impl Iterator<Item = (usize, String)> + Clone + 'a {
        self.entries
            .iter()
            .enumerate()
            .map(move |(index, conversation)| (index, conversation.title_or(placeholder)))
    }

    pub fn get(&self, index: usize) -> Option<&Conversation> {
        self.entries.get(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    async fn persist(&self) {
        let value = match serde_json::to_value(&self.entries) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Failed to serialize chat history: {}", e);
                return;
            }
        };

        if let Err(e) = self.store.set(HISTORY_KEY, &value).await {
            tracing::warn!("Failed to save chat history, keeping it in memory: {}", e);
        }
    }
}

impl std::fmt::Debug for HistoryManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryManager")
            .field("entries", &self.entries.len())
            .finish()
    }
}
