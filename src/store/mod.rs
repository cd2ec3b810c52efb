//! Persistent key/value storage
//!
//! Everything the client keeps across restarts (credential, current chat,
//! history) is a JSON value under a fixed key. Each write replaces the whole
//! value, so no transactions are needed.

mod sqlite;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

pub use sqlite::SqliteStore;

/// Key holding the completion API credential (JSON string)
pub const CREDENTIAL_KEY: &str = "thb-ai-api-key";

/// Key holding the live conversation (array of messages)
pub const CURRENT_CHAT_KEY: &str = "thb-ai-current-chat";

/// Key holding archived conversations (array of arrays of messages)
pub const HISTORY_KEY: &str = "thb-ai-chat-history";

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt value under '{key}': {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Durable get/set of JSON values by key
#[async_trait]
pub trait PersistentStore: Send + Sync {
    /// Read the value stored under `key`, if any
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    /// Overwrite the value stored under `key`
    async fn set(&self, key: &str, value: &Value) -> Result<(), StoreError>;
}

/// Read and deserialize a typed value
pub async fn get_as<T: DeserializeOwned>(
    store: &dyn PersistentStore,
    key: &str,
) -> Result<Option<T>, StoreError> {
    match store.get(key).await? {
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|source| StoreError::Corrupt {
                key: key.to_string(),
                source,
            }),
        None => Ok(None),
    }
}
