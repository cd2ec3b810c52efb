//! SQLite-backed key/value store

use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

use super::{PersistentStore, StoreError};

/// Key/value store in a single SQLite table
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the store at the given SQLite database path
    pub async fn new(db_path: &Path) -> Result<Self, sqlx::Error> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Open a private in-memory store (for testing)
    pub async fn in_memory() -> Result<Self, sqlx::Error> {
        // A single connection, otherwise every connection sees its own database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl PersistentStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM kv WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|(raw,)| {
            serde_json::from_str(&raw).map_err(|source| StoreError::Corrupt {
                key: key.to_string(),
                source,
            })
        })
        .transpose()
    }

    async fn set(&self, key: &str, value: &Value) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO kv (key, value, updated_at) VALUES (?, ?, datetime('now'))
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
impl SqliteStore {
    /// Write a raw, possibly non-JSON, value
    pub(crate) async fn set_raw(&self, key: &str, raw: &str) -> Result<(), sqlx::Error> {
        sqlx::query("INSERT OR REPLACE INTO kv (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(raw)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{get_as, CREDENTIAL_KEY};
    use serde_json::json;

    #[tokio::test]
    async fn test_get_missing_key() {
        let store = SqliteStore::in_memory().await.unwrap();
        assert!(store.get("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_overwrites() {
        let store = SqliteStore::in_memory().await.unwrap();

        store.set("k", &json!([1, 2])).await.unwrap();
        store.set("k", &json!({"a": "b"})).await.unwrap();

        assert_eq!(store.get("k").await.unwrap(), Some(json!({"a": "b"})));
    }

    #[tokio::test]
    async fn test_get_as_typed() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.set(CREDENTIAL_KEY, &json!("sk-test")).await.unwrap();

        let key: Option<String> = get_as(&store, CREDENTIAL_KEY).await.unwrap();
        assert_eq!(key.as_deref(), Some("sk-test"));

        let wrong: Result<Option<Vec<String>>, _> = get_as(&store, CREDENTIAL_KEY).await;
        assert!(matches!(wrong, Err(StoreError::Corrupt { .. })));
    }

    #[tokio::test]
    async fn test_corrupt_raw_value() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.set_raw("k", "{not json").await.unwrap();

        assert!(matches!(store.get("k").await, Err(StoreError::Corrupt { .. })));
    }

    #[tokio::test]
    async fn test_file_store_survives_reopen() {
        let dir = std::env::temp_dir().join(format!("thb-ai-store-{}", std::process::id()));
        let path = dir.join("thb-ai.db");

        {
            let store = SqliteStore::new(&path).await.unwrap();
            store.set("k", &json!("v")).await.unwrap();
            store.pool.close().await;
        }

        let reopened = SqliteStore::new(&path).await.unwrap();
        assert_eq!(reopened.get("k").await.unwrap(), Some(json!("v")));
        reopened.pool.close().await;

        std::fs::remove_dir_all(&dir).ok();
    }
}
