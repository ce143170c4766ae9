//! services/api/src/adapters/sqlite_kv.rs
//!
//! This module contains the storage adapter, which is the concrete implementation
//! of the `KeyValueStore` port from the `core` crate. Every slot is one row of the
//! `kv_store` table in a SQLite database, accessed through `sqlx`.

use std::collections::HashMap;

use async_trait::async_trait;
use luna_core::ports::{KeyValueStore, PortError, PortResult, WriteOp};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};
use tracing::debug;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A storage adapter that implements the `KeyValueStore` port.
#[derive(Clone)]
pub struct SqliteKvAdapter {
    pool: SqlitePool,
}

impl SqliteKvAdapter {
    /// Creates a new `SqliteKvAdapter`.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct EntryRecord {
    key: String,
    value: String,
}

fn storage_error(e: sqlx::Error) -> PortError {
    PortError::Storage(e.to_string())
}

const UPSERT: &str =
    "INSERT INTO kv_store (key, value) VALUES (?, ?) ON CONFLICT(key) DO UPDATE SET value = excluded.value";
const DELETE: &str = "DELETE FROM kv_store WHERE key = ?";

//=========================================================================================
// `KeyValueStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl KeyValueStore for SqliteKvAdapter {
    async fn get(&self, key: &str) -> PortResult<Option<String>> {
        sqlx::query_scalar::<_, String>("SELECT value FROM kv_store WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)
    }

    async fn set(&self, key: &str, value: &str) -> PortResult<()> {
        sqlx::query(UPSERT)
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> PortResult<()> {
        sqlx::query(DELETE)
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(())
    }

    async fn list_keys(&self) -> PortResult<Vec<String>> {
        sqlx::query_scalar::<_, String>("SELECT key FROM kv_store ORDER BY key")
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error)
    }

    /// One `IN (...)` query instead of a round trip per key.
    async fn get_many(&self, keys: &[String]) -> PortResult<Vec<(String, Option<String>)>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT key, value FROM kv_store WHERE key IN (");
        let mut separated = builder.separated(", ");
        for key in keys {
            separated.push_bind(key.as_str());
        }
        separated.push_unseparated(")");

        let records = builder
            .build_query_as::<EntryRecord>()
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error)?;

        let mut found: HashMap<String, String> =
            records.into_iter().map(|r| (r.key, r.value)).collect();
        Ok(keys
            .iter()
            .map(|key| (key.clone(), found.remove(key)))
            .collect())
    }

    async fn write_batch(&self, ops: Vec<WriteOp>) -> PortResult<()> {
        let mut tx = self.pool.begin().await.map_err(storage_error)?;
        for op in &ops {
            match op {
                WriteOp::Set { key, value } => {
                    sqlx::query(UPSERT)
                        .bind(key)
                        .bind(value)
                        .execute(&mut *tx)
                        .await
                        .map_err(storage_error)?;
                }
                WriteOp::Remove { key } => {
                    sqlx::query(DELETE)
                        .bind(key)
                        .execute(&mut *tx)
                        .await
                        .map_err(storage_error)?;
                }
            }
        }
        tx.commit().await.map_err(storage_error)?;
        debug!("Committed a batch of {} writes", ops.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn adapter() -> SqliteKvAdapter {
        // A single connection keeps every query on the same in-memory database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let adapter = SqliteKvAdapter::new(pool);
        adapter.run_migrations().await.unwrap();
        adapter
    }

    #[tokio::test]
    async fn set_overwrites_and_remove_deletes() {
        let store = adapter().await;

        store.set("progressData", "{}").await.unwrap();
        store.set("progressData", r#"{"points":10}"#).await.unwrap();
        assert_eq!(
            store.get("progressData").await.unwrap().as_deref(),
            Some(r#"{"points":10}"#)
        );

        store.remove("progressData").await.unwrap();
        assert_eq!(store.get("progressData").await.unwrap(), None);
        // Removing an absent key is not an error.
        store.remove("progressData").await.unwrap();
    }

    #[tokio::test]
    async fn get_many_keeps_requested_order() {
        let store = adapter().await;
        store.set("chatTime_2024-05-01", "a").await.unwrap();
        store.set("chatTime_2024-05-03", "c").await.unwrap();

        let keys = vec![
            "chatTime_2024-05-03".to_string(),
            "chatTime_2024-05-02".to_string(),
            "chatTime_2024-05-01".to_string(),
        ];
        let values = store.get_many(&keys).await.unwrap();

        assert_eq!(
            values,
            vec![
                ("chatTime_2024-05-03".to_string(), Some("c".to_string())),
                ("chatTime_2024-05-02".to_string(), None),
                ("chatTime_2024-05-01".to_string(), Some("a".to_string())),
            ]
        );
        assert!(store.get_many(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn write_batch_commits_every_operation() {
        let store = adapter().await;
        store.set("chatConversation_old", "[]").await.unwrap();

        store
            .write_batch(vec![
                WriteOp::remove("chatConversation_old"),
                WriteOp::set("chatConversation_new", "[]"),
                WriteOp::set("_conversationSummaries_", "[]"),
            ])
            .await
            .unwrap();

        assert_eq!(
            store.list_keys().await.unwrap(),
            vec![
                "_conversationSummaries_".to_string(),
                "chatConversation_new".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn failed_write_batch_applies_nothing() {
        let store = adapter().await;
        store.set("progressData", "old").await.unwrap();
        store.set("chatConversation_a", "[]").await.unwrap();
        sqlx::query(
            "CREATE TRIGGER reject_poison BEFORE INSERT ON kv_store \
             WHEN NEW.key = 'poison' BEGIN SELECT RAISE(ABORT, 'rejected'); END",
        )
        .execute(&store.pool)
        .await
        .unwrap();

        let result = store
            .write_batch(vec![
                WriteOp::set("progressData", "new"),
                WriteOp::remove("chatConversation_a"),
                WriteOp::set("poison", "x"),
            ])
            .await;

        assert!(matches!(result, Err(PortError::Storage(_))));
        assert_eq!(
            store.get("progressData").await.unwrap().as_deref(),
            Some("old")
        );
        assert_eq!(
            store.get("chatConversation_a").await.unwrap().as_deref(),
            Some("[]")
        );
        assert_eq!(store.get("poison").await.unwrap(), None);
    }

    #[tokio::test]
    async fn core_stores_run_on_sqlite() {
        use luna_core::{StorageKeys, VocabularyStore};
        use std::sync::Arc;

        let store = Arc::new(adapter().await);
        let vocabulary = VocabularyStore::new(
            store,
            StorageKeys::default(),
            Arc::new(luna_core::SystemClock),
        );

        vocabulary.add("さくら", "cherry blossom").await.unwrap();
        assert_eq!(vocabulary.count().await, 1);
    }
}
