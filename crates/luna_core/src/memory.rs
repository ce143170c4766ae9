//! crates/luna_core/src/memory.rs
//!
//! An in-process implementation of the `KeyValueStore` port. Used for ephemeral
//! runs and as the backing store in tests.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::ports::{KeyValueStore, PortError, PortResult, WriteOp};

/// A `KeyValueStore` held entirely in memory. Contents are lost on drop.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with `entries`.
    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let entries = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            entries: Mutex::new(entries),
        }
    }

    fn lock(&self) -> PortResult<MutexGuard<'_, BTreeMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|_| PortError::Storage("memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> PortResult<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> PortResult<()> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> PortResult<()> {
        self.lock()?.remove(key);
        Ok(())
    }

    async fn list_keys(&self) -> PortResult<Vec<String>> {
        Ok(self.lock()?.keys().cloned().collect())
    }

    async fn write_batch(&self, ops: Vec<WriteOp>) -> PortResult<()> {
        // A single guard covers the whole batch, so readers never see half of it.
        let mut entries = self.lock()?;
        for op in ops {
            match op {
                WriteOp::Set { key, value } => {
                    entries.insert(key, value);
                }
                WriteOp::Remove { key } => {
                    entries.remove(&key);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_set_remove() {
        let store = MemoryStore::new();
        assert_eq!(store.get("a").await.unwrap(), None);

        store.set("a", "1").await.unwrap();
        assert_eq!(store.get("a").await.unwrap().as_deref(), Some("1"));

        store.remove("a").await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn get_many_preserves_requested_order() {
        let store = MemoryStore::with_entries([("b", "2"), ("a", "1")]);
        let values = store
            .get_many(&["b".to_string(), "missing".to_string(), "a".to_string()])
            .await
            .unwrap();
        assert_eq!(
            values,
            vec![
                ("b".to_string(), Some("2".to_string())),
                ("missing".to_string(), None),
                ("a".to_string(), Some("1".to_string())),
            ]
        );
    }

    #[tokio::test]
    async fn write_batch_applies_in_order() {
        let store = MemoryStore::with_entries([("gone", "x")]);
        store
            .write_batch(vec![
                WriteOp::set("k", "first"),
                WriteOp::set("k", "second"),
                WriteOp::remove("gone"),
            ])
            .await
            .unwrap();

        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("second"));
        assert_eq!(store.list_keys().await.unwrap(), vec!["k".to_string()]);
    }
}
