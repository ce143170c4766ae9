//! crates/luna_core/src/vocabulary.rs
//!
//! The user's personal word list.

use std::sync::Arc;

use tracing::{info, warn};

use crate::domain::VocabularyEntry;
use crate::keys::StorageKeys;
use crate::ports::{Clock, KeyValueStore, PortError, PortResult};
use crate::repository::VocabularyRepository;

pub struct VocabularyStore {
    repo: VocabularyRepository,
    clock: Arc<dyn Clock>,
}

impl VocabularyStore {
    pub fn new(store: Arc<dyn KeyValueStore>, keys: StorageKeys, clock: Arc<dyn Clock>) -> Self {
        Self {
            repo: VocabularyRepository::new(store, keys),
            clock,
        }
    }

    /// Adds a word. Both fields are trimmed and must be non-empty; a rejected
    /// entry performs no I/O.
    pub async fn add(&self, word: &str, meaning: &str) -> PortResult<VocabularyEntry> {
        let (word, meaning) = (word.trim(), meaning.trim());
        if word.is_empty() || meaning.is_empty() {
            return Err(PortError::Validation(
                "Please enter both word and meaning.".to_string(),
            ));
        }

        let mut entries = self.repo.load().await?.unwrap_or_default();
        let entry = VocabularyEntry {
            id: self.next_id(&entries),
            word: word.to_string(),
            meaning: meaning.to_string(),
        };
        entries.push(entry.clone());
        self.repo.save(&entries).await?;

        info!("Added vocabulary entry {} ({})", entry.id, entry.word);
        Ok(entry)
    }

    /// Removes the entry with `id`. Returns whether one was removed.
    pub async fn remove(&self, id: &str) -> PortResult<bool> {
        let mut entries = self.repo.load().await?.unwrap_or_default();
        let before = entries.len();
        entries.retain(|e| e.id != id);
        if entries.len() == before {
            return Ok(false);
        }
        self.repo.save(&entries).await?;
        Ok(true)
    }

    pub async fn load_all(&self) -> Vec<VocabularyEntry> {
        match self.repo.load().await {
            Ok(entries) => entries.unwrap_or_default(),
            Err(e) => {
                warn!("Failed to load vocabulary: {}", e);
                Vec::new()
            }
        }
    }

    pub async fn count(&self) -> usize {
        self.load_all().await.len()
    }

    /// Creation time in epoch millis, moved past any id already in use.
    fn next_id(&self, entries: &[VocabularyEntry]) -> String {
        let now = self.clock.now().timestamp_millis();
        let newest = entries
            .iter()
            .filter_map(|e| e.id.parse::<i64>().ok())
            .max();
        match newest {
            Some(newest) if newest >= now => (newest + 1).to_string(),
            _ => now.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{FixedClock, InstrumentedStore};

    fn fixture() -> (Arc<InstrumentedStore>, Arc<FixedClock>, VocabularyStore) {
        let kv = Arc::new(InstrumentedStore::new());
        let clock = Arc::new(FixedClock::local(2024, 5, 1, 9, 0, 9));
        let store = VocabularyStore::new(kv.clone(), StorageKeys::default(), clock.clone());
        (kv, clock, store)
    }

    #[tokio::test]
    async fn add_trims_and_persists() {
        let (_kv, clock, store) = fixture();

        let entry = store.add("  ねこ ", " cat\n").await.unwrap();

        assert_eq!(entry.word, "ねこ");
        assert_eq!(entry.meaning, "cat");
        assert_eq!(entry.id, clock.now().timestamp_millis().to_string());
        assert_eq!(store.load_all().await, vec![entry]);
    }

    #[tokio::test]
    async fn empty_meaning_is_rejected_without_io() {
        let (kv, _clock, store) = fixture();

        let result = store.add("いぬ", "   ").await;

        assert!(matches!(result, Err(PortError::Validation(_))));
        assert_eq!(kv.writes(), 0);
        assert!(store.load_all().await.is_empty());
    }

    #[tokio::test]
    async fn ids_stay_unique_within_one_millisecond() {
        let (_kv, _clock, store) = fixture();

        let first = store.add("やま", "mountain").await.unwrap();
        let second = store.add("かわ", "river").await.unwrap();

        assert_ne!(first.id, second.id);
        assert_eq!(store.count().await, 2);
    }

    #[tokio::test]
    async fn remove_filters_by_id() {
        let (_kv, clock, store) = fixture();
        let keep = store.add("あめ", "rain").await.unwrap();
        clock.advance(chrono::Duration::seconds(1));
        let gone = store.add("ゆき", "snow").await.unwrap();

        assert!(store.remove(&gone.id).await.unwrap());
        assert!(!store.remove("missing").await.unwrap());
        assert_eq!(store.load_all().await, vec![keep]);
    }

    #[tokio::test]
    async fn corrupt_list_loads_as_empty() {
        let kv = Arc::new(InstrumentedStore::with_entries([("userVocabulary", "{")]));
        let store = VocabularyStore::new(
            kv,
            StorageKeys::default(),
            Arc::new(FixedClock::local(2024, 5, 1, 9, 0, 9)),
        );
        assert!(store.load_all().await.is_empty());
    }
}
