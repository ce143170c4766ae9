//! crates/luna_core/src/repository.rs
//!
//! Typed repositories over the `KeyValueStore` port. Each repository owns the
//! (de)serialization of one entity; the components built on top decide how to
//! degrade when a read fails.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::warn;

use crate::domain::{ConversationSummary, DailyChatTime, Message, StudyDay, VocabularyEntry};
use crate::keys::StorageKeys;
use crate::ports::{KeyValueStore, PortError, PortResult, WriteOp};

//=========================================================================================
// JSON helpers
//=========================================================================================

/// Reads and decodes `key`. `Ok(None)` means the slot is absent.
pub async fn read_json<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> PortResult<Option<T>> {
    match store.get(key).await? {
        Some(raw) => decode(key, &raw).map(Some),
        None => Ok(None),
    }
}

pub fn decode<T: DeserializeOwned>(key: &str, raw: &str) -> PortResult<T> {
    serde_json::from_str(raw).map_err(|e| PortError::Serialization(format!("{}: {}", key, e)))
}

pub fn encode<T: Serialize + ?Sized>(value: &T) -> PortResult<String> {
    serde_json::to_string(value).map_err(|e| PortError::Serialization(e.to_string()))
}

pub async fn write_json<T: Serialize + ?Sized>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> PortResult<()> {
    store.set(key, &encode(value)?).await
}

fn millis_to_instant(millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis).single()
}

//=========================================================================================
// "Impure" Stored Record Structs
//=========================================================================================

/// The aggregate progress blob as stored. Unknown legacy fields (such as the old
/// `time` display string) are ignored; missing fields default to zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressBlob {
    #[serde(default)]
    pub points: u64,
    #[serde(default)]
    pub streak: u64,
    #[serde(default)]
    pub word_count: u64,
    #[serde(default)]
    pub sent: u64,
    /// Epoch milliseconds.
    #[serde(default)]
    pub start_date: Option<i64>,
    /// Epoch milliseconds of the local midnight of the last credited day.
    #[serde(default)]
    pub last_login_date: Option<i64>,
    #[serde(default)]
    pub weekly_study_time: Vec<StudyDay>,
}

impl ProgressBlob {
    pub fn start_instant(&self) -> Option<DateTime<Utc>> {
        self.start_date.and_then(millis_to_instant)
    }

    pub fn last_login_instant(&self) -> Option<DateTime<Utc>> {
        self.last_login_date.and_then(millis_to_instant)
    }
}

//=========================================================================================
// Progress
//=========================================================================================

#[derive(Clone)]
pub struct ProgressRepository {
    store: Arc<dyn KeyValueStore>,
    keys: StorageKeys,
}

impl ProgressRepository {
    pub fn new(store: Arc<dyn KeyValueStore>, keys: StorageKeys) -> Self {
        Self { store, keys }
    }

    pub async fn load_blob(&self) -> PortResult<Option<ProgressBlob>> {
        read_json(self.store.as_ref(), &self.keys.progress).await
    }

    pub async fn save_blob(&self, blob: &ProgressBlob) -> PortResult<()> {
        write_json(self.store.as_ref(), &self.keys.progress, blob).await
    }

    pub async fn load_start_date(&self) -> PortResult<Option<DateTime<Utc>>> {
        self.load_instant(&self.keys.start_date).await
    }

    pub async fn save_start_date(&self, start: DateTime<Utc>) -> PortResult<()> {
        self.store
            .set(&self.keys.start_date, &start.timestamp_millis().to_string())
            .await
    }

    pub async fn load_last_login(&self) -> PortResult<Option<DateTime<Utc>>> {
        self.load_instant(&self.keys.last_login).await
    }

    pub async fn save_last_login(&self, midnight: DateTime<Utc>) -> PortResult<()> {
        self.store
            .set(&self.keys.last_login, &midnight.timestamp_millis().to_string())
            .await
    }

    /// Instants are stored as bare epoch-millisecond strings.
    async fn load_instant(&self, key: &str) -> PortResult<Option<DateTime<Utc>>> {
        let Some(raw) = self.store.get(key).await? else {
            return Ok(None);
        };
        let millis = raw
            .trim()
            .parse::<i64>()
            .map_err(|e| PortError::Serialization(format!("{}: {}", key, e)))?;
        millis_to_instant(millis)
            .map(Some)
            .ok_or_else(|| PortError::Serialization(format!("{}: {} is out of range", key, millis)))
    }

    /// Every persisted chat-time day, in no particular order.
    pub async fn chat_time_days(&self) -> PortResult<Vec<NaiveDate>> {
        let keys = self.store.list_keys().await?;
        Ok(keys
            .iter()
            .filter_map(|key| self.keys.parse_chat_time_key(key))
            .collect())
    }

    /// Loads the records for `days`. Entries that are absent or fail to parse
    /// come back as `None`.
    pub async fn load_chat_times(
        &self,
        days: &[NaiveDate],
    ) -> PortResult<Vec<(NaiveDate, Option<DailyChatTime>)>> {
        let keys: Vec<String> = days.iter().map(|d| self.keys.chat_time_key(*d)).collect();
        let values = self.store.get_many(&keys).await?;

        Ok(days
            .iter()
            .zip(values)
            .map(|(day, (key, raw))| {
                let record = raw.and_then(|raw| match decode::<DailyChatTime>(&key, &raw) {
                    Ok(record) => Some(record),
                    Err(e) => {
                        warn!("Ignoring unreadable chat time record: {}", e);
                        None
                    }
                });
                (*day, record)
            })
            .collect())
    }

    pub async fn save_chat_time(&self, day: NaiveDate, record: &DailyChatTime) -> PortResult<()> {
        write_json(self.store.as_ref(), &self.keys.chat_time_key(day), record).await
    }
}

//=========================================================================================
// Conversations
//=========================================================================================

#[derive(Clone)]
pub struct ConversationRepository {
    store: Arc<dyn KeyValueStore>,
    keys: StorageKeys,
}

impl ConversationRepository {
    pub fn new(store: Arc<dyn KeyValueStore>, keys: StorageKeys) -> Self {
        Self { store, keys }
    }

    pub async fn summaries(&self) -> PortResult<Option<Vec<ConversationSummary>>> {
        read_json(self.store.as_ref(), &self.keys.conversation_summaries).await
    }

    pub async fn messages(&self, conversation_id: &str) -> PortResult<Option<Vec<Message>>> {
        read_json(self.store.as_ref(), &self.keys.conversation_key(conversation_id)).await
    }

    pub fn put_summaries(&self, summaries: &[ConversationSummary]) -> PortResult<WriteOp> {
        Ok(WriteOp::set(
            self.keys.conversation_summaries.clone(),
            encode(summaries)?,
        ))
    }

    pub fn put_messages(&self, conversation_id: &str, messages: &[Message]) -> PortResult<WriteOp> {
        Ok(WriteOp::set(
            self.keys.conversation_key(conversation_id),
            encode(messages)?,
        ))
    }

    pub fn remove_messages(&self, conversation_id: &str) -> WriteOp {
        WriteOp::remove(self.keys.conversation_key(conversation_id))
    }

    pub async fn commit(&self, ops: Vec<WriteOp>) -> PortResult<()> {
        self.store.write_batch(ops).await
    }
}

//=========================================================================================
// Vocabulary
//=========================================================================================

#[derive(Clone)]
pub struct VocabularyRepository {
    store: Arc<dyn KeyValueStore>,
    keys: StorageKeys,
}

impl VocabularyRepository {
    pub fn new(store: Arc<dyn KeyValueStore>, keys: StorageKeys) -> Self {
        Self { store, keys }
    }

    pub async fn load(&self) -> PortResult<Option<Vec<VocabularyEntry>>> {
        read_json(self.store.as_ref(), &self.keys.vocabulary).await
    }

    pub async fn save(&self, entries: &[VocabularyEntry]) -> PortResult<()> {
        write_json(self.store.as_ref(), &self.keys.vocabulary, entries).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    #[test]
    fn legacy_progress_blob_parses() {
        let raw = r#"{"points":30,"streak":3,"time":"1 hours 2 minutes","sent":7,"startDate":1700000000000,"lastLoginDate":null}"#;
        let blob: ProgressBlob = decode("progressData", raw).unwrap();
        assert_eq!(blob.points, 30);
        assert_eq!(blob.sent, 7);
        assert_eq!(blob.word_count, 0);
        assert_eq!(blob.start_instant().unwrap().timestamp_millis(), 1_700_000_000_000);
        assert!(blob.last_login_instant().is_none());
    }

    #[tokio::test]
    async fn start_date_is_stored_as_bare_millis() {
        let store = Arc::new(MemoryStore::new());
        let repo = ProgressRepository::new(store.clone(), StorageKeys::default());
        let start = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();

        repo.save_start_date(start).await.unwrap();

        assert_eq!(
            store.get("chatStartDate").await.unwrap().as_deref(),
            Some("1700000000123")
        );
        assert_eq!(repo.load_start_date().await.unwrap(), Some(start));
    }

    #[tokio::test]
    async fn garbage_start_date_is_a_serialization_error() {
        let store = Arc::new(MemoryStore::with_entries([("chatStartDate", "soon")]));
        let repo = ProgressRepository::new(store, StorageKeys::default());
        assert!(matches!(
            repo.load_start_date().await,
            Err(PortError::Serialization(_))
        ));
    }

    #[tokio::test]
    async fn unreadable_chat_time_entries_come_back_empty() {
        let store = Arc::new(MemoryStore::with_entries([
            ("chatTime_2024-01-02", r#"{"date":"2024-01-02","totalMs":120000}"#),
            ("chatTime_2024-01-03", "not json"),
        ]));
        let repo = ProgressRepository::new(store, StorageKeys::default());
        let mut days = repo.chat_time_days().await.unwrap();
        days.sort();

        let loaded = repo.load_chat_times(&days).await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].1.as_ref().map(|r| r.total_ms), Some(120_000));
        assert!(loaded[1].1.is_none());
    }

    #[tokio::test]
    async fn absent_vocabulary_is_none() {
        let repo = VocabularyRepository::new(Arc::new(MemoryStore::new()), StorageKeys::default());
        assert_eq!(repo.load().await.unwrap(), None);
    }
}
