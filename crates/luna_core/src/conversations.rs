//! crates/luna_core/src/conversations.rs
//!
//! The Conversation Store: per-conversation message lists plus the summaries
//! list the chat screen renders. Every mutation that touches both goes through
//! a single `write_batch`, so a message list never exists without its summary.

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{ConversationSummary, Message};
use crate::keys::StorageKeys;
use crate::ports::{Clock, KeyValueStore, PortResult};
use crate::repository::ConversationRepository;
use crate::scenarios::ScenarioCatalog;

/// Display format for message and summary timestamps.
pub const TIMESTAMP_FORMAT: &str = "%H:%M";

pub struct ConversationStore {
    repo: ConversationRepository,
    catalog: Arc<ScenarioCatalog>,
    clock: Arc<dyn Clock>,
}

impl ConversationStore {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        keys: StorageKeys,
        catalog: Arc<ScenarioCatalog>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repo: ConversationRepository::new(store, keys),
            catalog,
            clock,
        }
    }

    /// The current local wall time, formatted for display.
    pub fn timestamp(&self) -> String {
        self.clock
            .local(self.clock.now())
            .format(TIMESTAMP_FORMAT)
            .to_string()
    }

    /// Starts a new conversation and puts its summary at the front of the list.
    ///
    /// A prompt that matches a catalog scenario gives the summary that
    /// scenario's title and icon; anything else gets the generic participant.
    /// The opening assistant message is fetched separately by the caller.
    pub async fn create_conversation(
        &self,
        initial_prompt: Option<&str>,
    ) -> PortResult<ConversationSummary> {
        let id = Uuid::new_v4().to_string();
        let mut summary = ConversationSummary::generic(id, self.timestamp());
        if let Some(scenario) = initial_prompt.and_then(|p| self.catalog.find_by_prompt(p)) {
            summary.text = Some(scenario.text.clone());
            summary.icon = Some(scenario.icon.clone());
            summary.initial_prompt = Some(scenario.prompt.clone());
        }

        let mut summaries = self.repo.summaries().await?.unwrap_or_default();
        summaries.insert(0, summary.clone());
        self.repo
            .commit(vec![self.repo.put_summaries(&summaries)?])
            .await?;

        info!("Created conversation {} ({})", summary.id, summary.title());
        Ok(summary)
    }

    /// Appends `message` and refreshes the conversation's summary in place.
    pub async fn append_message(&self, conversation_id: &str, message: Message) -> PortResult<()> {
        let mut messages = self
            .repo
            .messages(conversation_id)
            .await?
            .unwrap_or_default();
        let mut summaries = self.repo.summaries().await?.unwrap_or_default();

        match summaries.iter_mut().find(|s| s.id == conversation_id) {
            Some(summary) => {
                summary.last_message = message.text.clone();
                summary.timestamp = message.timestamp.clone();
            }
            None => {
                warn!(
                    "No summary for conversation {}, synthesizing one",
                    conversation_id
                );
                let mut summary =
                    ConversationSummary::generic(conversation_id, message.timestamp.clone());
                summary.last_message = message.text.clone();
                summaries.insert(0, summary);
            }
        }
        messages.push(message);

        self.repo
            .commit(vec![
                self.repo.put_messages(conversation_id, &messages)?,
                self.repo.put_summaries(&summaries)?,
            ])
            .await
    }

    /// The persisted messages for `conversation_id`, oldest first. Never fails.
    pub async fn load_messages(&self, conversation_id: &str) -> Vec<Message> {
        match self.repo.messages(conversation_id).await {
            Ok(messages) => messages.unwrap_or_default(),
            Err(e) => {
                warn!(
                    "Failed to load messages for conversation {}: {}",
                    conversation_id, e
                );
                Vec::new()
            }
        }
    }

    /// Removes the message list and the summary together.
    pub async fn delete_conversation(&self, conversation_id: &str) -> PortResult<()> {
        let mut summaries = self.repo.summaries().await?.unwrap_or_default();
        summaries.retain(|s| s.id != conversation_id);

        self.repo
            .commit(vec![
                self.repo.remove_messages(conversation_id),
                self.repo.put_summaries(&summaries)?,
            ])
            .await?;

        info!("Deleted conversation {}", conversation_id);
        Ok(())
    }

    pub async fn list_summaries(&self) -> Vec<ConversationSummary> {
        match self.repo.summaries().await {
            Ok(summaries) => summaries.unwrap_or_default(),
            Err(e) => {
                warn!("Failed to load conversation summaries: {}", e);
                Vec::new()
            }
        }
    }

    pub async fn summary(&self, conversation_id: &str) -> Option<ConversationSummary> {
        match self.find_summary(conversation_id).await {
            Ok(summary) => summary,
            Err(e) => {
                warn!("Failed to load conversation summaries: {}", e);
                None
            }
        }
    }

    /// Like `summary`, but an unreadable summary list is an error rather than
    /// a missing conversation.
    pub async fn find_summary(
        &self,
        conversation_id: &str,
    ) -> PortResult<Option<ConversationSummary>> {
        Ok(self
            .repo
            .summaries()
            .await?
            .unwrap_or_default()
            .into_iter()
            .find(|s| s.id == conversation_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DEFAULT_PARTICIPANT;
    use crate::test_utils::{FixedClock, InstrumentedStore};

    fn store_over(store: &Arc<InstrumentedStore>) -> ConversationStore {
        ConversationStore::new(
            store.clone(),
            StorageKeys::default(),
            Arc::new(ScenarioCatalog::builtin()),
            Arc::new(FixedClock::local(2024, 5, 1, 9, 41, 9)),
        )
    }

    #[tokio::test]
    async fn generic_conversation_starts_empty() {
        let kv = Arc::new(InstrumentedStore::new());
        let store = store_over(&kv);

        let summary = store.create_conversation(None).await.unwrap();

        assert!(Uuid::parse_str(&summary.id).is_ok());
        assert_eq!(summary.title(), DEFAULT_PARTICIPANT);
        assert_eq!(summary.timestamp, "09:41");
        assert!(store.load_messages(&summary.id).await.is_empty());
        assert_eq!(store.list_summaries().await, vec![summary]);
    }

    #[tokio::test]
    async fn scenario_prompt_sets_title_and_icon() {
        let kv = Arc::new(InstrumentedStore::new());
        let store = store_over(&kv);
        let weather = ScenarioCatalog::builtin().find("weather").cloned().unwrap();

        let summary = store.create_conversation(Some(&weather.prompt)).await.unwrap();

        assert_eq!(summary.title(), "Weather");
        assert_eq!(summary.icon.as_deref(), Some("sunny-outline"));
        assert_eq!(summary.initial_prompt.as_deref(), Some(weather.prompt.as_str()));
    }

    #[tokio::test]
    async fn unknown_prompt_gets_generic_title() {
        let kv = Arc::new(InstrumentedStore::new());
        let store = store_over(&kv);

        let summary = store
            .create_conversation(Some("Let's talk about volcanoes"))
            .await
            .unwrap();

        assert_eq!(summary.title(), DEFAULT_PARTICIPANT);
        assert!(summary.icon.is_none());
    }

    #[tokio::test]
    async fn newest_conversation_is_listed_first() {
        let kv = Arc::new(InstrumentedStore::new());
        let store = store_over(&kv);

        let older = store.create_conversation(None).await.unwrap();
        let newer = store.create_conversation(None).await.unwrap();

        let ids: Vec<String> = store.list_summaries().await.into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![newer.id, older.id]);
    }

    #[tokio::test]
    async fn appended_messages_load_in_order() {
        let kv = Arc::new(InstrumentedStore::new());
        let store = store_over(&kv);
        let id = store.create_conversation(None).await.unwrap().id;
        let sent = vec![
            Message::ai("こんにちは", "09:41"),
            Message::user("konnichiwa", "09:42"),
            Message::ai("おなまえは？", "09:42"),
        ];

        for message in sent.clone() {
            store.append_message(&id, message).await.unwrap();
        }

        assert_eq!(store.load_messages(&id).await, sent);
    }

    #[tokio::test]
    async fn summary_tracks_last_message_only() {
        let kv = Arc::new(InstrumentedStore::new());
        let store = store_over(&kv);
        let prompt = ScenarioCatalog::builtin().find("anime").cloned().unwrap().prompt;
        let before = store.create_conversation(Some(&prompt)).await.unwrap();

        for n in 1..=3 {
            let message = Message::user(format!("message {}", n), format!("10:0{}", n));
            store.append_message(&before.id, message).await.unwrap();
        }

        let after = store.summary(&before.id).await.unwrap();
        assert_eq!(after.last_message, "message 3");
        assert_eq!(after.timestamp, "10:03");
        assert_eq!(
            ConversationSummary {
                last_message: before.last_message.clone(),
                timestamp: before.timestamp.clone(),
                ..after
            },
            before
        );
    }

    #[tokio::test]
    async fn appending_to_unknown_id_synthesizes_summary() {
        let kv = Arc::new(InstrumentedStore::new());
        let store = store_over(&kv);

        store
            .append_message("legacy", Message::user("hello", "08:00"))
            .await
            .unwrap();

        let summary = store.summary("legacy").await.unwrap();
        assert_eq!(summary.participant_name, DEFAULT_PARTICIPANT);
        assert_eq!(summary.last_message, "hello");
        assert_eq!(store.list_summaries().await.len(), 1);
    }

    #[tokio::test]
    async fn failed_append_changes_nothing() {
        let kv = Arc::new(InstrumentedStore::new());
        let store = store_over(&kv);
        let id = store.create_conversation(None).await.unwrap().id;

        kv.fail_writes(true);
        assert!(store
            .append_message(&id, Message::user("lost", "09:50"))
            .await
            .is_err());
        kv.fail_writes(false);

        assert!(store.load_messages(&id).await.is_empty());
        assert_eq!(store.summary(&id).await.unwrap().last_message, "");
    }

    #[tokio::test]
    async fn delete_removes_messages_and_summary() {
        let kv = Arc::new(InstrumentedStore::new());
        let store = store_over(&kv);
        let keep = store.create_conversation(None).await.unwrap().id;
        let doomed = store.create_conversation(None).await.unwrap().id;
        store
            .append_message(&doomed, Message::user("bye", "11:00"))
            .await
            .unwrap();

        store.delete_conversation(&doomed).await.unwrap();

        assert!(store.load_messages(&doomed).await.is_empty());
        assert!(kv
            .get(&format!("chatConversation_{}", doomed))
            .await
            .unwrap()
            .is_none());
        let remaining = store.list_summaries().await;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, keep);
    }

    #[tokio::test]
    async fn delete_failure_is_reported() {
        let kv = Arc::new(InstrumentedStore::new());
        let store = store_over(&kv);
        let id = store.create_conversation(None).await.unwrap().id;

        kv.fail_writes(true);
        assert!(store.delete_conversation(&id).await.is_err());
        kv.fail_writes(false);

        assert!(store.summary(&id).await.is_some());
    }

    #[tokio::test]
    async fn unreadable_store_degrades_reads() {
        let kv = Arc::new(InstrumentedStore::with_entries([
            ("_conversationSummaries_", "[{"),
            ("chatConversation_x", "nope"),
        ]));
        let store = store_over(&kv);

        assert!(store.list_summaries().await.is_empty());
        assert!(store.load_messages("x").await.is_empty());
    }

    #[tokio::test]
    async fn find_summary_separates_missing_from_unreadable() {
        let kv = Arc::new(InstrumentedStore::new());
        let store = store_over(&kv);
        let id = store.create_conversation(None).await.unwrap().id;

        assert_eq!(store.find_summary(&id).await.unwrap().map(|s| s.id), Some(id.clone()));
        assert!(store.find_summary("gone").await.unwrap().is_none());

        kv.fail_reads(true);
        assert!(store.find_summary(&id).await.is_err());
        assert!(store.summary(&id).await.is_none());
    }
}
