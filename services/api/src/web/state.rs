//! services/api/src/web/state.rs
//!
//! Defines the application's shared and session-specific states.

use crate::config::Config;
use chrono::{DateTime, Utc};
use luna_core::{
    ChatModelService, Clock, ConversationStore, DailyPicks, KeyValueStore, Preferences,
    ProgressEngine, ScenarioCatalog, StorageKeys, VocabularyStore,
};
use std::sync::Arc;
use tokio::{sync::Mutex, task::JoinHandle};
use tokio_util::sync::CancellationToken;

//=========================================================================================
// AppState (Shared Across All Connections)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub clock: Arc<dyn Clock>,
    pub catalog: Arc<ScenarioCatalog>,
    /// Mutated by loads, ticks and the chat screen, so access is serialized.
    pub progress: Arc<Mutex<ProgressEngine>>,
    pub conversations: Arc<ConversationStore>,
    pub vocabulary: Arc<VocabularyStore>,
    pub preferences: Arc<Preferences>,
    pub daily: Arc<DailyPicks>,
    /// `None` when no API key is configured; sending is then rejected.
    pub chat_model: Option<Arc<dyn ChatModelService>>,
    /// Cancelled on shutdown. Every chat session holds a child of it.
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Wires every core component over one store and one clock.
    pub fn new(
        config: Arc<Config>,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        chat_model: Option<Arc<dyn ChatModelService>>,
    ) -> Self {
        let keys = StorageKeys::default();
        let catalog = Arc::new(ScenarioCatalog::builtin());

        let progress = ProgressEngine::new(
            store.clone(),
            keys.clone(),
            clock.clone(),
            config.points_policy,
        );
        let conversations =
            ConversationStore::new(store.clone(), keys.clone(), catalog.clone(), clock.clone());
        let vocabulary = VocabularyStore::new(store.clone(), keys.clone(), clock.clone());
        let preferences = Preferences::new(store.clone(), keys.clone());
        let daily = DailyPicks::new(store, keys, catalog.clone(), clock.clone());

        Self {
            config,
            clock,
            catalog,
            progress: Arc::new(Mutex::new(progress)),
            conversations: Arc::new(conversations),
            vocabulary: Arc::new(vocabulary),
            preferences: Arc::new(preferences),
            daily: Arc::new(daily),
            chat_model,
            shutdown: CancellationToken::new(),
        }
    }
}

//=========================================================================================
// ChatSession (Specific to One WebSocket Connection)
//=========================================================================================

/// The state for a single, active chat connection.
pub struct ChatSession {
    pub conversation_id: String,
    /// Cancelled when the connection closes; late replies check it and are dropped.
    pub cancellation_token: CancellationToken,
    /// When the chat screen came to the foreground, by the app clock.
    pub opened_at: DateTime<Utc>,
    /// The model request currently in flight, if any.
    pub pending_reply: Option<JoinHandle<()>>,
}

impl ChatSession {
    pub fn new(app_state: &AppState, conversation_id: String) -> Self {
        Self {
            conversation_id,
            cancellation_token: app_state.shutdown.child_token(),
            opened_at: app_state.clock.now(),
            pending_reply: None,
        }
    }

    /// Foreground time so far, never negative.
    pub fn foreground(&self, app_state: &AppState) -> std::time::Duration {
        (app_state.clock.now() - self.opened_at)
            .to_std()
            .unwrap_or_default()
    }

    /// Whether a reply is still being awaited.
    pub fn is_awaiting_reply(&self) -> bool {
        self.pending_reply
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}
