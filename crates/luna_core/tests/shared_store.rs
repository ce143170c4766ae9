//! The stores and the Progress Engine sharing one in-memory key-value store.

use std::sync::Arc;

use chrono::Duration;
use luna_core::{
    test_utils::FixedClock, ConversationStore, KeyValueStore, MemoryStore, Message, PointsPolicy,
    ProgressEngine, ScenarioCatalog, StorageKeys, VocabularyStore,
};

struct World {
    store: Arc<MemoryStore>,
    clock: Arc<FixedClock>,
    conversations: ConversationStore,
    vocabulary: VocabularyStore,
}

fn world() -> World {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(FixedClock::local(2024, 5, 1, 20, 15, 9));
    let keys = StorageKeys::default();
    World {
        conversations: ConversationStore::new(
            store.clone(),
            keys.clone(),
            Arc::new(ScenarioCatalog::builtin()),
            clock.clone(),
        ),
        vocabulary: VocabularyStore::new(store.clone(), keys, clock.clone()),
        store,
        clock,
    }
}

fn engine(world: &World) -> ProgressEngine {
    ProgressEngine::new(
        world.store.clone(),
        StorageKeys::default(),
        world.clock.clone(),
        PointsPolicy::StreakDerived,
    )
}

#[tokio::test]
async fn progress_follows_vocabulary_and_chat_time() {
    let w = world();
    let mut progress = engine(&w);
    assert_eq!(progress.load().await.word_count, 0);

    w.vocabulary.add("水", "water").await.unwrap();
    let tree = w.vocabulary.add("木", "tree").await.unwrap();
    progress
        .record_chat_time(std::time::Duration::from_secs(4 * 60))
        .await;

    let record = engine(&w).load().await;
    assert_eq!(record.word_count, 2);
    assert_eq!(record.weekly_study_time.last().map(|d| d.minutes), Some(4));

    assert!(w.vocabulary.remove(&tree.id).await.unwrap());
    w.clock.advance(Duration::days(2));
    let record = engine(&w).load().await;
    assert_eq!(record.word_count, 1);
    assert_eq!(record.streak, 2);
    assert_eq!(record.points, 20);
    // The chat time has moved two slots back in the week.
    assert_eq!(record.weekly_study_time[4].minutes, 4);
}

#[tokio::test]
async fn summaries_track_the_latest_message() {
    let w = world();
    let a = w.conversations.create_conversation(None).await.unwrap();
    let b = w.conversations.create_conversation(None).await.unwrap();

    w.conversations
        .append_message(&a.id, Message::user("おはよう", "20:15"))
        .await
        .unwrap();
    w.conversations
        .append_message(&a.id, Message::ai("おはようございます！", "20:16"))
        .await
        .unwrap();

    let summaries = w.conversations.list_summaries().await;
    assert_eq!(summaries.len(), 2);
    assert_eq!(summaries[0].id, b.id);
    assert_eq!(summaries[1].last_message, "おはようございます！");
    assert_eq!(summaries[1].timestamp, "20:16");
    assert_eq!(w.conversations.load_messages(&a.id).await.len(), 2);

    w.conversations.delete_conversation(&a.id).await.unwrap();
    let keys = w.store.list_keys().await.unwrap();
    assert!(!keys.iter().any(|k| k.ends_with(&a.id)));
    assert_eq!(w.conversations.list_summaries().await.len(), 1);
}
