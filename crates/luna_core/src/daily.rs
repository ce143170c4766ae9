//! crates/luna_core/src/daily.rs
//!
//! The scenario and encouraging message shown on the home screen. Each is
//! chosen at random once per local calendar day and remembered until the
//! day changes.

use std::sync::Arc;

use rand::seq::IndexedRandom;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use crate::domain::{DailyPick, Scenario};
use crate::keys::{StorageKeys, DATE_FORMAT};
use crate::ports::{Clock, KeyValueStore};
use crate::repository::{read_json, write_json};
use crate::scenarios::ScenarioCatalog;

/// Shown when there is nothing else to show.
pub const FALLBACK_MESSAGE: &str = "今日も一日頑張ろう！";

pub const ENCOURAGING_MESSAGES: &[&str] = &[
    "今日も一日頑張ろう！",
    "すこしずつ、まいにち。",
    "まちがえても だいじょうぶ！",
    "きょうも ルナと はなそう！",
    "Keep going, every word counts.",
    "ちいさな いっぽが おおきな ちからに。",
    "Practice a little every day!",
];

pub struct DailyPicks {
    store: Arc<dyn KeyValueStore>,
    keys: StorageKeys,
    catalog: Arc<ScenarioCatalog>,
    messages: Vec<String>,
    clock: Arc<dyn Clock>,
}

impl DailyPicks {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        keys: StorageKeys,
        catalog: Arc<ScenarioCatalog>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            keys,
            catalog,
            messages: ENCOURAGING_MESSAGES.iter().map(|m| m.to_string()).collect(),
            clock,
        }
    }

    /// Replaces the pool of encouraging messages.
    pub fn with_messages(mut self, messages: Vec<String>) -> Self {
        self.messages = messages;
        self
    }

    /// `None` only when the catalog is empty.
    pub async fn scenario_of_the_day(&self) -> Option<Scenario> {
        let catalog = self.catalog.clone();
        self.pick(&self.keys.daily_scenario, move || {
            catalog.all().choose(&mut rand::rng()).cloned()
        })
        .await
    }

    pub async fn message_of_the_day(&self) -> String {
        let messages = &self.messages;
        self.pick(&self.keys.daily_message, || {
            messages.choose(&mut rand::rng()).cloned()
        })
        .await
        .unwrap_or_else(|| FALLBACK_MESSAGE.to_string())
    }

    async fn pick<T, F>(&self, key: &str, choose: F) -> Option<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Option<T>,
    {
        let today = self.clock.today().format(DATE_FORMAT).to_string();

        match read_json::<DailyPick<T>>(self.store.as_ref(), key).await {
            Ok(Some(stored)) if stored.date == today => return Some(stored.value),
            Ok(_) => {}
            Err(e) => {
                warn!("Failed to read daily pick {}, choosing afresh: {}", key, e);
                return choose();
            }
        }

        let value = choose()?;
        let pick = DailyPick { date: today, value };
        if let Err(e) = write_json(self.store.as_ref(), key, &pick).await {
            warn!("Failed to save daily pick {}: {}", key, e);
        }
        debug!("New daily pick for {} on {}", key, pick.date);
        Some(pick.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{FixedClock, InstrumentedStore};
    use chrono::Duration;

    fn picks(kv: &Arc<InstrumentedStore>, clock: &Arc<FixedClock>) -> DailyPicks {
        DailyPicks::new(
            kv.clone(),
            StorageKeys::default(),
            Arc::new(ScenarioCatalog::builtin()),
            clock.clone(),
        )
    }

    #[tokio::test]
    async fn pick_is_stable_within_a_day() {
        let kv = Arc::new(InstrumentedStore::new());
        let clock = Arc::new(FixedClock::local(2024, 5, 1, 7, 0, 9));
        let picks = picks(&kv, &clock);

        let morning = picks.scenario_of_the_day().await.unwrap();
        clock.advance(Duration::hours(16));
        let night = picks.scenario_of_the_day().await.unwrap();

        assert_eq!(morning, night);
        assert_eq!(
            picks.message_of_the_day().await,
            picks.message_of_the_day().await
        );
    }

    #[tokio::test]
    async fn yesterdays_pick_is_replaced() {
        let kv = Arc::new(InstrumentedStore::with_entries([(
            "dailyScenarioData",
            r#"{"date":"2024-04-30","value":{"id":"retired","icon":"x","text":"Retired","prompt":"gone"}}"#,
        )]));
        let clock = Arc::new(FixedClock::local(2024, 5, 1, 7, 0, 9));

        let today = picks(&kv, &clock).scenario_of_the_day().await.unwrap();

        assert_ne!(today.id, "retired");
        assert!(ScenarioCatalog::builtin().find(&today.id).is_some());
        let stored = kv.get("dailyScenarioData").await.unwrap().unwrap();
        assert!(stored.contains(r#""date":"2024-05-01""#));
    }

    #[tokio::test]
    async fn legacy_message_pick_is_honoured() {
        let kv = Arc::new(InstrumentedStore::with_entries([(
            "dailyEncouragingMessage",
            r#"{"date":"2024-05-01","message":"がんばれ"}"#,
        )]));
        let clock = Arc::new(FixedClock::local(2024, 5, 1, 7, 0, 9));

        assert_eq!(picks(&kv, &clock).message_of_the_day().await, "がんばれ");
    }

    #[tokio::test]
    async fn storage_failure_still_picks() {
        let kv = Arc::new(InstrumentedStore::new());
        kv.fail_reads(true);
        let clock = Arc::new(FixedClock::local(2024, 5, 1, 7, 0, 9));
        let picks = picks(&kv, &clock);

        assert!(picks.scenario_of_the_day().await.is_some());
        assert!(ENCOURAGING_MESSAGES.contains(&picks.message_of_the_day().await.as_str()));
        assert_eq!(kv.writes(), 0);
    }

    #[tokio::test]
    async fn empty_pool_falls_back() {
        let kv = Arc::new(InstrumentedStore::new());
        let clock = Arc::new(FixedClock::local(2024, 5, 1, 7, 0, 9));
        let picks = picks(&kv, &clock).with_messages(Vec::new());

        assert_eq!(picks.message_of_the_day().await, FALLBACK_MESSAGE);
    }
}
