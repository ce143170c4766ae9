//! crates/luna_core/src/preferences.rs
//!
//! Settings-screen and onboarding state: the user's profile, whether the
//! survey was completed and what it answered, and the reminder toggle.
//! Reads fall back to defaults; writes are user-initiated and report failure.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::warn;

use crate::domain::{CharacterLevel, UserSettings};
use crate::keys::StorageKeys;
use crate::ports::{KeyValueStore, PortResult, WriteOp};
use crate::repository::{encode, read_json, write_json};

/// Free-form survey answers. `q3` holds the character level label.
pub type SurveyAnswers = Map<String, Value>;

pub const CHARACTER_LEVEL_ANSWER: &str = "q3";

const TRUE: &str = "true";
const FALSE: &str = "false";

pub struct Preferences {
    store: Arc<dyn KeyValueStore>,
    keys: StorageKeys,
}

impl Preferences {
    pub fn new(store: Arc<dyn KeyValueStore>, keys: StorageKeys) -> Self {
        Self { store, keys }
    }

    pub async fn user_settings(&self) -> UserSettings {
        match read_json(self.store.as_ref(), &self.keys.user_settings).await {
            Ok(settings) => settings.unwrap_or_default(),
            Err(e) => {
                warn!("Failed to load user settings: {}", e);
                UserSettings::default()
            }
        }
    }

    pub async fn save_user_settings(&self, settings: &UserSettings) -> PortResult<()> {
        write_json(self.store.as_ref(), &self.keys.user_settings, settings).await
    }

    /// The name to greet the user with: the saved setting, else the survey's
    /// `username` answer.
    pub async fn display_name(&self) -> Option<String> {
        if let Some(name) = self.user_settings().await.username.filter(|n| !n.is_empty()) {
            return Some(name);
        }
        self.survey_answers()
            .await
            .get("username")
            .and_then(Value::as_str)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
    }

    pub async fn has_completed_survey(&self) -> bool {
        self.flag(&self.keys.survey_completed).await
    }

    /// Stores the answers and marks the survey as done in one batch.
    pub async fn complete_survey(&self, answers: &SurveyAnswers) -> PortResult<()> {
        self.store
            .write_batch(vec![
                WriteOp::set(self.keys.survey_answers.clone(), encode(answers)?),
                WriteOp::set(self.keys.survey_completed.clone(), TRUE),
            ])
            .await
    }

    pub async fn survey_answers(&self) -> SurveyAnswers {
        match read_json::<SurveyAnswers>(self.store.as_ref(), &self.keys.survey_answers).await {
            Ok(Some(answers)) => answers,
            Ok(None) => default_answers(),
            Err(e) => {
                warn!("Failed to load survey answers: {}", e);
                default_answers()
            }
        }
    }

    pub async fn character_level(&self) -> CharacterLevel {
        self.survey_answers()
            .await
            .get(CHARACTER_LEVEL_ANSWER)
            .and_then(Value::as_str)
            .and_then(CharacterLevel::from_label)
            .unwrap_or_default()
    }

    /// Rewrites `q3`, keeping every other answer.
    pub async fn set_character_level(&self, level: CharacterLevel) -> PortResult<SurveyAnswers> {
        let mut answers = self.survey_answers().await;
        answers.insert(
            CHARACTER_LEVEL_ANSWER.to_string(),
            Value::String(level.label().to_string()),
        );
        write_json(self.store.as_ref(), &self.keys.survey_answers, &answers).await?;
        Ok(answers)
    }

    pub async fn reminders_enabled(&self) -> bool {
        self.flag(&self.keys.reminders_enabled).await
    }

    pub async fn set_reminders_enabled(&self, enabled: bool) -> PortResult<()> {
        let value = if enabled { TRUE } else { FALSE };
        self.store.set(&self.keys.reminders_enabled, value).await
    }

    async fn flag(&self, key: &str) -> bool {
        match self.store.get(key).await {
            Ok(value) => value.as_deref() == Some(TRUE),
            Err(e) => {
                warn!("Failed to read {}: {}", key, e);
                false
            }
        }
    }
}

fn default_answers() -> SurveyAnswers {
    let mut answers = Map::new();
    answers.insert(
        CHARACTER_LEVEL_ANSWER.to_string(),
        Value::String(CharacterLevel::default().label().to_string()),
    );
    answers
}
