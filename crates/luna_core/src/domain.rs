//! crates/luna_core/src/domain.rs
//!
//! Defines the core data structures for the application.
//! Records that live in the key-value store serialize with the camelCase field
//! names the mobile client already writes.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Participant name shown for every conversation with the tutor character.
pub const DEFAULT_PARTICIPANT: &str = "Luna";

/// The reconciled progress metrics shown on the home screen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressRecord {
    pub points: u64,
    /// Elapsed local calendar days since `start_date`.
    pub streak: u64,
    pub word_count: u64,
    /// Number of messages the user has sent.
    pub sent: u64,
    pub start_date: Option<DateTime<Utc>>,
    /// Trailing seven local days, oldest first, today last.
    pub weekly_study_time: Vec<StudyDay>,
}

/// Minutes of chat time on one calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudyDay {
    pub date: NaiveDate,
    pub minutes: u64,
}

/// Accumulated chat-screen foreground time for one local calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyChatTime {
    pub date: String,
    #[serde(default)]
    pub total_ms: u64,
}

/// Who wrote a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Ai,
}

/// A single chat message. Immutable once appended to a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub text: String,
    pub sender: Sender,
    /// Display string, e.g. "09:41".
    pub timestamp: String,
}

impl Message {
    pub fn user(text: impl Into<String>, timestamp: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            sender: Sender::User,
            timestamp: timestamp.into(),
        }
    }

    pub fn ai(text: impl Into<String>, timestamp: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            sender: Sender::Ai,
            timestamp: timestamp.into(),
        }
    }
}

/// Lightweight per-conversation metadata used by the chat list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub id: String,
    pub participant_name: String,
    #[serde(default)]
    pub last_message: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl ConversationSummary {
    /// A summary carrying only the generic participant name.
    pub fn generic(id: impl Into<String>, timestamp: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            participant_name: DEFAULT_PARTICIPANT.to_string(),
            last_message: String::new(),
            timestamp: timestamp.into(),
            avatar_url: None,
            icon: None,
            initial_prompt: None,
            text: None,
        }
    }

    /// The title the chat list displays: the scenario text, else the participant.
    pub fn title(&self) -> &str {
        self.text.as_deref().unwrap_or(&self.participant_name)
    }
}

/// A word the user saved, with its meaning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VocabularyEntry {
    pub id: String,
    pub word: String,
    pub meaning: String,
}

/// A predefined topic used to seed a new conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    pub id: String,
    pub icon: String,
    pub text: String,
    pub prompt: String,
}

/// Profile settings edited on the settings screen.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSettings {
    #[serde(default)]
    pub profile_image_uri: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

/// Which writing systems Luna may use, chosen in the onboarding survey.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CharacterLevel {
    #[default]
    Romaji,
    Hiragana,
    Katakana,
    Kanji,
}

impl CharacterLevel {
    pub const ALL: [CharacterLevel; 4] = [
        CharacterLevel::Romaji,
        CharacterLevel::Hiragana,
        CharacterLevel::Katakana,
        CharacterLevel::Kanji,
    ];

    /// The label stored in the survey answers.
    pub fn label(self) -> &'static str {
        match self {
            CharacterLevel::Romaji => "Level 1 romaji",
            CharacterLevel::Hiragana => "Level 2 also hiragana",
            CharacterLevel::Katakana => "Level 3 also katakana",
            CharacterLevel::Kanji => "Level 4 also kanji",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|level| level.label() == label)
    }
}

/// A value chosen once per local calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyPick<T> {
    pub date: String,
    #[serde(alias = "message")]
    pub value: T,
}
