//! crates/luna_core/src/keys.rs
//!
//! Names every logical storage slot. A `StorageKeys` value is handed to each
//! store at construction instead of sharing module-level constants.

use chrono::NaiveDate;

/// Format used for calendar-day suffixes and daily-pick dates.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageKeys {
    pub progress: String,
    pub start_date: String,
    pub last_login: String,
    pub vocabulary: String,
    pub conversation_summaries: String,
    pub conversation_prefix: String,
    pub chat_time_prefix: String,
    pub user_settings: String,
    pub survey_answers: String,
    pub survey_completed: String,
    pub reminders_enabled: String,
    pub daily_scenario: String,
    pub daily_message: String,
}

impl Default for StorageKeys {
    fn default() -> Self {
        Self {
            progress: "progressData".to_string(),
            start_date: "chatStartDate".to_string(),
            last_login: "lastLoginDate".to_string(),
            vocabulary: "userVocabulary".to_string(),
            conversation_summaries: "_conversationSummaries_".to_string(),
            conversation_prefix: "chatConversation_".to_string(),
            chat_time_prefix: "chatTime_".to_string(),
            user_settings: "userSettings".to_string(),
            survey_answers: "surveyAnswers".to_string(),
            survey_completed: "hasCompletedSurvey".to_string(),
            reminders_enabled: "notificationRemindersEnabled".to_string(),
            daily_scenario: "dailyScenarioData".to_string(),
            daily_message: "dailyEncouragingMessage".to_string(),
        }
    }
}

impl StorageKeys {
    /// The slot holding one conversation's message list.
    pub fn conversation_key(&self, conversation_id: &str) -> String {
        format!("{}{}", self.conversation_prefix, conversation_id)
    }

    /// The slot holding one day's accumulated chat time.
    pub fn chat_time_key(&self, date: NaiveDate) -> String {
        format!("{}{}", self.chat_time_prefix, date.format(DATE_FORMAT))
    }

    /// Recovers the calendar day from a chat-time key, if `key` is one.
    pub fn parse_chat_time_key(&self, key: &str) -> Option<NaiveDate> {
        let suffix = key.strip_prefix(&self.chat_time_prefix)?;
        NaiveDate::parse_from_str(suffix, DATE_FORMAT).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_time_keys_round_trip() {
        let keys = StorageKeys::default();
        let day = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        let key = keys.chat_time_key(day);
        assert_eq!(key, "chatTime_2024-03-09");
        assert_eq!(keys.parse_chat_time_key(&key), Some(day));
    }

    #[test]
    fn unrelated_keys_are_not_chat_time() {
        let keys = StorageKeys::default();
        assert_eq!(keys.parse_chat_time_key("progressData"), None);
        assert_eq!(keys.parse_chat_time_key("chatTime_yesterday"), None);
    }

    #[test]
    fn conversation_key_uses_prefix() {
        let keys = StorageKeys::default();
        assert_eq!(keys.conversation_key("abc"), "chatConversation_abc");
    }
}
