pub mod conversations;
pub mod daily;
pub mod domain;
pub mod keys;
pub mod memory;
pub mod persona;
pub mod ports;
pub mod preferences;
pub mod progress;
pub mod repository;
pub mod scenarios;
pub mod test_utils;
pub mod vocabulary;

pub use conversations::{ConversationStore, TIMESTAMP_FORMAT};
pub use daily::DailyPicks;
pub use domain::{
    CharacterLevel, ConversationSummary, DailyChatTime, DailyPick, Message, ProgressRecord,
    Scenario, Sender, StudyDay, UserSettings, VocabularyEntry,
};
pub use keys::StorageKeys;
pub use memory::MemoryStore;
pub use ports::{
    ChatModelService, ChatRequest, Clock, KeyValueStore, PortError, PortResult, SystemClock,
    WriteOp,
};
pub use preferences::{Preferences, SurveyAnswers};
pub use progress::{PointsPolicy, ProgressEngine, ProgressGoals};
pub use scenarios::ScenarioCatalog;
pub use vocabulary::VocabularyStore;
