pub mod chat_llm;
pub mod sqlite_kv;

pub use chat_llm::OpenAiChatAdapter;
pub use sqlite_kv::SqliteKvAdapter;
