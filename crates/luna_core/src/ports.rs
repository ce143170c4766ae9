//! crates/luna_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of the concrete key-value store, language model and clock.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Local, NaiveDate, Utc};

use crate::domain::Message;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (storage, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Malformed stored value: {0}")]
    Serialization(String),
    #[error("Language model error: {0}")]
    Upstream(String),
    #[error("Invalid input: {0}")]
    Validation(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Key-Value Store
//=========================================================================================

/// One mutation inside a [`KeyValueStore::write_batch`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    Set { key: String, value: String },
    Remove { key: String },
}

impl WriteOp {
    pub fn set(key: impl Into<String>, value: impl Into<String>) -> Self {
        WriteOp::Set {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn remove(key: impl Into<String>) -> Self {
        WriteOp::Remove { key: key.into() }
    }

    pub fn key(&self) -> &str {
        match self {
            WriteOp::Set { key, .. } | WriteOp::Remove { key } => key,
        }
    }
}

/// A persistent string-to-string store. Values are JSON documents.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> PortResult<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> PortResult<()>;

    async fn remove(&self, key: &str) -> PortResult<()>;

    async fn list_keys(&self) -> PortResult<Vec<String>>;

    /// Reads several keys at once, preserving the order of `keys`.
    async fn get_many(&self, keys: &[String]) -> PortResult<Vec<(String, Option<String>)>> {
        let mut values = Vec::with_capacity(keys.len());
        for key in keys {
            values.push((key.clone(), self.get(key).await?));
        }
        Ok(values)
    }

    /// Applies every operation or none of them.
    async fn write_batch(&self, ops: Vec<WriteOp>) -> PortResult<()>;
}

//=========================================================================================
// Language Model
//=========================================================================================

/// Everything the model needs to produce the next assistant utterance.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// The character setup instruction.
    pub system: String,
    /// Prior messages, oldest first.
    pub history: Vec<Message>,
}

#[async_trait]
pub trait ChatModelService: Send + Sync {
    /// Returns the next assistant reply for the given history.
    async fn reply(&self, request: &ChatRequest) -> PortResult<String>;
}

//=========================================================================================
// Clock
//=========================================================================================

/// Source of "now" and of the local UTC offset that defines calendar days.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// The local offset in effect at `instant`.
    fn offset_at(&self, instant: DateTime<Utc>) -> FixedOffset;

    fn local(&self, instant: DateTime<Utc>) -> DateTime<FixedOffset> {
        instant.with_timezone(&self.offset_at(instant))
    }

    /// The local calendar day containing `instant`.
    fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        self.local(instant).date_naive()
    }

    fn today(&self) -> NaiveDate {
        self.local_date(self.now())
    }
}

/// The system clock in the machine's local time zone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn offset_at(&self, instant: DateTime<Utc>) -> FixedOffset {
        *instant.with_timezone(&Local).offset()
    }
}
