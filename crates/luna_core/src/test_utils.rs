//! Test utilities for luna_core
//!
//! Deterministic stand-ins for the clock, the key-value store and the language
//! model, shared by the unit tests here and the service crate's tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, FixedOffset, TimeZone, Utc};

use crate::memory::MemoryStore;
use crate::ports::{
    ChatModelService, ChatRequest, Clock, KeyValueStore, PortError, PortResult, WriteOp,
};

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
    offset: FixedOffset,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>, offset: FixedOffset) -> Self {
        Self {
            now: Mutex::new(now),
            offset,
        }
    }

    /// A clock reading the given local wall time at `offset_hours` east of UTC.
    ///
    /// # Panics
    ///
    /// Panics if the date or offset is invalid.
    pub fn local(
        year: i32,
        month: u32,
        day: u32,
        hour: u32,
        minute: u32,
        offset_hours: i32,
    ) -> Self {
        let offset = FixedOffset::east_opt(offset_hours * 3600).expect("valid offset");
        let local = offset
            .with_ymd_and_hms(year, month, day, hour, minute, 0)
            .single()
            .expect("valid local time");
        Self::new(local.with_timezone(&Utc), offset)
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }

    fn offset_at(&self, _instant: DateTime<Utc>) -> FixedOffset {
        self.offset
    }
}

/// A `MemoryStore` that counts writes and can be told to fail.
#[derive(Debug, Default)]
pub struct InstrumentedStore {
    inner: MemoryStore,
    writes: AtomicUsize,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl InstrumentedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            inner: MemoryStore::with_entries(entries),
            ..Self::default()
        }
    }

    /// Number of successful `set`, `remove` and `write_batch` calls.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_read(&self) -> PortResult<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(PortError::Storage("injected read failure".to_string()));
        }
        Ok(())
    }

    fn check_write(&self) -> PortResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(PortError::Storage("injected write failure".to_string()));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for InstrumentedStore {
    async fn get(&self, key: &str) -> PortResult<Option<String>> {
        self.check_read()?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> PortResult<()> {
        self.check_write()?;
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> PortResult<()> {
        self.check_write()?;
        self.inner.remove(key).await
    }

    async fn list_keys(&self) -> PortResult<Vec<String>> {
        self.check_read()?;
        self.inner.list_keys().await
    }

    async fn write_batch(&self, ops: Vec<WriteOp>) -> PortResult<()> {
        self.check_write()?;
        self.inner.write_batch(ops).await
    }
}

/// A chat model that plays back a fixed list of replies.
#[derive(Debug, Default)]
pub struct ScriptedChatModel {
    replies: Mutex<VecDeque<PortResult<String>>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedChatModel {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(|r| Ok(r.into())).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queues a failure to be returned by the next call.
    pub fn push_failure(&self, message: &str) {
        self.replies
            .lock()
            .unwrap()
            .push_back(Err(PortError::Upstream(message.to_string())));
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModelService for ScriptedChatModel {
    async fn reply(&self, request: &ChatRequest) -> PortResult<String> {
        self.requests.lock().unwrap().push(request.clone());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok("はい".to_string()))
    }
}
