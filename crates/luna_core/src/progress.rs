//! crates/luna_core/src/progress.rs
//!
//! The Progress Engine: derives points, streak, word count and weekly study
//! time from the anchored start date, the vocabulary list and the per-day chat
//! time records, and keeps the aggregate progress blob in step with them.
//!
//! Nothing here propagates an error. Unreadable data is treated as absent and
//! failed writes are logged, so the home screen always has something to show.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use tracing::{debug, info, warn};

use crate::domain::{DailyChatTime, ProgressRecord, StudyDay};
use crate::keys::{StorageKeys, DATE_FORMAT};
use crate::ports::{Clock, KeyValueStore};
use crate::repository::{ProgressBlob, ProgressRepository, VocabularyRepository};

/// Points credited for each day of streak, or for each daily login.
pub const POINTS_PER_DAY: u64 = 10;

/// Number of trailing days covered by the weekly study time.
pub const WEEK_DAYS: i64 = 7;

/// How often a running engine should be ticked.
pub const TICK_INTERVAL: std::time::Duration = std::time::Duration::from_secs(60);

const MS_PER_MINUTE: u64 = 60_000;

//=========================================================================================
// Points Policy
//=========================================================================================

/// How points are awarded. Exactly one policy is active for an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PointsPolicy {
    /// `points = streak * 10`, recomputed on every load and tick.
    #[default]
    StreakDerived,
    /// Stored points plus 10 on the first load of each calendar day.
    DailyLoginBonus,
}

impl FromStr for PointsPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "streak" | "streak_derived" => Ok(PointsPolicy::StreakDerived),
            "daily_login" | "daily_login_bonus" => Ok(PointsPolicy::DailyLoginBonus),
            other => Err(format!("'{}' is not a points policy", other)),
        }
    }
}

//=========================================================================================
// Goals
//=========================================================================================

/// Targets the home screen measures progress against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressGoals {
    pub points: u64,
    pub streak: u64,
    pub minutes: u64,
    pub messages: u64,
}

impl Default for ProgressGoals {
    fn default() -> Self {
        Self {
            points: 2000,
            streak: 30,
            minutes: 300,
            messages: 500,
        }
    }
}

/// Share of `target` reached, as a whole percentage capped at 100.
pub fn percentage(value: u64, target: u64) -> u8 {
    if target == 0 {
        return 0;
    }
    let pct = (value as f64 / target as f64 * 100.0).min(100.0);
    pct.round() as u8
}

/// Renders a duration the way the home screen shows it, e.g. "2 hours 5 minutes".
pub fn format_elapsed(elapsed: Duration) -> String {
    let total_minutes = elapsed.num_minutes().max(0);
    format!("{} hours {} minutes", total_minutes / 60, total_minutes % 60)
}

//=========================================================================================
// The Engine
//=========================================================================================

pub struct ProgressEngine {
    progress: ProgressRepository,
    vocabulary: VocabularyRepository,
    clock: Arc<dyn Clock>,
    policy: PointsPolicy,
    record: ProgressRecord,
    last_login: Option<DateTime<Utc>>,
    /// The blob as last read or written, used to skip redundant writes.
    stored: Option<ProgressBlob>,
}

impl ProgressEngine {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        keys: StorageKeys,
        clock: Arc<dyn Clock>,
        policy: PointsPolicy,
    ) -> Self {
        Self {
            progress: ProgressRepository::new(store.clone(), keys.clone()),
            vocabulary: VocabularyRepository::new(store, keys),
            clock,
            policy,
            record: ProgressRecord::default(),
            last_login: None,
            stored: None,
        }
    }

    /// The current in-memory record, as of the last load or mutation.
    pub fn record(&self) -> &ProgressRecord {
        &self.record
    }

    /// Reads everything from storage and rebuilds the record.
    pub async fn load(&mut self) -> ProgressRecord {
        let blob = match self.progress.load_blob().await {
            Ok(blob) => blob,
            Err(e) => {
                warn!("Failed to read progress data, starting from defaults: {}", e);
                None
            }
        };

        let start = self.resolve_start_date(blob.as_ref()).await;
        let streak = self.streak_since(start);
        self.last_login = blob.as_ref().and_then(ProgressBlob::last_login_instant);

        let points = match self.policy {
            PointsPolicy::StreakDerived => streak * POINTS_PER_DAY,
            PointsPolicy::DailyLoginBonus => {
                let stored_points = blob.as_ref().map(|b| b.points).unwrap_or(0);
                self.apply_login_bonus(stored_points).await
            }
        };

        self.record = ProgressRecord {
            points,
            streak,
            word_count: self.word_count().await,
            sent: blob.as_ref().map(|b| b.sent).unwrap_or(0),
            start_date: Some(start),
            weekly_study_time: self.weekly_study_time().await,
        };
        self.stored = blob;
        self.persist().await;

        debug!("Loaded progress: {:?}", self.record);
        self.record.clone()
    }

    /// Recomputes streak and points from the anchored start date.
    /// Returns whether anything changed.
    pub async fn tick(&mut self) -> bool {
        let Some(start) = self.record.start_date else {
            return false;
        };

        let streak = self.streak_since(start);
        let points = match self.policy {
            PointsPolicy::StreakDerived => streak * POINTS_PER_DAY,
            PointsPolicy::DailyLoginBonus => self.record.points,
        };
        if streak == self.record.streak && points == self.record.points {
            return false;
        }

        info!("Streak advanced from {} to {}", self.record.streak, streak);
        self.record.streak = streak;
        self.record.points = points;
        self.persist().await;
        true
    }

    /// Counts one more message sent by the user.
    pub async fn record_sent_message(&mut self) -> u64 {
        self.record.sent += 1;
        self.persist().await;
        self.record.sent
    }

    /// Adds chat-screen foreground time to today's record.
    pub async fn record_chat_time(&mut self, elapsed: std::time::Duration) {
        let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        if elapsed_ms == 0 {
            return;
        }

        let today = self.clock.today();
        let previous = match self.progress.load_chat_times(&[today]).await {
            Ok(mut loaded) => loaded.pop().and_then(|(_, record)| record),
            Err(e) => {
                warn!("Failed to read today's chat time: {}", e);
                None
            }
        };
        let record = DailyChatTime {
            date: today.format(DATE_FORMAT).to_string(),
            total_ms: previous
                .map(|r| r.total_ms)
                .unwrap_or(0)
                .saturating_add(elapsed_ms),
        };

        if let Err(e) = self.progress.save_chat_time(today, &record).await {
            warn!("Failed to save chat time: {}", e);
            return;
        }

        self.record.weekly_study_time = self.weekly_study_time().await;
        self.persist().await;
    }

    /// Time since the anchored start date, if one is known.
    pub fn time_since_start(&self) -> Option<Duration> {
        self.record
            .start_date
            .map(|start| (self.clock.now() - start).abs())
    }

    //=====================================================================================
    // Derivations
    //=====================================================================================

    async fn resolve_start_date(&self, blob: Option<&ProgressBlob>) -> DateTime<Utc> {
        let stored = match self.progress.load_start_date().await {
            Ok(stored) => stored,
            Err(e) => {
                warn!("Failed to read start date: {}", e);
                None
            }
        };

        if let Some(start) = stored {
            return start;
        }

        let start = match blob.and_then(ProgressBlob::start_instant) {
            Some(start) => start,
            None => {
                let now = self.clock.now();
                info!("No start date recorded, anchoring progress at {}", now);
                now
            }
        };
        if let Err(e) = self.progress.save_start_date(start).await {
            warn!("Failed to save start date: {}", e);
        }
        start
    }

    /// Whole local calendar days between `start` and now.
    fn streak_since(&self, start: DateTime<Utc>) -> u64 {
        let start_day = self.clock.local_date(start);
        (self.clock.today() - start_day).num_days().unsigned_abs()
    }

    async fn apply_login_bonus(&mut self, stored_points: u64) -> u64 {
        if self.last_login.is_none() {
            self.last_login = match self.progress.load_last_login().await {
                Ok(marker) => marker,
                Err(e) => {
                    warn!("Failed to read last login date: {}", e);
                    None
                }
            };
        }

        let today = self.clock.today();
        let already_credited = self
            .last_login
            .is_some_and(|marker| self.clock.local_date(marker) >= today);
        if already_credited {
            return stored_points;
        }

        let midnight = self.local_midnight(today);
        if let Err(e) = self.progress.save_last_login(midnight).await {
            warn!("Failed to save last login date: {}", e);
        }
        self.last_login = Some(midnight);
        info!("Daily login bonus credited for {}", today);
        stored_points + POINTS_PER_DAY
    }

    fn local_midnight(&self, day: NaiveDate) -> DateTime<Utc> {
        let offset = self.clock.offset_at(self.clock.now());
        let local = day.and_time(NaiveTime::MIN);
        offset
            .from_local_datetime(&local)
            .single()
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|| Utc.from_utc_datetime(&local))
    }

    async fn word_count(&self) -> u64 {
        match self.vocabulary.load().await {
            Ok(entries) => entries.map(|e| e.len() as u64).unwrap_or(0),
            Err(e) => {
                warn!("Failed to read vocabulary for word count: {}", e);
                0
            }
        }
    }

    /// The trailing seven local days, oldest first, zero-filled.
    async fn weekly_study_time(&self) -> Vec<StudyDay> {
        let today = self.clock.today();
        let window: Vec<NaiveDate> = (0..WEEK_DAYS)
            .rev()
            .map(|back| today - Duration::days(back))
            .collect();

        let recorded = match self.progress.chat_time_days().await {
            Ok(days) => days,
            Err(e) => {
                warn!("Failed to list chat time records: {}", e);
                Vec::new()
            }
        };
        let in_window: Vec<NaiveDate> = recorded
            .into_iter()
            .filter(|day| window.contains(day))
            .collect();

        let mut totals: HashMap<NaiveDate, u64> = HashMap::new();
        if !in_window.is_empty() {
            match self.progress.load_chat_times(&in_window).await {
                Ok(loaded) => {
                    for (day, record) in loaded {
                        if let Some(record) = record {
                            totals.insert(day, record.total_ms);
                        }
                    }
                }
                Err(e) => warn!("Failed to read chat time records: {}", e),
            }
        }

        window
            .into_iter()
            .map(|date| StudyDay {
                date,
                minutes: rounded_minutes(totals.get(&date).copied().unwrap_or(0)),
            })
            .collect()
    }

    /// Writes the blob if it differs from what storage already holds.
    async fn persist(&mut self) -> bool {
        let blob = ProgressBlob {
            points: self.record.points,
            streak: self.record.streak,
            word_count: self.record.word_count,
            sent: self.record.sent,
            start_date: self.record.start_date.map(|s| s.timestamp_millis()),
            last_login_date: self.last_login.map(|l| l.timestamp_millis()),
            weekly_study_time: self.record.weekly_study_time.clone(),
        };
        if self.stored.as_ref() == Some(&blob) {
            return false;
        }

        match self.progress.save_blob(&blob).await {
            Ok(()) => {
                self.stored = Some(blob);
                true
            }
            Err(e) => {
                warn!("Failed to save progress data: {}", e);
                false
            }
        }
    }
}

fn rounded_minutes(ms: u64) -> u64 {
    (ms + MS_PER_MINUTE / 2) / MS_PER_MINUTE
}
