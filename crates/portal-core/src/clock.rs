//! Time sources for freshness evaluation.
//!
//! Batch-updated data is regenerated by a nightly backend job, so its freshness
//! ends at the next *local* midnight. [`Clock`] bundles "what time is it" with
//! "when is the next local midnight" so tests can pin both.

use chrono::{DateTime, FixedOffset, Local, NaiveDate, Offset, TimeDelta, TimeZone, Utc};
use std::fmt::Debug;
use std::sync::{Mutex, PoisonError};

/// Source of the current time and of the local day boundary.
pub trait Clock: Send + Sync + Debug {
    /// Returns the current instant.
    fn now(&self) -> DateTime<Utc>;

    /// Returns the first local midnight strictly after `after`.
    fn next_midnight(&self, after: DateTime<Utc>) -> DateTime<Utc>;
}

/// Computes the first midnight in `tz` strictly after `after`.
///
/// When midnight does not exist on that day (a DST gap), the first valid local
/// instant of the day is used instead.
pub fn next_midnight_in<Tz: TimeZone>(after: DateTime<Utc>, tz: &Tz) -> DateTime<Utc> {
    let local_day = after.with_timezone(tz).date_naive();
    let next_day = local_day.succ_opt().unwrap_or(NaiveDate::MAX);

    (0..24)
        .filter_map(|hour| next_day.and_hms_opt(hour, 0, 0))
        .find_map(|naive| tz.from_local_datetime(&naive).earliest())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| after + TimeDelta::days(1))
}

/// Wall clock in the host's local time zone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    /// Create a new system clock.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn next_midnight(&self, after: DateTime<Utc>) -> DateTime<Utc> {
        next_midnight_in(after, &Local)
    }
}

/// Manually driven clock with a fixed UTC offset, for tests and replays.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
    offset: FixedOffset,
}

impl ManualClock {
    /// Creates a clock stopped at `now`, using `offset` as local time.
    #[must_use]
    pub const fn new(now: DateTime<Utc>, offset: FixedOffset) -> Self {
        Self {
            now: Mutex::new(now),
            offset,
        }
    }

    /// Creates a UTC clock stopped at `now`.
    #[must_use]
    pub fn utc(now: DateTime<Utc>) -> Self {
        Self::new(now, Utc.fix())
    }

    /// Moves the clock to `now`.
    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = now;
    }

    /// Moves the clock forward by `delta`.
    pub fn advance(&self, delta: TimeDelta) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += delta;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_midnight(&self, after: DateTime<Utc>) -> DateTime<Utc> {
        next_midnight_in(after, &self.offset)
    }
}
