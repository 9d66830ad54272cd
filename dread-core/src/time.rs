//! Time utilities: clocks, interval scaling, quiet hours.
//!
//! All timestamps are UTC. Quiet hours are evaluated in the service timezone,
//! on the wall clock, and are never scaled.

use std::sync::{Arc, Mutex};

use anyhow::Result;
use chrono::{DateTime, Duration, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Source of "now" for the engine.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

impl<T: Clock + ?Sized> Clock for Arc<T> {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to. Used by tests and simulations.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = at;
    }

    pub fn advance(&self, by: Duration) -> DateTime<Utc> {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
        *now
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Uniform compression of every interval, for accelerated runs.
///
/// A factor of 240 turns the 20 minute first nudge into 5 seconds and the
/// 24 hour horizon into 6 minutes. Ordering between intervals is preserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimeScale(u32);

impl TimeScale {
    pub const REAL_TIME: TimeScale = TimeScale(1);

    pub fn new(factor: u32) -> Result<Self> {
        if factor == 0 {
            anyhow::bail!("time scale factor must be >= 1");
        }
        Ok(Self(factor))
    }

    pub fn factor(&self) -> u32 {
        self.0
    }

    pub fn is_real_time(&self) -> bool {
        self.0 == 1
    }

    /// Nominal duration -> wall-clock duration.
    pub fn compress(&self, nominal: Duration) -> Duration {
        Duration::milliseconds(nominal.num_milliseconds() / i64::from(self.0.max(1)))
    }

    /// Wall-clock duration -> nominal duration.
    pub fn expand(&self, actual: Duration) -> Duration {
        Duration::milliseconds(actual.num_milliseconds().saturating_mul(i64::from(self.0.max(1))))
    }
}

impl Default for TimeScale {
    fn default() -> Self {
        Self::REAL_TIME
    }
}

/// Nightly window in which nothing may be delivered.
///
/// `start > end` means the window wraps midnight (the default 23:00-07:00).
/// `start == end` disables quiet hours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuietHours {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl QuietHours {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, t: NaiveTime) -> bool {
        if self.start == self.end {
            false
        } else if self.start < self.end {
            t >= self.start && t < self.end
        } else {
            t >= self.start || t < self.end
        }
    }

    /// Push `at` to the end of the quiet window if it falls inside it.
    ///
    /// Returns `None` only if the local end time cannot be resolved in `tz`.
    pub fn defer(&self, at: DateTime<Utc>, tz: Tz) -> Option<DateTime<Utc>> {
        let local = at.with_timezone(&tz);
        let t = local.time();
        if !self.contains(t) {
            return Some(at);
        }

        let mut day = local.date_naive();
        if self.start > self.end && t >= self.start {
            day = day.succ_opt()?;
        }
        resolve_local(tz, day.and_time(self.end))
    }
}

impl Default for QuietHours {
    fn default() -> Self {
        Self {
            start: NaiveTime::from_hms_opt(23, 0, 0).unwrap_or_default(),
            end: NaiveTime::from_hms_opt(7, 0, 0).unwrap_or_default(),
        }
    }
}

/// Parse an `HH:MM` wall-clock time.
pub fn parse_hhmm(s: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M")
        .map_err(|e| anyhow::anyhow!("invalid time '{s}' (expected HH:MM): {e}"))
}

pub fn parse_tz(tz: &str) -> Result<Tz> {
    tz.parse()
        .map_err(|_| anyhow::anyhow!("invalid timezone: {tz}"))
}

/// Map a local wall-clock time to UTC, stepping over DST gaps.
fn resolve_local(tz: Tz, naive: NaiveDateTime) -> Option<DateTime<Utc>> {
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(naive + Duration::hours(1))).earliest())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Parse a local time like "2026-02-20 22:50" in an IANA tz like "America/Chicago",
/// returning UTC.
pub fn parse_local_to_utc(local: &str, tz: &str) -> Result<DateTime<Utc>> {
    let tz = parse_tz(tz)?;

    let ndt = NaiveDateTime::parse_from_str(local, "%Y-%m-%d %H:%M")
        .map_err(|e| anyhow::anyhow!("invalid local datetime '{local}': {e}"))?;

    let local_dt = tz
        .from_local_datetime(&ndt)
        .single()
        .ok_or_else(|| anyhow::anyhow!("ambiguous or invalid local time (DST?): {local} {tz}"))?;

    Ok(local_dt.with_timezone(&Utc))
}

/// Render a duration as a short human string ("2h 05m", "45s").
pub fn humanize(d: Duration) -> String {
    let secs = d.num_seconds().max(0);
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{h}h {m:02}m")
    } else if m > 0 {
        format!("{m}m {s:02}s")
    } else {
        format!("{s}s")
    }
}
