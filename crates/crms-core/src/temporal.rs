//! # Temporal Types: UTC Timestamps, Effective Windows, Clocks
//!
//! `Timestamp` is a UTC-only instant with microsecond precision, the
//! resolution of a PostgreSQL `timestamptz`. It renders as
//! `YYYY-MM-DDTHH:MM:SSZ`, with a fractional part only when it is non-zero
//! (`2026-02-01T00:00:00.800Z`). `EffectiveWindow` is the half-open interval
//! `[from, to)` a published version applies to. `Clock` is the injectable
//! source of "now" used for `published_at` and record creation times.
//!
//! Input parsing is lenient: RFC 3339 strings with any offset are converted
//! to UTC, and offset-less datetimes (`2026-01-01T00:00:00`) or bare dates
//! (`2026-01-01`, meaning midnight) are read as UTC. Input finer than a
//! microsecond is rejected rather than rounded.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Timelike, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::CoreError;

/// A UTC-only timestamp with microsecond precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Current UTC time, at microsecond resolution.
    pub fn now() -> Self {
        Self(truncate_to_micros(Utc::now()))
    }

    /// From a `DateTime<Utc>` produced by a clock or read from storage.
    ///
    /// Digits below a microsecond are dropped. Caller-supplied strings go
    /// through [`parse`](Self::parse) or [`parse_lenient`](Self::parse_lenient),
    /// which reject them instead.
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(truncate_to_micros(dt))
    }

    /// From a `DateTime<Utc>`, refusing sub-microsecond precision.
    fn exact(dt: DateTime<Utc>, input: &str) -> Result<Self, CoreError> {
        if dt.nanosecond() % 1_000 != 0 {
            return Err(invalid(input, "precision finer than one microsecond"));
        }
        Ok(Self(dt))
    }

    /// Parse a strict `...Z` RFC 3339 timestamp.
    ///
    /// # Errors
    ///
    /// Rejects anything without the `Z` suffix, including `+00:00`.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        if !s.ends_with('Z') {
            return Err(invalid(s, "timestamp must use Z suffix (UTC only)"));
        }
        let dt = DateTime::parse_from_rfc3339(s).map_err(|e| invalid(s, e))?;
        Self::exact(dt.with_timezone(&Utc), s)
    }

    /// Parse any RFC 3339 timestamp, an offset-less datetime, or a bare date.
    ///
    /// Offsets are converted to UTC; inputs without an offset are taken as
    /// UTC already.
    pub fn parse_lenient(s: &str) -> Result<Self, CoreError> {
        let s = s.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Self::exact(dt.with_timezone(&Utc), s);
        }
        for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
            if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
                return Self::exact(naive.and_utc(), s);
            }
        }
        match NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            Ok(date) => date
                .and_hms_opt(0, 0, 0)
                .map(|naive| Self(naive.and_utc()))
                .ok_or_else(|| invalid(s, "date out of range")),
            Err(e) => Err(invalid(s, e)),
        }
    }

    /// From Unix epoch seconds.
    pub fn from_epoch_secs(secs: i64) -> Result<Self, CoreError> {
        DateTime::from_timestamp(secs, 0)
            .map(Self)
            .ok_or_else(|| invalid(&secs.to_string(), "epoch seconds out of range"))
    }

    /// Access the inner `DateTime<Utc>`.
    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Unix epoch seconds.
    pub fn epoch_secs(&self) -> i64 {
        self.0.timestamp()
    }

    /// Render as ISO 8601 with Z suffix (e.g. `2026-01-15T12:00:00Z`).
    ///
    /// A non-zero fraction is printed with 3 or 6 digits
    /// (`2026-01-15T12:00:00.250Z`).
    pub fn to_iso8601(&self) -> String {
        self.0.format("%Y-%m-%dT%H:%M:%S%.fZ").to_string()
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_iso8601())
    }
}

impl std::str::FromStr for Timestamp {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_lenient(s)
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Self::from_utc(dt)
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_iso8601())
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse_lenient(&s).map_err(serde::de::Error::custom)
    }
}

fn truncate_to_micros(dt: DateTime<Utc>) -> DateTime<Utc> {
    dt.with_nanosecond(dt.nanosecond() / 1_000 * 1_000)
        .unwrap_or(dt)
}

fn invalid(input: &str, reason: impl std::fmt::Display) -> CoreError {
    CoreError::InvalidTimestamp {
        input: input.to_string(),
        reason: reason.to_string(),
    }
}

/// The half-open interval `[from, to)` during which a version applies.
///
/// `to == None` means unbounded: the window is open and the version is the
/// active one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EffectiveWindow {
    /// Inclusive start.
    pub from: Timestamp,
    /// Exclusive end, or `None` when open-ended.
    pub to: Option<Timestamp>,
}

impl EffectiveWindow {
    /// An open-ended window starting at `from`.
    pub fn open(from: Timestamp) -> Self {
        Self { from, to: None }
    }

    /// Whether `at` falls inside `[from, to)`.
    pub fn covers(&self, at: Timestamp) -> bool {
        self.from <= at && self.to.map_or(true, |to| to > at)
    }

    /// Whether the window has no end.
    pub fn is_open(&self) -> bool {
        self.to.is_none()
    }

    /// Whether the window covers `at` or any instant after it.
    pub fn extends_past(&self, at: Timestamp) -> bool {
        self.to.map_or(true, |to| to > at)
    }

    /// Close the window at `at`, never before its own start.
    pub fn closed_at(&self, at: Timestamp) -> Self {
        Self {
            from: self.from,
            to: Some(at.max(self.from)),
        }
    }
}

/// Source of the current instant.
pub trait Clock: Send + Sync {
    /// The current instant, UTC, microsecond precision.
    fn now(&self) -> Timestamp;
}

/// The wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

/// A clock that returns a settable instant.
#[derive(Debug)]
pub struct FixedClock(Mutex<Timestamp>);

impl FixedClock {
    /// A clock frozen at `at`.
    pub fn new(at: Timestamp) -> Self {
        Self(Mutex::new(at))
    }

    /// Move the clock to `at`.
    pub fn set(&self, at: Timestamp) {
        *self.0.lock() = at;
    }

    /// Move the clock forward by `secs` seconds.
    pub fn advance_secs(&self, secs: i64) {
        let mut guard = self.0.lock();
        *guard = Timestamp::from_utc(*guard.as_datetime() + Duration::seconds(secs));
    }
}

impl Clock for FixedClock {
    fn now(&self) -> Timestamp {
        *self.0.lock()
    }
}
