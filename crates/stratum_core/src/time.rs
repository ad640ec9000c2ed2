//! Time types for stratum.
//!
//! The engine never reads the wall clock on its own. Every lifecycle
//! call is handed a [`Timestamp`], usually taken from a [`Clock`] owned
//! by the caller.

use crate::error::CoreError;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, Ordering};

/// Wall clock instant with millisecond precision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Create from a chrono instant
    #[must_use]
    pub const fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Create from milliseconds since the Unix epoch
    ///
    /// # Errors
    ///
    /// Returns error if the value is outside chrono's representable range
    pub fn from_millis(millis: i64) -> Result<Self, CoreError> {
        Utc.timestamp_millis_opt(millis)
            .single()
            .map(Self)
            .ok_or_else(|| CoreError::InvalidTimestamp {
                reason: format!("{} ms is out of range", millis),
            })
    }

    /// Parse an RFC 3339 string such as `2026-01-01T00:00:00Z`
    ///
    /// # Errors
    ///
    /// Returns error if the string is not RFC 3339
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| Self(dt.with_timezone(&Utc)))
            .map_err(|e| CoreError::InvalidTimestamp {
                reason: format!("{}: {}", s, e),
            })
    }

    /// Get current timestamp
    #[must_use]
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Milliseconds since the Unix epoch
    #[must_use]
    pub fn as_millis(&self) -> i64 {
        self.0.timestamp_millis()
    }

    /// Get the underlying chrono instant
    #[must_use]
    pub const fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Shift by a number of seconds (negative moves backwards)
    #[must_use]
    pub fn plus_secs(&self, secs: i64) -> Self {
        Self(self.0 + Duration::seconds(secs))
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }
}

/// Source of timestamps for lifecycle operations
pub trait Clock: Send + Sync {
    /// Current instant
    fn now(&self) -> Timestamp;
}

/// Clock backed by the system wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

/// Manually advanced clock for deterministic tests and replays
#[derive(Debug)]
pub struct ManualClock {
    millis: AtomicI64,
}

impl ManualClock {
    /// Create a clock frozen at the given instant
    #[must_use]
    pub fn new(start: Timestamp) -> Self {
        Self {
            millis: AtomicI64::new(start.as_millis()),
        }
    }

    /// Move the clock forward
    pub fn advance_secs(&self, secs: i64) {
        self.millis.fetch_add(secs * 1_000, Ordering::SeqCst);
    }

    /// Jump to an absolute instant
    pub fn set(&self, at: Timestamp) {
        self.millis.store(at.as_millis(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        let millis = self.millis.load(Ordering::SeqCst);
        // Only ever stores values that came out of a valid Timestamp.
        Timestamp::from_millis(millis).unwrap_or_else(|_| Timestamp::from_datetime(DateTime::<Utc>::UNIX_EPOCH))
    }
}
