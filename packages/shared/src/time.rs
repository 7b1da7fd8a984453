//! Time-related utilities with clock abstraction for testability.

use chrono::{DateTime, Local, TimeZone, Utc};

/// Clock trait for dependency injection and testing
pub trait Clock: Send + Sync {
    /// Get the current instant in UTC
    fn now(&self) -> DateTime<Utc>;
}

/// System clock implementation (uses actual system time)
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Fixed clock implementation for testing (returns a fixed time)
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    fixed_time: DateTime<Utc>,
}

impl FixedClock {
    /// Create a new fixed clock with the given instant
    pub fn new(fixed_time: DateTime<Utc>) -> Self {
        Self { fixed_time }
    }

    /// Create a new fixed clock from a Unix timestamp in milliseconds
    ///
    /// Out-of-range values fall back to the Unix epoch.
    pub fn from_millis(fixed_time_millis: i64) -> Self {
        Self::new(millis_to_datetime(fixed_time_millis).unwrap_or_default())
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.fixed_time
    }
}

/// Convert a Unix timestamp (milliseconds) to a UTC datetime
pub fn millis_to_datetime(timestamp_millis: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(timestamp_millis).single()
}

/// Format a datetime as RFC 3339 in UTC
pub fn to_rfc3339(datetime: &DateTime<Utc>) -> String {
    datetime.to_rfc3339()
}

/// Format a datetime as a short local wall-clock time (`HH:MM`)
pub fn to_local_clock_time(datetime: &DateTime<Utc>) -> String {
    datetime.with_timezone(&Local).format("%H:%M").to_string()
}
