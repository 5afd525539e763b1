use chrono::{DateTime, FixedOffset, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Time Helper Types
// ============================================================================

/// Duration helper type for time intervals
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Duration(pub chrono::Duration);

impl Duration {
    pub fn seconds(secs: i64) -> Self {
        Self(chrono::Duration::seconds(secs))
    }

    pub fn milliseconds(ms: i64) -> Self {
        Self(chrono::Duration::milliseconds(ms))
    }

    pub fn as_seconds(&self) -> i64 {
        self.0.num_seconds()
    }

    pub fn as_milliseconds(&self) -> i64 {
        self.0.num_milliseconds()
    }

    pub fn inner(&self) -> chrono::Duration {
        self.0
    }
}

impl From<chrono::Duration> for Duration {
    fn from(d: chrono::Duration) -> Self {
        Self(d)
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.as_seconds();
        write!(f, "{}s", secs)
    }
}

/// Timestamp helper type for specific points in time.
/// Wraps `DateTime<FixedOffset>` so the rest of the domain doesn't depend on
/// a particular timezone representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(pub DateTime<FixedOffset>);

impl Timestamp {
    pub fn now() -> Self {
        Self(chrono::Utc::now().fixed_offset())
    }

    pub fn duration_since(&self, other: &Timestamp) -> Duration {
        Duration(self.0 - other.0)
    }

    pub fn elapsed_ms(&self) -> i64 {
        Self::now().duration_since(self).as_milliseconds()
    }

    pub fn hour(&self) -> u32 {
        self.0.hour()
    }

    pub fn date_str(&self) -> String {
        self.0.format("%Y-%m-%d").to_string()
    }

    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339()
    }

    pub fn inner(&self) -> DateTime<FixedOffset> {
        self.0
    }
}

impl From<DateTime<FixedOffset>> for Timestamp {
    fn from(dt: DateTime<FixedOffset>) -> Self {
        Self(dt)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d %H:%M:%S %Z"))
    }
}
