//! Shared value types for the context hierarchy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Terminal results
// ---------------------------------------------------------------------------

/// Terminal outcome of an operation run under a context.
///
/// Produced by [`crate::Context::get_sync_result`]. Cancellation takes
/// precedence over failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncResult {
    /// The operation completed without errors.
    Success,
    /// The operation completed, but some non-fatal part of it failed.
    PartialSuccess,
    /// The error flag was set and the operation was not cancelled.
    Failure,
    /// The operation was cancelled.
    Cancelled,
}

impl SyncResult {
    /// Returns `true` for [`SyncResult::Success`] and [`SyncResult::PartialSuccess`].
    pub fn successful(self) -> bool {
        matches!(self, SyncResult::Success | SyncResult::PartialSuccess)
    }

    /// Combines the results of two phases, keeping the worse of the two.
    ///
    /// Ordering, worst first: `Cancelled`, `Failure`, `PartialSuccess`, `Success`.
    pub fn combine(first: SyncResult, second: SyncResult) -> SyncResult {
        if first.severity() >= second.severity() {
            first
        } else {
            second
        }
    }

    fn severity(self) -> u8 {
        match self {
            SyncResult::Success => 0,
            SyncResult::PartialSuccess => 1,
            SyncResult::Failure => 2,
            SyncResult::Cancelled => 3,
        }
    }
}

impl std::fmt::Display for SyncResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SyncResult::Success => "success",
            SyncResult::PartialSuccess => "partial success",
            SyncResult::Failure => "failure",
            SyncResult::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A UTC wall-clock timestamp.
///
/// Wraps [`chrono::DateTime<Utc>`] so callers never depend on `chrono` types
/// directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current UTC time as a [`Timestamp`].
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Creates a [`Timestamp`] from a [`DateTime<Utc>`].
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Returns the underlying [`DateTime<Utc>`].
    pub fn as_datetime(self) -> DateTime<Utc> {
        self.0
    }

    /// Formats the time of day as `HH:MM:SS`, used for summary line prefixes.
    pub fn time_of_day(self) -> String {
        self.0.format("%H:%M:%S").to_string()
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}
