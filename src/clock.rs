//! Clock Module
//!
//! Small seam over wall-clock time so reconnect timing and expiration scores
//! can be tested deterministically.

use chrono::Utc;

// == Clock Trait ==
/// Source of the current wall-clock time in Unix milliseconds.
pub trait Clock: Send + Sync {
    /// Returns the current time as milliseconds since the Unix epoch.
    fn now_unix_ms(&self) -> i64;
}

// == System Clock ==
/// Production clock backed by the system time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}
