//! Timestamp Registry Module
//!
//! Torn-free storage for the three instants shared between the reconnect
//! breaker and the connection manager. These fields are touched on every
//! operation that fails, so they are plain atomics rather than a mutex.

use std::sync::atomic::{AtomicI64, Ordering};

/// Sentinel for "unset". Zero is the Unix epoch, which is never a meaningful
/// connect or error instant for a live process.
const UNSET: i64 = 0;

// == Time Fields ==
/// The instants tracked by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeField {
    /// When the current connection (or most recent attempt) was established
    LastConnect,
    /// When the current unbroken run of transient errors began
    FirstError,
    /// When the most recent transient error was observed
    PreviousError,
}

// == Timestamp Registry ==
/// Atomic storage for the shared instants.
///
/// Concurrent readers always observe either the old or the new value of a
/// field, never a bit-mixed one. The three fields are independent signals;
/// no ordering between them is guaranteed or required.
#[derive(Debug)]
pub struct TimestampRegistry {
    last_connect: AtomicI64,
    first_error: AtomicI64,
    previous_error: AtomicI64,
}

impl TimestampRegistry {
    /// Creates a registry with `LastConnect` initialized to `now_unix_ms`
    /// and both error fields unset.
    pub fn new(now_unix_ms: i64) -> Self {
        Self {
            last_connect: AtomicI64::new(now_unix_ms),
            first_error: AtomicI64::new(UNSET),
            previous_error: AtomicI64::new(UNSET),
        }
    }

    /// Reads a field. Returns `None` if the field is unset.
    pub fn read(&self, field: TimeField) -> Option<i64> {
        let raw = self.slot(field).load(Ordering::Acquire);
        (raw != UNSET).then_some(raw)
    }

    /// Writes a field; `None` marks it unset.
    pub fn write(&self, field: TimeField, instant_ms: Option<i64>) {
        self.slot(field)
            .store(instant_ms.unwrap_or(UNSET), Ordering::Release);
    }

    fn slot(&self, field: TimeField) -> &AtomicI64 {
        match field {
            TimeField::LastConnect => &self.last_connect,
            TimeField::FirstError => &self.first_error,
            TimeField::PreviousError => &self.previous_error,
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_registry_state() {
        let registry = TimestampRegistry::new(1_000);
        assert_eq!(registry.read(TimeField::LastConnect), Some(1_000));
        assert_eq!(registry.read(TimeField::FirstError), None);
        assert_eq!(registry.read(TimeField::PreviousError), None);
    }

    #[test]
    fn test_write_and_read_back() {
        let registry = TimestampRegistry::new(1_000);
        registry.write(TimeField::FirstError, Some(2_500));
        assert_eq!(registry.read(TimeField::FirstError), Some(2_500));
    }

    #[test]
    fn test_write_unset_clears_field() {
        let registry = TimestampRegistry::new(1_000);
        registry.write(TimeField::PreviousError, Some(2_500));
        registry.write(TimeField::PreviousError, None);
        assert_eq!(registry.read(TimeField::PreviousError), None);
    }

    #[test]
    fn test_fields_are_independent() {
        let registry = TimestampRegistry::new(10);
        registry.write(TimeField::FirstError, Some(20));
        registry.write(TimeField::PreviousError, Some(30));
        assert_eq!(registry.read(TimeField::LastConnect), Some(10));
        assert_eq!(registry.read(TimeField::FirstError), Some(20));
        assert_eq!(registry.read(TimeField::PreviousError), Some(30));
    }
}
