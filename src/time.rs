//! Time abstraction for testability.
//!
//! This module provides a [`Clock`] trait that allows injecting mock clocks
//! in tests while using the real system clock in production.

use std::time::SystemTime;

/// Abstraction over system time for testability.
///
/// The delivery engine stamps every finished attempt with the time
/// returned by its clock.
///
/// # Example
///
/// ```
/// use forge_hooks::time::{Clock, SystemClock};
///
/// let clock = SystemClock;
/// let now = clock.now();
/// assert!(now >= std::time::SystemTime::UNIX_EPOCH);
/// ```
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> SystemTime;

    /// Returns the current time as nanoseconds since the Unix epoch.
    fn now_nanos(&self) -> i64 {
        unix_nanos(self.now())
    }
}

/// Production clock using actual system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Converts a [`SystemTime`] into nanoseconds since the Unix epoch.
///
/// Pre-epoch times map to 0 and times past the `i64` range saturate.
#[must_use]
pub fn unix_nanos(time: SystemTime) -> i64 {
    time.duration_since(SystemTime::UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_nanos()).unwrap_or(i64::MAX))
}
