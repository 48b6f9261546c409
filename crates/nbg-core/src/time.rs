//! Time utilities for nbgate
//!
//! Session and idle bookkeeping uses Unix milliseconds so records can be
//! serialized and compared without carrying `Instant`s around.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Get the current Unix timestamp in milliseconds.
///
/// # Panics
/// Panics if the system time is before the Unix epoch (1970-01-01),
/// which would indicate a severely misconfigured system.
///
/// # Examples
/// ```
/// use nbg_core::time::current_time_millis;
///
/// let now = current_time_millis();
/// assert!(now > 0);
/// ```
pub fn current_time_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time before UNIX epoch")
        .as_millis() as u64
}

/// Millisecond length of a duration, saturating at `u64::MAX`
pub fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Milliseconds between `since` and `now`.
///
/// Returns 0 if `since` is after `now`.
pub fn millis_between(since: u64, now: u64) -> u64 {
    now.saturating_sub(since)
}
