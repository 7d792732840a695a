//! Minute-boundary alignment for the probe loop.

use std::time::Duration;

use chrono::{Timelike, Utc};

/// Seconds in one probe cycle.
pub const CYCLE_SECONDS: u64 = 60;

/// The first run never happens sooner than this after start.
pub const MIN_INITIAL_WAIT_SECONDS: u64 = 30;

/// Source of wall-clock time and sleeping for the scheduler.
pub trait Clock: Send + Sync + 'static {
    /// Current second within the UTC minute, normally `0..=59`.
    fn second_of_minute(&self) -> u32;

    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn second_of_minute(&self) -> u32 {
        Utc::now().second()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Seconds until the next minute boundary.
pub fn wait_time(second_of_minute: u32) -> u64 {
    CYCLE_SECONDS.saturating_sub(u64::from(second_of_minute))
}

/// Seconds until the first run: the next minute boundary, or the one after
/// it when the next one is 30 seconds away or closer.
pub fn initial_wait_time(second_of_minute: u32) -> u64 {
    let remaining = wait_time(second_of_minute);
    if remaining > MIN_INITIAL_WAIT_SECONDS {
        return remaining;
    }

    remaining + CYCLE_SECONDS
}
