//! Time utilities for SEP
//!
//! Provides a monotonic timestamp, the [`Clock`] abstraction the protocol
//! reads "now" through, and a periodic [`Timer`] for tick loops.

use parking_lot::Mutex;
use std::ops::{Add, Sub};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Monotonic timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(Instant);

impl Timestamp {
    /// Get the current timestamp
    #[inline]
    pub fn now() -> Self {
        Timestamp(Instant::now())
    }

    #[inline]
    pub fn as_instant(&self) -> Instant {
        self.0
    }

    /// Duration since another timestamp, zero if `earlier` is later
    #[inline]
    pub fn duration_since(&self, earlier: Timestamp) -> Duration {
        self.0.saturating_duration_since(earlier.0)
    }

    /// Elapsed wall time since this timestamp
    #[inline]
    pub fn elapsed(&self) -> Duration {
        self.0.elapsed()
    }
}

impl Add<Duration> for Timestamp {
    type Output = Timestamp;

    fn add(self, duration: Duration) -> Timestamp {
        Timestamp(self.0 + duration)
    }
}

impl Sub<Duration> for Timestamp {
    type Output = Timestamp;

    fn sub(self, duration: Duration) -> Timestamp {
        Timestamp(self.0 - duration)
    }
}

impl Sub for Timestamp {
    type Output = Duration;

    fn sub(self, other: Timestamp) -> Duration {
        self.duration_since(other)
    }
}

/// Source of the current time
pub trait Clock {
    fn now(&self) -> Timestamp;
}

/// Clock backed by the operating system's monotonic clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

/// Clock that only moves when told to
///
/// Clones share the same time, so a test can keep one handle and give another
/// to the code under test.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<Instant>>,
}

impl ManualClock {
    /// Start at the current instant
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    pub fn starting_at(start: Instant) -> Self {
        ManualClock {
            now: Arc::new(Mutex::new(start)),
        }
    }

    /// Move time forward
    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp(*self.now.lock())
    }
}

/// Timer for periodic operations
///
/// Used for tick scheduling, send pacing and statistics output.
#[derive(Debug, Clone)]
pub struct Timer {
    interval: Duration,
    last_fire: Timestamp,
}

impl Timer {
    /// Create a new timer with the given interval, starting now
    pub fn new(interval: Duration) -> Self {
        Self::starting_at(interval, Timestamp::now())
    }

    pub fn starting_at(interval: Duration, start: Timestamp) -> Self {
        Timer {
            interval,
            last_fire: start,
        }
    }

    /// Change the interval without restarting the current period
    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    /// Check if the timer has expired at `now`
    pub fn expired_at(&self, now: Timestamp) -> bool {
        now.duration_since(self.last_fire) >= self.interval
    }

    /// Reset the timer
    pub fn reset(&mut self) {
        self.last_fire = Timestamp::now();
    }

    /// Get time until next expiration
    pub fn time_until_expiration(&self) -> Duration {
        self.interval.saturating_sub(self.last_fire.elapsed())
    }

    /// Fire the timer if expired at `now`, returning true if it fired
    pub fn try_fire_at(&mut self, now: Timestamp) -> bool {
        if self.expired_at(now) {
            self.last_fire = now;
            true
        } else {
            false
        }
    }

    /// Fire the timer if expired, returning true if it fired
    pub fn try_fire(&mut self) -> bool {
        self.try_fire_at(Timestamp::now())
    }
}
