//! Time source for expiry decisions.
//!
//! Every comparison against `exp` or `fexp` goes through a [`Clock`] so tests
//! can walk a credential through its whole lifetime without sleeping.

use std::sync::atomic::{AtomicI64, Ordering};

use time::{Duration, OffsetDateTime};

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// Returns the current UTC time.
    fn now(&self) -> OffsetDateTime;

    /// Returns the current time as unix seconds.
    fn unix_now(&self) -> i64 {
        self.now().unix_timestamp()
    }
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    unix: AtomicI64,
}

impl ManualClock {
    /// Creates a clock frozen at `start`.
    #[must_use]
    pub fn new(start: OffsetDateTime) -> Self {
        Self {
            unix: AtomicI64::new(start.unix_timestamp()),
        }
    }

    /// Creates a clock frozen at the given unix second.
    #[must_use]
    pub fn at_unix(seconds: i64) -> Self {
        Self {
            unix: AtomicI64::new(seconds),
        }
    }

    /// Moves the clock forward (or backward, for negative durations).
    pub fn advance(&self, by: Duration) {
        self.unix.fetch_add(by.whole_seconds(), Ordering::SeqCst);
    }

    /// Jumps to an absolute unix second.
    pub fn set_unix(&self, seconds: i64) {
        self.unix.store(seconds, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> OffsetDateTime {
        let seconds = self.unix.load(Ordering::SeqCst);
        OffsetDateTime::from_unix_timestamp(seconds).unwrap_or(OffsetDateTime::UNIX_EPOCH)
    }

    fn unix_now(&self) -> i64 {
        self.unix.load(Ordering::SeqCst)
    }
}
