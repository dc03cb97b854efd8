//! Wall-clock abstraction used by the scheduler, rate controller and buffer.
//!
//! All pipeline components take time from a [`Clock`] trait object rather
//! than calling the OS directly, so the scheduling and rate-control logic
//! can run against virtual time in tests. [`SystemClock`] is the production
//! implementation; [`ManualClock`] is the test double.
//!
//! Timestamps are wall-clock milliseconds since the Unix epoch, made
//! monotonic-safe: a clock never returns a value smaller than one it has
//! already returned, even if the underlying wall clock steps backwards.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Source of monotonic-safe wall-clock milliseconds.
pub trait Clock: Send + Sync {
    /// Current time in milliseconds since the Unix epoch. Never decreases.
    fn now_ms(&self) -> i64;
}

/// Production clock backed by the system wall clock.
///
/// Keeps a high-water mark so that a backwards step of the wall clock
/// (NTP correction, manual adjustment) cannot produce out-of-order
/// timestamps on buffered data points.
#[derive(Debug, Default)]
pub struct SystemClock {
    high_water: AtomicI64,
}

impl SystemClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle, the form the pipeline components expect.
    pub fn shared() -> Arc<dyn Clock> {
        Arc::new(Self::new())
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        let wall = chrono::Utc::now().timestamp_millis();
        // fetch_max returns the previous mark; the effective reading is the
        // larger of the two.
        let prev = self.high_water.fetch_max(wall, Ordering::SeqCst);
        wall.max(prev)
    }
}

/// Manually advanced clock for tests.
///
/// Starts at an arbitrary epoch and only moves when told to, which makes
/// interval arithmetic in scheduler and rate-controller tests exact.
#[derive(Debug)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start_ms: i64) -> Self {
        Self {
            now: AtomicI64::new(start_ms),
        }
    }

    pub fn shared(start_ms: i64) -> Arc<ManualClock> {
        Arc::new(Self::new(start_ms))
    }

    /// Advance the clock by `delta_ms` and return the new time.
    pub fn advance(&self, delta_ms: i64) -> i64 {
        self.now.fetch_add(delta_ms, Ordering::SeqCst) + delta_ms
    }

    /// Jump directly to `now_ms`. Ignored if it would move time backwards.
    pub fn set(&self, now_ms: i64) {
        self.now.fetch_max(now_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}
