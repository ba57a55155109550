//! Wrapping millisecond time.
//!
//! Deadlines are 32-bit millisecond counters that wrap after ~49.7 days.
//! Ordering uses [`is_before`], which stays correct across the wrap as long as
//! no two live deadlines are more than half the counter range (~24.8 days)
//! apart.

use core::cell::Cell;

/// Milliseconds since boot, wrapping.
pub type Millis = u32;

/// Half of the counter range: the horizon inside which ordering is defined.
pub const HALF_RANGE: Millis = Millis::MAX / 2;

/// Returns `true` if `t1` is at or before `t2`, allowing that either value
/// may have wrapped around.
#[inline]
pub const fn is_before(t1: Millis, t2: Millis) -> bool {
    t2.wrapping_sub(t1) < HALF_RANGE
}

/// Source of the monotonic, wrapping millisecond counter.
pub trait Clock {
    /// Current time in milliseconds.
    fn now_ms(&self) -> Millis;
}

/// A clock that only moves when told to.
///
/// Used for deterministic host runs and tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<Millis>,
}

impl ManualClock {
    pub const fn new(start: Millis) -> Self {
        Self {
            now: Cell::new(start),
        }
    }

    pub fn set(&self, now: Millis) {
        self.now.set(now);
    }

    /// Advance the clock, wrapping at the end of the counter range.
    pub fn advance(&self, msec: Millis) {
        self.now.set(self.now.get().wrapping_add(msec));
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> Millis {
        self.now.get()
    }
}
