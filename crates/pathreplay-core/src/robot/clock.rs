//! Time sources and scheduling hints

use std::cell::Cell;
use std::time::{Duration, Instant};

/// Scheduling priority requested around timing-critical sections
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskPriority {
    /// Normal scheduling
    Normal,
    /// Raised priority while recording or replaying
    Elevated,
}

/// Monotonic microsecond clock plus the blocking wait used by the tick loop
pub trait Clock {
    /// Microseconds since an arbitrary fixed origin
    fn now_micros(&self) -> u64;

    /// Block until `now_micros() >= deadline`
    fn sleep_until(&self, deadline: u64);

    /// Apply a priority hint to the calling task. No-op unless the platform
    /// has a notion of task priority.
    fn set_priority(&self, _priority: TaskPriority) {}
}

/// Wall clock backed by [`Instant`]
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    /// Create a clock whose origin is now
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_micros(&self) -> u64 {
        self.origin.elapsed().as_micros() as u64
    }

    fn sleep_until(&self, deadline: u64) {
        let now = self.now_micros();
        if deadline > now {
            std::thread::sleep(Duration::from_micros(deadline - now));
        }
    }
}

/// Deterministic clock that only moves when told to
///
/// `sleep_until` jumps straight to the deadline, so a playback loop driven by
/// this clock runs instantly with exact tick spacing.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<u64>,
    priority_changes: Cell<u32>,
}

impl ManualClock {
    /// Create a clock at time zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward
    pub fn advance(&self, micros: u64) {
        self.now.set(self.now.get() + micros);
    }

    /// Jump to an absolute time. Never moves backwards.
    pub fn set(&self, micros: u64) {
        self.now.set(self.now.get().max(micros));
    }

    /// Number of priority hints received
    pub fn priority_changes(&self) -> u32 {
        self.priority_changes.get()
    }
}

impl Clock for ManualClock {
    fn now_micros(&self) -> u64 {
        self.now.get()
    }

    fn sleep_until(&self, deadline: u64) {
        self.set(deadline);
    }

    fn set_priority(&self, _priority: TaskPriority) {
        self.priority_changes.set(self.priority_changes.get() + 1);
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now_micros(&self) -> u64 {
        (**self).now_micros()
    }

    fn sleep_until(&self, deadline: u64) {
        (**self).sleep_until(deadline)
    }

    fn set_priority(&self, priority: TaskPriority) {
        (**self).set_priority(priority)
    }
}
