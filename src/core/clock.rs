// core/clock.rs
// Time source for the control loop. Every wait in the mission goes through a Clock so
// tests can run the full state machine without sleeping.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Monotonic time plus a bounded sleep
pub trait Clock {
    /// Current instant
    fn now(&self) -> Instant;
    /// Blocks for `duration`, or just advances time for a simulated clock
    fn sleep(&self, duration: Duration);
}

/// Wall clock backed by `std::thread::sleep`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Clock that only moves when slept on or advanced explicitly
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    elapsed_us: AtomicU64,
}

impl ManualClock {
    /// Clock starting at the current instant
    pub fn new() -> Self {
        ManualClock {
            origin: Instant::now(),
            elapsed_us: AtomicU64::new(0),
        }
    }

    /// Moves time forward without sleeping
    pub fn advance(&self, duration: Duration) {
        self.elapsed_us
            .fetch_add(duration.as_micros() as u64, Ordering::SeqCst);
    }

    /// Time advanced since construction
    pub fn elapsed(&self) -> Duration {
        Duration::from_micros(self.elapsed_us.load(Ordering::SeqCst))
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Instant {
        (**self).now()
    }

    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}
