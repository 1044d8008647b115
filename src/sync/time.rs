//! Monotonic time sources
//!
//! Everything that reads time goes through [`TimeSource`] so tests can run the
//! pacing loop against virtual time instead of spinning on the real clock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Monotonic clock measured from an arbitrary origin
pub trait TimeSource {
    /// Time elapsed since the source's origin
    fn elapsed(&self) -> Duration;
}

impl<T: TimeSource + ?Sized> TimeSource for Arc<T> {
    fn elapsed(&self) -> Duration {
        (**self).elapsed()
    }
}

impl<T: TimeSource + ?Sized> TimeSource for &T {
    fn elapsed(&self) -> Duration {
        (**self).elapsed()
    }
}

/// Host monotonic clock
#[derive(Debug, Clone, Copy)]
pub struct HostTime {
    origin: Instant,
}

impl HostTime {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for HostTime {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for HostTime {
    #[inline]
    fn elapsed(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Virtual clock for tests and simulation
///
/// Time only moves when advanced explicitly, or by `step` on every read. A
/// non-zero step makes busy-wait loops terminate after a predictable number
/// of polls.
#[derive(Debug, Default)]
pub struct ManualTime {
    nanos: AtomicU64,
    step_nanos: AtomicU64,
}

impl ManualTime {
    /// Frozen clock at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Clock that advances by `step` on every read
    pub fn with_step(step: Duration) -> Self {
        let time = Self::new();
        time.set_step(step);
        time
    }

    pub fn set_step(&self, step: Duration) {
        self.step_nanos
            .store(step.as_nanos() as u64, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.nanos.fetch_add(by.as_nanos() as u64, Ordering::SeqCst);
    }

    /// Current time without stepping
    pub fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
    }
}

impl TimeSource for ManualTime {
    fn elapsed(&self) -> Duration {
        let step = self.step_nanos.load(Ordering::Relaxed);
        Duration::from_nanos(self.nanos.fetch_add(step, Ordering::SeqCst) + step)
    }
}
