//! Frame boundary timing and cancellation

mod clock;
mod stop;
mod time;

pub use clock::{ClockKind, ClockSource, DriftSample, HardwareClock, WaitOutcome, WallClock};
pub use stop::StopToken;
pub use time::{HostTime, ManualTime, TimeSource};
