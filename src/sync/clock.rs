//! Frame boundary clocks
//!
//! Both strategies busy-poll and keep one core occupied while waiting. Every
//! poll checks the stop token, so a wait ends within one poll of a stop request.

use crate::device::ReferenceClock;
use crate::error::{FramepaceError, Result};
use crate::sync::{StopToken, TimeSource};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

/// Which clock gates frame boundaries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ClockKind {
    /// Host monotonic clock against the nominal frame period
    #[default]
    Wall,
    /// Output device's hardware reference clock
    Hardware,
}

impl std::fmt::Display for ClockKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClockKind::Wall => write!(f, "wall"),
            ClockKind::Hardware => write!(f, "hardware"),
        }
    }
}

/// Hardware clock snapshot taken at a frame boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriftSample {
    /// Hardware time in ticks
    pub now_ticks: i64,
    /// Ticks into the current video frame
    pub ticks_in_frame: i64,
    /// Ticks per video frame as reported by the device
    pub ticks_per_frame: i64,
    /// Ticks elapsed since the previous boundary
    pub delta_ticks: i64,
    /// Nominal ticks per frame
    pub expected_ticks: i64,
    /// Clock polls needed to reach this boundary
    pub clock_calls: u64,
    /// Change in poll count versus the previous boundary
    pub clock_calls_delta: i64,
}

impl DriftSample {
    /// Whether the measured frame length differs from the nominal quantum
    pub fn is_drift(&self) -> bool {
        self.delta_ticks != self.expected_ticks
    }
}

/// Result of waiting for a frame boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// Boundary reached, with a clock snapshot when there is something to report
    Boundary(Option<DriftSample>),
    /// Stop was requested while waiting
    Stopped,
}

/// Source of frame boundaries
pub trait ClockSource {
    fn kind(&self) -> ClockKind;

    /// Take a new baseline: the next boundary is one frame from now
    fn reset(&mut self);

    /// Spin until the next frame boundary or until `stop` is set
    fn wait_next_frame(&mut self, stop: &StopToken) -> WaitOutcome;
}

impl<C: ClockSource + ?Sized> ClockSource for Box<C> {
    fn kind(&self) -> ClockKind {
        (**self).kind()
    }

    fn reset(&mut self) {
        (**self).reset()
    }

    fn wait_next_frame(&mut self, stop: &StopToken) -> WaitOutcome {
        (**self).wait_next_frame(stop)
    }
}

/// Paces frames with a host monotonic clock
///
/// The baseline moves to the observed boundary rather than to the ideal one,
/// so poll overshoot accumulates as drift against the device.
pub struct WallClock<T: TimeSource> {
    time: T,
    period: Duration,
    t0: Duration,
}

impl<T: TimeSource> WallClock<T> {
    pub fn new(time: T, period: Duration) -> Self {
        let t0 = time.elapsed();
        Self { time, period, t0 }
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}

impl<T: TimeSource> ClockSource for WallClock<T> {
    fn kind(&self) -> ClockKind {
        ClockKind::Wall
    }

    fn reset(&mut self) {
        self.t0 = self.time.elapsed();
    }

    fn wait_next_frame(&mut self, stop: &StopToken) -> WaitOutcome {
        loop {
            if stop.is_stopped() {
                return WaitOutcome::Stopped;
            }
            let now = self.time.elapsed();
            if now.saturating_sub(self.t0) >= self.period {
                self.t0 = now;
                return WaitOutcome::Boundary(None);
            }
            std::hint::spin_loop();
        }
    }
}

/// Paces frames with the device's hardware reference clock
///
/// Drift is reported, never corrected.
pub struct HardwareClock<R: ReferenceClock> {
    reference: R,
    time_scale: i64,
    expected_ticks: i64,
    t0: i64,
    last_clock_calls: u64,
    verbose: bool,
}

impl<R: ReferenceClock> HardwareClock<R> {
    /// Read the baseline from `reference` in units of `time_scale`
    ///
    /// With `verbose`, every boundary yields a [`DriftSample`]; otherwise only
    /// boundaries whose tick delta is off the nominal quantum do.
    pub fn new(reference: R, time_scale: i64, verbose: bool) -> Result<Self> {
        if time_scale <= 0 {
            return Err(FramepaceError::ClockUnavailable(format!(
                "invalid time scale {}",
                time_scale
            )));
        }

        let baseline = reference.reference_clock(time_scale);
        info!(
            "hardware_time= {} timeInFrame= {} ticksPerFrame= {}",
            baseline.hardware_time, baseline.time_in_frame, baseline.ticks_per_frame
        );

        if baseline.ticks_per_frame <= 0 {
            return Err(FramepaceError::ClockUnavailable(
                "device reports no ticks per frame (video output not enabled?)".to_string(),
            ));
        }

        Ok(Self {
            reference,
            time_scale,
            expected_ticks: baseline.ticks_per_frame,
            t0: baseline.hardware_time,
            last_clock_calls: 0,
            verbose,
        })
    }

    /// Nominal ticks per frame captured at the baseline
    pub fn expected_ticks(&self) -> i64 {
        self.expected_ticks
    }
}

impl<R: ReferenceClock> ClockSource for HardwareClock<R> {
    fn kind(&self) -> ClockKind {
        ClockKind::Hardware
    }

    fn reset(&mut self) {
        self.t0 = self.reference.reference_clock(self.time_scale).hardware_time;
        self.last_clock_calls = 0;
    }

    fn wait_next_frame(&mut self, stop: &StopToken) -> WaitOutcome {
        let mut clock_calls = 0u64;
        let reading = loop {
            if stop.is_stopped() {
                return WaitOutcome::Stopped;
            }
            clock_calls += 1;
            let reading = self.reference.reference_clock(self.time_scale);
            if reading.hardware_time - self.t0 >= reading.ticks_per_frame {
                break reading;
            }
            std::hint::spin_loop();
        };

        let sample = DriftSample {
            now_ticks: reading.hardware_time,
            ticks_in_frame: reading.time_in_frame,
            ticks_per_frame: reading.ticks_per_frame,
            delta_ticks: reading.hardware_time - self.t0,
            expected_ticks: self.expected_ticks,
            clock_calls,
            clock_calls_delta: clock_calls as i64 - self.last_clock_calls as i64,
        };

        if sample.is_drift() {
            warn!(
                "ticksPerFrame {} timeInFrame {} now {} t0 {} diff {}",
                sample.ticks_per_frame,
                sample.ticks_in_frame,
                sample.now_ticks,
                self.t0,
                sample.delta_ticks
            );
        }
        if self.verbose {
            info!(
                "clock calls {} diff {}",
                sample.clock_calls, sample.clock_calls_delta
            );
        }

        self.last_clock_calls = clock_calls;
        self.t0 = reading.hardware_time;

        let report = self.verbose || sample.is_drift();
        WaitOutcome::Boundary(report.then_some(sample))
    }
}
