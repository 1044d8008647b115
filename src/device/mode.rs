//! Display modes and frame-rate selection

use crate::error::{FramepaceError, Result};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};

/// Frame duration as `time_value / time_scale` seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameTiming {
    pub time_value: i64,
    pub time_scale: i64,
}

impl FrameTiming {
    pub fn new(time_value: i64, time_scale: i64) -> Self {
        Self {
            time_value,
            time_scale,
        }
    }

    /// Frame period on the host clock
    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(self.time_value as f64 / self.time_scale as f64)
    }

    pub fn frames_per_second(&self) -> f64 {
        self.time_scale as f64 / self.time_value as f64
    }

    /// Whole frames per second, at least one
    pub fn whole_frames_per_second(&self) -> u64 {
        (self.time_scale / self.time_value).max(1) as u64
    }

    /// Ticks per frame when the clock counts in `time_scale` units
    pub fn ticks_per_frame(&self, time_scale: i64) -> i64 {
        self.time_value * time_scale / self.time_scale
    }

    /// Audio sample-frames to queue per video frame
    ///
    /// Fails unless one frame covers a whole number of sample-frames and that
    /// number evenly divides one second of audio, which is what lets a
    /// one-second loop wrap exactly on a frame boundary.
    pub fn sample_frame_count(&self, sample_rate: u32) -> Result<u32> {
        let err = || FramepaceError::Timing {
            sample_rate,
            time_value: self.time_value,
            time_scale: self.time_scale,
        };

        if self.time_value <= 0 || self.time_scale <= 0 {
            return Err(err());
        }
        let numerator = sample_rate as i64 * self.time_value;
        if numerator % self.time_scale != 0 {
            return Err(err());
        }
        let count = numerator / self.time_scale;
        if count == 0 || sample_rate as i64 % count != 0 {
            return Err(err());
        }

        Ok(count as u32)
    }
}

impl fmt::Display for FrameTiming {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.time_value, self.time_scale)
    }
}

/// Field order of a display mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanType {
    Progressive,
    UpperFieldFirst,
    LowerFieldFirst,
}

/// Opaque device identifier for a display mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DisplayModeId(pub u32);

/// Video output mode offered by a device
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayMode {
    pub id: DisplayModeId,
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub frame_duration: FrameTiming,
    pub scan: ScanType,
}

impl DisplayMode {
    pub fn is_progressive(&self) -> bool {
        self.scan == ScanType::Progressive
    }
}

impl fmt::Display for DisplayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}x{}, {})",
            self.name, self.width, self.height, self.frame_duration
        )
    }
}

/// Pick the first progressive mode lasting exactly `1000 / fps_milli` seconds
///
/// Only integer rates are pursued: 1001-based (NTSC-family) durations never
/// match. When nothing matches this returns
/// [`FramepaceError::NoMatchingDisplayMode`] instead of waiting forever.
pub fn select_display_mode<I>(modes: I, fps_milli: u32) -> Result<DisplayMode>
where
    I: IntoIterator<Item = DisplayMode>,
{
    for mode in modes {
        let timing = mode.frame_duration;
        debug!("{} == {}", timing.time_value, timing.time_scale);

        if !mode.is_progressive() || timing.time_value != 1000 {
            continue;
        }
        if timing.time_scale == fps_milli as i64 {
            info!("Selected {} == {} ({})", timing.time_value, timing.time_scale, mode.name);
            return Ok(mode);
        }
        debug!("Skipping {} == {}", timing.time_value, timing.time_scale);
    }

    Err(FramepaceError::NoMatchingDisplayMode { fps_milli })
}
