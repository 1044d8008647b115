//! Output device boundary
//!
//! The pacing core only ever talks to a device through these traits. A vendor
//! SDK binding implements them; [`SimulatedDevice`] implements them in-process.

mod mode;
mod simulated;

pub use mode::{select_display_mode, DisplayMode, DisplayModeId, FrameTiming, ScanType};
pub use simulated::{SimulatedDevice, SimulatedEnumerator, SimulationConfig};

use crate::audio::AudioFormat;
use crate::error::Result;
use std::sync::Arc;

/// Result of a synchronous frame display
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayResult {
    Success,
    Fail,
    AccessDenied,
    InvalidArgument,
}

impl DisplayResult {
    pub fn is_success(&self) -> bool {
        matches!(self, DisplayResult::Success)
    }
}

impl std::fmt::Display for DisplayResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DisplayResult::Success => "success",
            DisplayResult::Fail => "fail",
            DisplayResult::AccessDenied => "access denied",
            DisplayResult::InvalidArgument => "invalid argument",
        };
        f.write_str(s)
    }
}

/// Pixel layout of a video frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// 8-bit 4:2:2 UYVY
    Yuv8Bit,
    /// 8-bit ARGB
    Argb8Bit,
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            PixelFormat::Yuv8Bit => 2,
            PixelFormat::Argb8Bit => 4,
        }
    }
}

/// Device-allocated video frame
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub row_bytes: u32,
    pub pixel_format: PixelFormat,
    pub data: Box<[u8]>,
}

/// Hardware reference clock reading in a caller-chosen time scale
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockReading {
    pub hardware_time: i64,
    pub time_in_frame: i64,
    pub ticks_per_frame: i64,
}

/// Per-frame output calls made by the pacing loop
///
/// All calls are synchronous. None of them fail hard: problems surface as a
/// non-success display result or a short audio write.
pub trait OutputSink {
    /// Display a frame immediately
    fn display_frame(&self, frame: &VideoFrame) -> DisplayResult;

    /// Queue `frame_count` interleaved sample-frames; returns how many were accepted
    fn write_audio_samples(&self, samples: &[u8], frame_count: u32) -> u32;

    /// Sample-frames queued but not yet played
    fn buffered_audio_frames(&self) -> u32;
}

/// Device hardware clock
pub trait ReferenceClock {
    fn reference_clock(&self, time_scale: i64) -> ClockReading;
}

/// One-time setup calls on an output device
pub trait OutputDevice: OutputSink + ReferenceClock {
    fn name(&self) -> &str;

    fn display_modes(&self) -> Vec<DisplayMode>;

    fn enable_video_output(&self, mode: DisplayModeId) -> Result<()>;

    fn enable_audio_output(&self, format: &AudioFormat) -> Result<()>;

    fn create_video_frame(
        &self,
        width: u32,
        height: u32,
        row_bytes: u32,
        pixel_format: PixelFormat,
    ) -> Result<VideoFrame>;
}

/// Finds output devices
pub trait DeviceEnumerator {
    type Device: OutputDevice;

    /// First available device, or [`crate::FramepaceError::NoDevice`]
    fn first_device(&self) -> Result<Self::Device>;
}

impl<T: OutputSink + ?Sized> OutputSink for &T {
    fn display_frame(&self, frame: &VideoFrame) -> DisplayResult {
        (**self).display_frame(frame)
    }

    fn write_audio_samples(&self, samples: &[u8], frame_count: u32) -> u32 {
        (**self).write_audio_samples(samples, frame_count)
    }

    fn buffered_audio_frames(&self) -> u32 {
        (**self).buffered_audio_frames()
    }
}

impl<T: OutputSink + ?Sized> OutputSink for Arc<T> {
    fn display_frame(&self, frame: &VideoFrame) -> DisplayResult {
        (**self).display_frame(frame)
    }

    fn write_audio_samples(&self, samples: &[u8], frame_count: u32) -> u32 {
        (**self).write_audio_samples(samples, frame_count)
    }

    fn buffered_audio_frames(&self) -> u32 {
        (**self).buffered_audio_frames()
    }
}

impl<T: OutputDevice + ?Sized> OutputDevice for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn display_modes(&self) -> Vec<DisplayMode> {
        (**self).display_modes()
    }

    fn enable_video_output(&self, mode: DisplayModeId) -> Result<()> {
        (**self).enable_video_output(mode)
    }

    fn enable_audio_output(&self, format: &AudioFormat) -> Result<()> {
        (**self).enable_audio_output(format)
    }

    fn create_video_frame(
        &self,
        width: u32,
        height: u32,
        row_bytes: u32,
        pixel_format: PixelFormat,
    ) -> Result<VideoFrame> {
        (**self).create_video_frame(width, height, row_bytes, pixel_format)
    }
}

impl<T: ReferenceClock + ?Sized> ReferenceClock for &T {
    fn reference_clock(&self, time_scale: i64) -> ClockReading {
        (**self).reference_clock(time_scale)
    }
}

impl<T: ReferenceClock + ?Sized> ReferenceClock for Arc<T> {
    fn reference_clock(&self, time_scale: i64) -> ClockReading {
        (**self).reference_clock(time_scale)
    }
}
