//! Unified error types for framepace

use crate::config::ConfigError;
use thiserror::Error;

/// Main error type for framepace operations
///
/// Only setup can fail. Once the pacing loop is running, display failures,
/// underflows and overflows are observed and counted, never returned.
#[derive(Error, Debug)]
pub enum FramepaceError {
    /// No output device present
    #[error("No output device found")]
    NoDevice,

    /// Frame rate resolved to zero
    #[error("No frame rate selected (choose -a for 24 fps or -b for 25 fps)")]
    NoFrameRate,

    /// No progressive display mode offers the requested rate
    #[error("No progressive display mode with frame duration 1000/{fps_milli}")]
    NoMatchingDisplayMode { fps_milli: u32 },

    /// Device operation error
    #[error("Device '{device}' error: {message}")]
    Device { device: String, message: String },

    /// Audio format rejected by the device
    #[error("Unsupported audio format: {0}")]
    UnsupportedAudioFormat(String),

    /// One video frame does not map onto a whole number of audio sample-frames
    /// that evenly divides one second of audio
    #[error(
        "Frame duration {time_value}/{time_scale} does not divide {sample_rate} Hz audio into whole per-frame chunks"
    )]
    Timing {
        sample_rate: u32,
        time_value: i64,
        time_scale: i64,
    },

    /// Reference clock cannot be used for pacing
    #[error("Reference clock unavailable: {0}")]
    ClockUnavailable(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration file error
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result type alias for framepace operations
pub type Result<T> = std::result::Result<T, FramepaceError>;

impl FramepaceError {
    /// Create a device error with context
    pub fn device(device: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Device {
            device: device.into(),
            message: message.into(),
        }
    }
}
