//! Test signal, playback buffer and the frame pacing engine

mod buffer;
mod engine;
mod signal;

pub use buffer::{AudioBuffer, PlaybackCursor};
pub use engine::{
    prepare_output, EngineConfig, FrameScheduler, OutputMode, Phase, PreparedOutput,
    SchedulerConfig, SchedulerState,
};
pub use signal::{SignalGenerator, ToneParams};

use crate::error::{FramepaceError, Result};

/// Interleaved integer PCM format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
    pub block_align: u16,
}

impl AudioFormat {
    /// Build a format, rejecting depths that are not whole bytes
    pub fn new(sample_rate: u32, channels: u16, bits_per_sample: u16) -> Result<Self> {
        if sample_rate == 0 {
            return Err(FramepaceError::UnsupportedAudioFormat(
                "sample rate must be non-zero".to_string(),
            ));
        }
        if channels == 0 {
            return Err(FramepaceError::UnsupportedAudioFormat(
                "channel count must be non-zero".to_string(),
            ));
        }
        if !matches!(bits_per_sample, 16 | 24 | 32) {
            return Err(FramepaceError::UnsupportedAudioFormat(format!(
                "{}-bit samples",
                bits_per_sample
            )));
        }

        Ok(Self {
            sample_rate,
            channels,
            bits_per_sample,
            block_align: channels * (bits_per_sample / 8),
        })
    }

    /// Bytes in a single sample of one channel
    pub fn bytes_per_sample(&self) -> usize {
        (self.bits_per_sample / 8) as usize
    }

    /// Calculate bytes per second
    pub fn bytes_per_second(&self) -> usize {
        self.sample_rate as usize * self.block_align as usize
    }

    /// Calculate bytes for given number of frames
    pub fn frames_to_bytes(&self, frames: u32) -> usize {
        frames as usize * self.block_align as usize
    }

    /// Largest sample value representable at this depth
    pub fn peak_amplitude(&self) -> i64 {
        (1i64 << (self.bits_per_sample - 1)) - 1
    }
}

impl std::fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}Hz {}ch {}bit",
            self.sample_rate, self.channels, self.bits_per_sample
        )
    }
}
