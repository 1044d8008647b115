//! In-process output device
//!
//! Models the parts of a capture card output that matter for pacing: a
//! hardware clock running at its own rate and an audio ring drained by that
//! clock. A host that paces too slowly drains the ring (underflow); one that
//! paces too fast fills it until writes come back short (overflow).

use crate::audio::AudioFormat;
use crate::device::{
    ClockReading, DeviceEnumerator, DisplayMode, DisplayModeId, DisplayResult, FrameTiming,
    OutputDevice, OutputSink, PixelFormat, ReferenceClock, ScanType, VideoFrame,
};
use crate::error::{FramepaceError, Result};
use crate::sync::{HostTime, TimeSource};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, trace};

const NS_PER_SEC: u128 = 1_000_000_000;

/// Simulated device settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Device clock rate error relative to the host, in parts per million
    /// (positive = device runs fast)
    pub drift_ppm: f64,
    /// Audio ring capacity in sample-frames
    pub audio_buffer_frames: u32,
    /// Video frames between the first audio write and the start of playback
    pub playback_delay_frames: u32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            drift_ppm: 0.0,
            audio_buffer_frames: 48000,
            playback_delay_frames: 3,
        }
    }
}

#[derive(Default)]
struct SimState {
    video_mode: Option<DisplayMode>,
    audio_format: Option<AudioFormat>,
    buffered: u64,
    playback_start_ns: Option<u64>,
    drained_until_ns: u64,
    /// Sub-frame remainder of the drain, in frame-nanoseconds
    drain_remainder: u64,
    starved: bool,
    underruns: u64,
    frames_displayed: u64,
}

impl SimState {
    /// Consume audio played between the last drain and `now_ns`
    fn drain(&mut self, now_ns: u64) {
        let (Some(start), Some(format)) = (self.playback_start_ns, self.audio_format) else {
            return;
        };
        let from = self.drained_until_ns.max(start);
        if now_ns <= from {
            return;
        }

        let total = self.drain_remainder as u128
            + (now_ns - from) as u128 * format.sample_rate as u128;
        let played = (total / NS_PER_SEC) as u64;
        self.drain_remainder = (total % NS_PER_SEC) as u64;
        self.drained_until_ns = now_ns;

        if played > self.buffered {
            if !self.starved {
                self.underruns += 1;
                trace!("Simulated audio ring ran dry");
            }
            self.starved = true;
            self.buffered = 0;
        } else {
            self.buffered -= played;
        }
    }
}

/// Simulated output device
pub struct SimulatedDevice<T: TimeSource = HostTime> {
    name: String,
    config: SimulationConfig,
    modes: Vec<DisplayMode>,
    time: T,
    state: Mutex<SimState>,
}

impl SimulatedDevice<HostTime> {
    /// Device driven by the host monotonic clock
    pub fn new(config: SimulationConfig) -> Self {
        Self::with_time(config, HostTime::new())
    }
}

impl<T: TimeSource> SimulatedDevice<T> {
    /// Device driven by an arbitrary time source
    pub fn with_time(config: SimulationConfig, time: T) -> Self {
        Self {
            name: "Simulated Output 1".to_string(),
            config,
            modes: default_modes(),
            time,
            state: Mutex::new(SimState::default()),
        }
    }

    /// Replace the offered display modes
    pub fn with_modes(mut self, modes: Vec<DisplayMode>) -> Self {
        self.modes = modes;
        self
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Times the audio ring has run dry
    pub fn underruns(&self) -> u64 {
        self.state.lock().underruns
    }

    /// Frames displayed successfully
    pub fn frames_displayed(&self) -> u64 {
        self.state.lock().frames_displayed
    }

    /// Device clock in nanoseconds, skewed by the configured drift
    fn device_nanos(&self) -> u64 {
        let host = self.time.elapsed().as_nanos() as i128;
        let skew = (host as f64 * self.config.drift_ppm / 1e6).round() as i128;
        (host + skew).max(0) as u64
    }

    /// Playback delay in nanoseconds for the enabled video mode
    fn playback_delay_nanos(&self, mode: Option<&DisplayMode>) -> u64 {
        let Some(mode) = mode else {
            return 0;
        };
        let timing = mode.frame_duration;
        (self.config.playback_delay_frames as i128 * timing.time_value as i128 * NS_PER_SEC as i128
            / timing.time_scale as i128) as u64
    }
}

impl<T: TimeSource> OutputSink for SimulatedDevice<T> {
    fn display_frame(&self, frame: &VideoFrame) -> DisplayResult {
        let mut state = self.state.lock();
        let Some(mode) = state.video_mode.as_ref() else {
            return DisplayResult::AccessDenied;
        };
        if frame.width != mode.width || frame.height != mode.height {
            return DisplayResult::InvalidArgument;
        }
        if (frame.row_bytes as usize) * (frame.height as usize) > frame.data.len() {
            return DisplayResult::InvalidArgument;
        }

        state.frames_displayed += 1;
        DisplayResult::Success
    }

    fn write_audio_samples(&self, samples: &[u8], frame_count: u32) -> u32 {
        let now = self.device_nanos();
        let mut state = self.state.lock();
        let Some(format) = state.audio_format else {
            return 0;
        };
        if samples.len() < format.frames_to_bytes(frame_count) {
            return 0;
        }

        state.drain(now);
        if state.playback_start_ns.is_none() {
            let start = now + self.playback_delay_nanos(state.video_mode.as_ref());
            state.playback_start_ns = Some(start);
            state.drained_until_ns = start;
            debug!("Simulated audio playback starts at {}ns", start);
        }

        let free = (self.config.audio_buffer_frames as u64).saturating_sub(state.buffered);
        let accepted = (frame_count as u64).min(free);
        state.buffered += accepted;
        if accepted > 0 {
            state.starved = false;
        }
        accepted as u32
    }

    fn buffered_audio_frames(&self) -> u32 {
        let now = self.device_nanos();
        let mut state = self.state.lock();
        state.drain(now);
        state.buffered.min(u32::MAX as u64) as u32
    }
}

impl<T: TimeSource> ReferenceClock for SimulatedDevice<T> {
    fn reference_clock(&self, time_scale: i64) -> ClockReading {
        let now = self.device_nanos();
        let state = self.state.lock();

        let hardware_time = (now as i128 * time_scale as i128 / NS_PER_SEC as i128) as i64;
        let ticks_per_frame = state
            .video_mode
            .as_ref()
            .map(|mode| mode.frame_duration.ticks_per_frame(time_scale))
            .unwrap_or(0);
        let time_in_frame = if ticks_per_frame > 0 {
            hardware_time % ticks_per_frame
        } else {
            0
        };

        ClockReading {
            hardware_time,
            time_in_frame,
            ticks_per_frame,
        }
    }
}

impl<T: TimeSource> OutputDevice for SimulatedDevice<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn display_modes(&self) -> Vec<DisplayMode> {
        self.modes.clone()
    }

    fn enable_video_output(&self, mode: DisplayModeId) -> Result<()> {
        let mode = self
            .modes
            .iter()
            .find(|m| m.id == mode)
            .cloned()
            .ok_or_else(|| {
                FramepaceError::device(&self.name, format!("unknown display mode {:?}", mode))
            })?;

        info!("Video output enabled: {}", mode);
        self.state.lock().video_mode = Some(mode);
        Ok(())
    }

    fn enable_audio_output(&self, format: &AudioFormat) -> Result<()> {
        if format.sample_rate != 48000 {
            return Err(FramepaceError::UnsupportedAudioFormat(format!(
                "{} Hz (device plays 48000 Hz only)",
                format.sample_rate
            )));
        }
        if !matches!(format.bits_per_sample, 16 | 32) {
            return Err(FramepaceError::UnsupportedAudioFormat(format!(
                "{}-bit samples (device takes 16 or 32-bit integers)",
                format.bits_per_sample
            )));
        }
        if !matches!(format.channels, 2 | 8 | 16) {
            return Err(FramepaceError::UnsupportedAudioFormat(format!(
                "{} channels (device takes 2, 8 or 16)",
                format.channels
            )));
        }

        let mut state = self.state.lock();
        state.audio_format = Some(*format);
        state.buffered = 0;
        state.playback_start_ns = None;
        state.drain_remainder = 0;
        state.starved = false;
        info!("Audio output enabled: {}", format);
        Ok(())
    }

    fn create_video_frame(
        &self,
        width: u32,
        height: u32,
        row_bytes: u32,
        pixel_format: PixelFormat,
    ) -> Result<VideoFrame> {
        if width == 0 || height == 0 {
            return Err(FramepaceError::device(
                &self.name,
                format!("invalid frame size {}x{}", width, height),
            ));
        }
        if row_bytes < width * pixel_format.bytes_per_pixel() {
            return Err(FramepaceError::device(
                &self.name,
                format!("row bytes {} too small for {} pixels", row_bytes, width),
            ));
        }

        // Black
        let pattern: &[u8] = match pixel_format {
            PixelFormat::Yuv8Bit => &[0x80, 0x10],
            PixelFormat::Argb8Bit => &[0xFF, 0x00, 0x00, 0x00],
        };
        let len = row_bytes as usize * height as usize;
        let data: Vec<u8> = pattern.iter().copied().cycle().take(len).collect();

        Ok(VideoFrame {
            width,
            height,
            row_bytes,
            pixel_format,
            data: data.into_boxed_slice(),
        })
    }
}

/// Enumerator yielding a single simulated device
pub struct SimulatedEnumerator<T: TimeSource + Clone = HostTime> {
    config: SimulationConfig,
    time: T,
    present: bool,
}

impl SimulatedEnumerator<HostTime> {
    pub fn new(config: SimulationConfig) -> Self {
        Self::with_time(config, HostTime::new())
    }

    /// Enumerator with no devices attached
    pub fn empty() -> Self {
        Self {
            present: false,
            ..Self::new(SimulationConfig::default())
        }
    }
}

impl<T: TimeSource + Clone> SimulatedEnumerator<T> {
    pub fn with_time(config: SimulationConfig, time: T) -> Self {
        Self {
            config,
            time,
            present: true,
        }
    }
}

impl<T: TimeSource + Clone> DeviceEnumerator for SimulatedEnumerator<T> {
    type Device = Arc<SimulatedDevice<T>>;

    fn first_device(&self) -> Result<Self::Device> {
        if !self.present {
            return Err(FramepaceError::NoDevice);
        }
        let device = SimulatedDevice::with_time(self.config.clone(), self.time.clone());
        info!("Using device: {}", device.name());
        Ok(Arc::new(device))
    }
}

/// Mode list shaped like a broadcast output card
fn default_modes() -> Vec<DisplayMode> {
    let table: &[(&str, u32, u32, i64, i64, ScanType)] = &[
        ("NTSC", 720, 486, 1001, 30000, ScanType::LowerFieldFirst),
        ("PAL", 720, 576, 1000, 25000, ScanType::UpperFieldFirst),
        ("1080p23.98", 1920, 1080, 1001, 24000, ScanType::Progressive),
        ("1080p24", 1920, 1080, 1000, 24000, ScanType::Progressive),
        ("1080p25", 1920, 1080, 1000, 25000, ScanType::Progressive),
        ("1080p29.97", 1920, 1080, 1001, 30000, ScanType::Progressive),
        ("1080p30", 1920, 1080, 1000, 30000, ScanType::Progressive),
        ("1080i50", 1920, 1080, 1000, 25000, ScanType::UpperFieldFirst),
        ("1080i59.94", 1920, 1080, 1001, 30000, ScanType::UpperFieldFirst),
        ("720p50", 1280, 720, 1000, 50000, ScanType::Progressive),
        ("720p59.94", 1280, 720, 1001, 60000, ScanType::Progressive),
        ("2160p24", 3840, 2160, 1000, 24000, ScanType::Progressive),
        ("2160p25", 3840, 2160, 1000, 25000, ScanType::Progressive),
    ];

    table
        .iter()
        .enumerate()
        .map(|(i, &(name, width, height, time_value, time_scale, scan))| DisplayMode {
            id: DisplayModeId(i as u32 + 1),
            name: name.to_string(),
            width,
            height,
            frame_duration: FrameTiming::new(time_value, time_scale),
            scan,
        })
        .collect()
}
