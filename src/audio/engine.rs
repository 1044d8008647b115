//! Frame pacing engine - output setup and the per-frame control loop

use crate::audio::{AudioBuffer, AudioFormat, PlaybackCursor, SignalGenerator, ToneParams};
use crate::device::{
    select_display_mode, DisplayMode, FrameTiming, OutputDevice, OutputSink, PixelFormat,
    VideoFrame,
};
use crate::diagnostics::{Counters, Diagnostics, DEFAULT_EVENT_CAPACITY};
use crate::error::{FramepaceError, Result};
use crate::sync::{ClockSource, StopToken, WaitOutcome};
use tracing::{debug, info, trace, warn};

/// What the loop does at each frame boundary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputMode {
    /// Display video and feed audio
    #[default]
    Output,
    /// Only pace and count frames; no device output calls
    PaceOnly,
}

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Target frame rate in milli-fps (24000 = 24 fps)
    pub fps_milli: u32,
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
    pub tone: ToneParams,
    pub pixel_format: PixelFormat,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fps_milli: 24000,
            sample_rate: 48000,
            channels: 2,
            bits_per_sample: 16,
            tone: ToneParams::default(),
            pixel_format: PixelFormat::Yuv8Bit,
        }
    }
}

/// Everything set up on the device before the loop starts
#[derive(Debug)]
pub struct PreparedOutput {
    pub display_mode: DisplayMode,
    pub format: AudioFormat,
    pub sample_frame_count: u32,
    pub frame: VideoFrame,
    pub signal: AudioBuffer,
}

impl PreparedOutput {
    pub fn timing(&self) -> FrameTiming {
        self.display_mode.frame_duration
    }

    /// Scheduler settings derived from the selected mode
    pub fn scheduler_config(&self, mode: OutputMode) -> SchedulerConfig {
        SchedulerConfig {
            mode,
            ..SchedulerConfig::new(self.sample_frame_count, self.timing())
        }
    }
}

/// Select a mode and enable video and audio output on `device`
///
/// Every failure here is fatal and reported before any frame is paced.
pub fn prepare_output<D>(device: &D, config: &EngineConfig) -> Result<PreparedOutput>
where
    D: OutputDevice + ?Sized,
{
    if config.fps_milli == 0 {
        return Err(FramepaceError::NoFrameRate);
    }

    let format = AudioFormat::new(config.sample_rate, config.channels, config.bits_per_sample)?;
    let display_mode = select_display_mode(device.display_modes(), config.fps_milli)?;
    let sample_frame_count = display_mode
        .frame_duration
        .sample_frame_count(format.sample_rate)?;

    device.enable_video_output(display_mode.id)?;
    device.enable_audio_output(&format)?;

    let row_bytes = display_mode.width * config.pixel_format.bytes_per_pixel();
    let frame = device.create_video_frame(
        display_mode.width,
        display_mode.height,
        row_bytes,
        config.pixel_format,
    )?;

    let signal = SignalGenerator::generate(format, config.tone);
    info!(
        "Output ready on {}: {}, audio {}, {} sample-frames per video frame",
        device.name(),
        display_mode,
        format,
        sample_frame_count
    );

    Ok(PreparedOutput {
        display_mode,
        format,
        sample_frame_count,
        frame,
        signal,
    })
}

/// Scheduler configuration
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Audio sample-frames written per video frame
    pub sample_frame_count: u32,
    /// Frames between heartbeat log lines
    pub heartbeat_interval: u64,
    pub mode: OutputMode,
    /// Stop after this many frames (None = until stopped)
    pub max_frames: Option<u64>,
    /// Diagnostic events retained in memory
    pub event_capacity: usize,
}

impl SchedulerConfig {
    /// Heartbeat once per second of video
    pub fn new(sample_frame_count: u32, timing: FrameTiming) -> Self {
        Self {
            sample_frame_count,
            heartbeat_interval: timing.whole_frames_per_second(),
            mode: OutputMode::Output,
            max_frames: None,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

/// Scheduler lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Created, clock baseline not taken yet
    Idle,
    /// Pacing frames
    Running,
    /// Stop requested or frame limit reached
    Stopped,
}

/// Step of the per-frame sequence currently executing (or last executed)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    WaitBoundary,
    DisplayFrame,
    QueryBufferOccupancy,
    WriteAudio,
    AdvanceCursor,
}

/// Single-threaded frame pacing loop
///
/// Each iteration runs strictly in order: wait for the boundary, display the
/// frame, read audio occupancy, write one frame's worth of audio, advance the
/// cursor. Nothing overlaps and nothing is retried.
pub struct FrameScheduler<S: OutputSink, C: ClockSource> {
    sink: S,
    clock: C,
    frame: VideoFrame,
    signal: AudioBuffer,
    cursor: PlaybackCursor,
    config: SchedulerConfig,
    diagnostics: Diagnostics,
    state: SchedulerState,
    phase: Phase,
}

impl<S: OutputSink, C: ClockSource> FrameScheduler<S, C> {
    /// Create a scheduler
    ///
    /// Fails unless `sample_frame_count` evenly divides the signal length, so
    /// the cursor always wraps exactly at the end of the buffer.
    pub fn new(
        sink: S,
        clock: C,
        frame: VideoFrame,
        signal: AudioBuffer,
        config: SchedulerConfig,
    ) -> Result<Self> {
        let chunk = config.sample_frame_count as usize;
        if chunk == 0 || signal.frame_count() % chunk != 0 {
            return Err(FramepaceError::InvalidConfig(format!(
                "{} sample-frames per video frame does not divide a {}-frame signal",
                config.sample_frame_count,
                signal.frame_count()
            )));
        }
        if config.heartbeat_interval == 0 {
            return Err(FramepaceError::InvalidConfig(
                "heartbeat interval must be non-zero".to_string(),
            ));
        }

        let cursor = PlaybackCursor::new(&signal);
        let diagnostics = Diagnostics::with_capacity(config.event_capacity);

        Ok(Self {
            sink,
            clock,
            frame,
            signal,
            cursor,
            config,
            diagnostics,
            state: SchedulerState::Idle,
            phase: Phase::WaitBoundary,
        })
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn counters(&self) -> Counters {
        self.diagnostics.counters()
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn diagnostics_mut(&mut self) -> &mut Diagnostics {
        &mut self.diagnostics
    }

    pub fn cursor(&self) -> PlaybackCursor {
        self.cursor
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Run until `stop` is set or the frame limit is reached
    pub fn run(&mut self, stop: &StopToken) -> Counters {
        self.start();

        while self.state == SchedulerState::Running {
            if let Some(limit) = self.config.max_frames {
                if self.diagnostics.counters().frames >= limit {
                    info!("Frame limit {} reached", limit);
                    self.state = SchedulerState::Stopped;
                    break;
                }
            }
            self.tick(stop);
        }

        let counters = self.diagnostics.counters();
        info!("Pacing stopped: {}", counters);
        counters
    }

    /// Run one iteration of the loop
    ///
    /// Starts the scheduler if it is idle. Returns the state afterwards;
    /// `Stopped` means the stop token was observed and no frame was produced.
    pub fn tick(&mut self, stop: &StopToken) -> SchedulerState {
        if self.state != SchedulerState::Running {
            self.start();
        }
        if stop.is_stopped() {
            self.state = SchedulerState::Stopped;
            return self.state;
        }

        self.phase = Phase::WaitBoundary;
        let frame = self.diagnostics.counters().frames;
        match self.clock.wait_next_frame(stop) {
            WaitOutcome::Stopped => {
                self.state = SchedulerState::Stopped;
                return self.state;
            }
            WaitOutcome::Boundary(Some(sample)) => self.diagnostics.record_drift(frame, sample),
            WaitOutcome::Boundary(None) => {}
        }

        if self.config.mode == OutputMode::Output {
            self.output_frame(frame);
        }

        let frames = self.diagnostics.record_frame();
        if frames % self.config.heartbeat_interval == 0 {
            self.diagnostics.record_heartbeat();
        }

        self.state
    }

    fn start(&mut self) {
        if self.state == SchedulerState::Running {
            return;
        }
        self.clock.reset();
        self.state = SchedulerState::Running;
        info!(
            "Pacing started: {} clock, {} sample-frames per frame",
            self.clock.kind(),
            self.config.sample_frame_count
        );
    }

    fn output_frame(&mut self, frame: u64) {
        let requested = self.config.sample_frame_count;

        self.phase = Phase::DisplayFrame;
        let result = self.sink.display_frame(&self.frame);
        if !result.is_success() {
            self.diagnostics.record_display_failure(frame, result);
        }

        self.phase = Phase::QueryBufferOccupancy;
        let buffered = self.sink.buffered_audio_frames();
        debug!("frame {} buffered {}", frame, buffered);
        // The ring is always empty before the first write
        if buffered == 0 && frame != 0 {
            self.diagnostics.record_underflow(frame);
        }

        self.phase = Phase::WriteAudio;
        // `new` guarantees the chunk divides the signal, so this only fails if
        // the cursor and chunk size fall out of step
        match self.signal.window(&self.cursor, requested) {
            Some(samples) => {
                let accepted = self.sink.write_audio_samples(samples, requested);
                if accepted < requested {
                    self.diagnostics.record_overflow(frame, requested, accepted);
                }
            }
            None => warn!(
                "audio write skipped at frame {}: {} sample-frames past offset {} overrun the signal",
                frame,
                requested,
                self.cursor.offset()
            ),
        }

        self.phase = Phase::AdvanceCursor;
        if self.cursor.advance(requested) {
            trace!("audio loop wrapped at frame {}", frame);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DisplayResult, SimulatedDevice, SimulationConfig};
    use crate::diagnostics::DiagnosticEvent;
    use crate::sync::{ClockKind, DriftSample};
    use std::cell::{Cell, RefCell};

    /// Sink with scripted responses that records every write
    struct ScriptedSink {
        display: DisplayResult,
        buffered: u32,
        deficit: u32,
        displays: Cell<u64>,
        writes: RefCell<Vec<Vec<u8>>>,
    }

    impl ScriptedSink {
        fn new() -> Self {
            Self {
                display: DisplayResult::Success,
                buffered: 4000,
                deficit: 0,
                displays: Cell::new(0),
                writes: RefCell::new(Vec::new()),
            }
        }
    }

    impl OutputSink for ScriptedSink {
        fn display_frame(&self, _frame: &VideoFrame) -> DisplayResult {
            self.displays.set(self.displays.get() + 1);
            self.display
        }

        fn write_audio_samples(&self, samples: &[u8], frame_count: u32) -> u32 {
            self.writes.borrow_mut().push(samples.to_vec());
            frame_count.saturating_sub(self.deficit)
        }

        fn buffered_audio_frames(&self) -> u32 {
            self.buffered
        }
    }

    /// Clock that reaches every boundary immediately
    struct InstantClock {
        resets: u32,
        stop_after: Option<u32>,
        waits: u32,
        sample: Option<DriftSample>,
    }

    impl InstantClock {
        fn new() -> Self {
            Self {
                resets: 0,
                stop_after: None,
                waits: 0,
                sample: None,
            }
        }
    }

    impl ClockSource for InstantClock {
        fn kind(&self) -> ClockKind {
            ClockKind::Wall
        }

        fn reset(&mut self) {
            self.resets += 1;
        }

        fn wait_next_frame(&mut self, _stop: &StopToken) -> WaitOutcome {
            if self.stop_after == Some(self.waits) {
                return WaitOutcome::Stopped;
            }
            self.waits += 1;
            WaitOutcome::Boundary(self.sample)
        }
    }

    fn video_frame() -> VideoFrame {
        VideoFrame {
            width: 1920,
            height: 1080,
            row_bytes: 3840,
            pixel_format: PixelFormat::Yuv8Bit,
            data: vec![0u8; 3840 * 1080].into_boxed_slice(),
        }
    }

    fn signal() -> AudioBuffer {
        SignalGenerator::sine(48000, 2, 2, 1000, -18.0).unwrap()
    }

    fn config_24p() -> SchedulerConfig {
        SchedulerConfig::new(2000, FrameTiming::new(1000, 24000))
    }

    fn scheduler(
        sink: ScriptedSink,
        clock: InstantClock,
    ) -> FrameScheduler<ScriptedSink, InstantClock> {
        FrameScheduler::new(sink, clock, video_frame(), signal(), config_24p()).unwrap()
    }

    #[test]
    fn test_underflow_skipped_on_first_frame() {
        let sink = ScriptedSink {
            buffered: 0,
            ..ScriptedSink::new()
        };
        let mut sched = scheduler(sink, InstantClock::new());
        let stop = StopToken::new();

        sched.tick(&stop);
        assert_eq!(sched.counters().underflows, 0);

        sched.tick(&stop);
        assert_eq!(sched.counters().underflows, 1);

        sched.tick(&stop);
        assert_eq!(sched.counters().underflows, 2);
    }

    #[test]
    fn test_overflow_counts_every_short_write() {
        let sink = ScriptedSink {
            deficit: 5,
            ..ScriptedSink::new()
        };
        let mut sched = scheduler(sink, InstantClock::new());
        let stop = StopToken::new();

        for _ in 0..10 {
            sched.tick(&stop);
        }

        assert_eq!(sched.counters().overflows, 10);
        let shortfalls: Vec<u32> = sched
            .diagnostics()
            .events()
            .filter_map(|e| e.shortfall())
            .collect();
        assert_eq!(shortfalls, vec![5; 10]);
    }

    #[test]
    fn test_display_failure_does_not_stop_loop() {
        let sink = ScriptedSink {
            display: DisplayResult::Fail,
            ..ScriptedSink::new()
        };
        let mut sched = scheduler(sink, InstantClock::new());
        let stop = StopToken::new();

        for _ in 0..3 {
            assert_eq!(sched.tick(&stop), SchedulerState::Running);
        }

        assert_eq!(sched.counters().frames, 3);
        assert_eq!(sched.sink().writes.borrow().len(), 3);
        let failures: Vec<u64> = sched
            .diagnostics()
            .events()
            .filter_map(|e| match e {
                DiagnosticEvent::DisplayFailed { frame, .. } => Some(*frame),
                _ => None,
            })
            .collect();
        assert_eq!(failures, vec![0, 1, 2]);
    }

    #[test]
    fn test_audio_chunks_walk_the_signal_and_wrap() {
        let mut sched = scheduler(ScriptedSink::new(), InstantClock::new());
        let stop = StopToken::new();
        let reference = signal();

        for _ in 0..25 {
            sched.tick(&stop);
        }

        let writes = sched.sink().writes.borrow();
        for (i, chunk) in writes.iter().take(24).enumerate() {
            assert_eq!(chunk.as_slice(), &reference.as_bytes()[i * 8000..(i + 1) * 8000]);
        }
        // Frame 24 starts the loop again
        assert_eq!(writes[24], writes[0]);
        assert_eq!(sched.cursor().frame(), 2000);
    }

    #[test]
    fn test_heartbeat_once_per_second() {
        let mut sched = scheduler(ScriptedSink::new(), InstantClock::new());
        let stop = StopToken::new();

        for _ in 0..50 {
            sched.tick(&stop);
        }

        let beats: Vec<u64> = sched
            .diagnostics()
            .events()
            .filter_map(|e| match e {
                DiagnosticEvent::Heartbeat { frames } => Some(*frames),
                _ => None,
            })
            .collect();
        assert_eq!(beats, vec![24, 48]);
    }

    #[test]
    fn test_run_honours_frame_limit() {
        let config = SchedulerConfig {
            max_frames: Some(30),
            ..config_24p()
        };
        let mut sched = FrameScheduler::new(
            ScriptedSink::new(),
            InstantClock::new(),
            video_frame(),
            signal(),
            config,
        )
        .unwrap();

        let counters = sched.run(&StopToken::new());
        assert_eq!(counters.frames, 30);
        assert_eq!(sched.state(), SchedulerState::Stopped);
        assert_eq!(sched.sink().displays.get(), 30);
    }

    #[test]
    fn test_stop_before_start() {
        let mut sched = scheduler(ScriptedSink::new(), InstantClock::new());
        let stop = StopToken::new();
        stop.stop();

        let counters = sched.run(&stop);
        assert_eq!(counters.frames, 0);
        assert_eq!(sched.state(), SchedulerState::Stopped);
        assert_eq!(sched.sink().displays.get(), 0);
    }

    #[test]
    fn test_stop_during_wait() {
        let clock = InstantClock {
            stop_after: Some(5),
            ..InstantClock::new()
        };
        let mut sched = scheduler(ScriptedSink::new(), clock);

        let counters = sched.run(&StopToken::new());
        assert_eq!(counters.frames, 5);
        assert_eq!(sched.state(), SchedulerState::Stopped);
        assert_eq!(sched.phase(), Phase::WaitBoundary);
    }

    #[test]
    fn test_clock_reset_on_start() {
        let mut sched = scheduler(ScriptedSink::new(), InstantClock::new());
        assert_eq!(sched.state(), SchedulerState::Idle);

        let stop = StopToken::new();
        sched.tick(&stop);
        sched.tick(&stop);
        assert_eq!(sched.clock.resets, 1);
        assert_eq!(sched.state(), SchedulerState::Running);
    }

    #[test]
    fn test_pace_only_skips_output() {
        let config = SchedulerConfig {
            mode: OutputMode::PaceOnly,
            ..config_24p()
        };
        let mut sched = FrameScheduler::new(
            ScriptedSink::new(),
            InstantClock::new(),
            video_frame(),
            signal(),
            config,
        )
        .unwrap();
        let stop = StopToken::new();

        for _ in 0..24 {
            sched.tick(&stop);
        }
        assert_eq!(sched.counters().frames, 24);
        assert_eq!(sched.sink().displays.get(), 0);
        assert!(sched.sink().writes.borrow().is_empty());
    }

    #[test]
    fn test_drift_samples_are_recorded_per_frame() {
        let sample = DriftSample {
            now_ticks: 1200,
            ticks_in_frame: 200,
            ticks_per_frame: 1000,
            delta_ticks: 1200,
            expected_ticks: 1000,
            clock_calls: 4,
            clock_calls_delta: 4,
        };
        let clock = InstantClock {
            sample: Some(sample),
            ..InstantClock::new()
        };
        let mut sched = scheduler(ScriptedSink::new(), clock);
        let stop = StopToken::new();
        sched.tick(&stop);
        sched.tick(&stop);

        let drift: Vec<u64> = sched
            .diagnostics()
            .events()
            .filter_map(|e| match e {
                DiagnosticEvent::Drift { frame, .. } => Some(*frame),
                _ => None,
            })
            .collect();
        assert_eq!(drift, vec![0, 1]);
    }

    #[test]
    fn test_write_skipped_when_window_overruns_signal() {
        let mut sched = scheduler(ScriptedSink::new(), InstantClock::new());
        let stop = StopToken::new();
        // One sample-frame more than the whole one-second signal
        sched.config.sample_frame_count = 48001;

        assert_eq!(sched.tick(&stop), SchedulerState::Running);
        assert!(sched.sink().writes.borrow().is_empty());
        assert_eq!(sched.sink().displays.get(), 1);
        assert_eq!(sched.counters().frames, 1);
        assert_eq!(sched.counters().overflows, 0);
    }

    #[test]
    fn test_rejects_chunk_that_does_not_divide_signal() {
        let config = SchedulerConfig::new(1601, FrameTiming::new(1001, 30000));
        let result = FrameScheduler::new(
            ScriptedSink::new(),
            InstantClock::new(),
            video_frame(),
            signal(),
            config,
        );
        assert!(matches!(result, Err(FramepaceError::InvalidConfig(_))));
    }

    #[test]
    fn test_prepare_output_on_simulated_device() {
        let device = SimulatedDevice::new(SimulationConfig::default());
        let prepared = prepare_output(&device, &EngineConfig::default()).unwrap();

        assert_eq!(prepared.display_mode.name, "1080p24");
        assert_eq!(prepared.sample_frame_count, 2000);
        assert_eq!(prepared.frame.row_bytes, 1920 * 2);
        assert_eq!(prepared.signal.frame_count(), 48000);
        assert_eq!(prepared.scheduler_config(OutputMode::Output).heartbeat_interval, 24);
        assert_eq!(device.display_frame(&prepared.frame), DisplayResult::Success);
    }

    #[test]
    fn test_prepare_output_25p() {
        let device = SimulatedDevice::new(SimulationConfig::default());
        let config = EngineConfig {
            fps_milli: 25000,
            ..EngineConfig::default()
        };
        let prepared = prepare_output(&device, &config).unwrap();
        assert_eq!(prepared.display_mode.name, "1080p25");
        assert_eq!(prepared.sample_frame_count, 1920);
    }

    #[test]
    fn test_prepare_output_setup_failures() {
        let device = SimulatedDevice::new(SimulationConfig::default());

        let no_rate = EngineConfig {
            fps_milli: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(
            prepare_output(&device, &no_rate),
            Err(FramepaceError::NoFrameRate)
        ));

        let no_mode = EngineConfig {
            fps_milli: 60000,
            ..EngineConfig::default()
        };
        assert!(matches!(
            prepare_output(&device, &no_mode),
            Err(FramepaceError::NoMatchingDisplayMode { fps_milli: 60000 })
        ));

        let cd_audio = EngineConfig {
            sample_rate: 44100,
            ..EngineConfig::default()
        };
        assert!(prepare_output(&device, &cd_audio).is_err());
    }

    #[test]
    fn test_prepare_output_rejects_uneven_timing() {
        use crate::device::{DisplayModeId, ScanType};

        let odd = DisplayMode {
            id: DisplayModeId(1),
            name: "odd".to_string(),
            width: 640,
            height: 480,
            frame_duration: FrameTiming::new(1000, 7000),
            scan: ScanType::Progressive,
        };
        let device = SimulatedDevice::new(SimulationConfig::default()).with_modes(vec![odd]);
        let config = EngineConfig {
            fps_milli: 7000,
            ..EngineConfig::default()
        };
        assert!(matches!(
            prepare_output(&device, &config),
            Err(FramepaceError::Timing { .. })
        ));
    }
}
