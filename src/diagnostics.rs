//! Underflow/overflow accounting
//!
//! Counters only ever grow. Every event is logged as it happens, kept in a
//! bounded in-memory log for inspection, and optionally forwarded to a
//! channel subscriber.

use crate::device::DisplayResult;
use crate::sync::DriftSample;
use crossbeam_channel::{Sender, TrySendError};
use std::collections::VecDeque;
use tracing::{info, warn};

/// Events kept when no capacity is given
pub const DEFAULT_EVENT_CAPACITY: usize = 4096;

/// Running counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    pub frames: u64,
    pub underflows: u64,
    pub overflows: u64,
}

impl std::fmt::Display for Counters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "frames {} overflows {} underflows {}",
            self.frames, self.overflows, self.underflows
        )
    }
}

/// Something worth reporting during a run
#[derive(Debug, Clone, PartialEq)]
pub enum DiagnosticEvent {
    /// Device audio ring was empty at the start of a frame
    Underflow { frame: u64, counters: Counters },
    /// Device accepted fewer sample-frames than offered
    Overflow {
        frame: u64,
        requested: u32,
        accepted: u32,
        counters: Counters,
    },
    /// Frame display returned something other than success
    DisplayFailed { frame: u64, result: DisplayResult },
    /// Hardware clock snapshot at a frame boundary
    Drift { frame: u64, sample: DriftSample },
    /// Once-per-second frame count
    Heartbeat { frames: u64 },
}

impl DiagnosticEvent {
    /// Sample-frames rejected by an overflowing write
    pub fn shortfall(&self) -> Option<u32> {
        match self {
            DiagnosticEvent::Overflow {
                requested,
                accepted,
                ..
            } => Some(requested - accepted),
            _ => None,
        }
    }
}

/// Counters plus event log, owned by the scheduler
#[derive(Debug)]
pub struct Diagnostics {
    counters: Counters,
    events: VecDeque<DiagnosticEvent>,
    capacity: usize,
    dropped: u64,
    subscriber: Option<Sender<DiagnosticEvent>>,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new()
    }
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }

    /// Keep at most `capacity` events; older ones are discarded first
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            counters: Counters::default(),
            events: VecDeque::with_capacity(capacity.min(DEFAULT_EVENT_CAPACITY)),
            capacity,
            dropped: 0,
            subscriber: None,
        }
    }

    /// Forward every event to `tx` as well
    ///
    /// Sends never block; events are skipped while the channel is full and the
    /// subscriber is dropped once the receiver goes away.
    pub fn set_event_channel(&mut self, tx: Sender<DiagnosticEvent>) {
        self.subscriber = Some(tx);
    }

    /// Snapshot of the counters
    pub fn counters(&self) -> Counters {
        self.counters
    }

    /// Retained events, oldest first
    pub fn events(&self) -> impl Iterator<Item = &DiagnosticEvent> {
        self.events.iter()
    }

    /// Events discarded because the log was full
    pub fn dropped_events(&self) -> u64 {
        self.dropped
    }

    /// Count a completed frame and return the new total
    pub fn record_frame(&mut self) -> u64 {
        self.counters.frames += 1;
        self.counters.frames
    }

    pub fn record_underflow(&mut self, frame: u64) {
        self.counters.underflows += 1;
        warn!(
            "audio buffer underflow! at frame {} overflows {} underflows {}",
            frame, self.counters.overflows, self.counters.underflows
        );
        self.push(DiagnosticEvent::Underflow {
            frame,
            counters: self.counters,
        });
    }

    pub fn record_overflow(&mut self, frame: u64, requested: u32, accepted: u32) {
        self.counters.overflows += 1;
        warn!(
            "audio buffer overflow! {} sample-frames rejected at frame {} overflows {} underflows {}",
            requested - accepted,
            frame,
            self.counters.overflows,
            self.counters.underflows
        );
        self.push(DiagnosticEvent::Overflow {
            frame,
            requested,
            accepted,
            counters: self.counters,
        });
    }

    pub fn record_display_failure(&mut self, frame: u64, result: DisplayResult) {
        warn!("display frame failed ({}) at frame {}", result, frame);
        self.push(DiagnosticEvent::DisplayFailed { frame, result });
    }

    pub fn record_drift(&mut self, frame: u64, sample: DriftSample) {
        self.push(DiagnosticEvent::Drift { frame, sample });
    }

    pub fn record_heartbeat(&mut self) {
        let frames = self.counters.frames;
        info!("{}", frames);
        self.push(DiagnosticEvent::Heartbeat { frames });
    }

    fn push(&mut self, event: DiagnosticEvent) {
        if let Some(tx) = &self.subscriber {
            if let Err(TrySendError::Disconnected(_)) = tx.try_send(event.clone()) {
                self.subscriber = None;
            }
        }

        if self.capacity == 0 {
            self.dropped += 1;
            return;
        }
        if self.events.len() == self.capacity {
            self.events.pop_front();
            self.dropped += 1;
        }
        self.events.push_back(event);
    }
}
