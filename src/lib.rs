//! framepace - video/audio output pacing probe
//!
//! Drives an output device one video frame at a time, feeding a looped test
//! tone alongside each frame, and counts audio buffer underflows and overflows
//! to expose drift between the host and the device clocks.

pub mod audio;
pub mod config;
pub mod device;
pub mod diagnostics;
pub mod error;
pub mod sync;

pub use error::{FramepaceError, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
