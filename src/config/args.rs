//! CLI argument parsing using clap

use crate::sync::ClockKind;
use clap::Parser;
use std::path::PathBuf;
use tracing::Level;

/// framepace - video/audio output pacing probe
///
/// Streams a video frame and a 1 kHz tone per frame boundary and counts audio
/// buffer underflows and overflows
#[derive(Parser, Debug, Default)]
#[command(name = "framepace")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "Choose -a for 24 fps -b for 25 fps -v for verbose")]
pub struct Args {
    /// 24 fps output (1080p24)
    #[arg(short = 'a')]
    pub fps_24: bool,

    /// 25 fps output (1080p25), wins over -a
    #[arg(short = 'b')]
    pub fps_25: bool,

    /// Frame rate in milli-fps (24000 = 24 fps)
    #[arg(long, value_name = "MILLI")]
    pub fps: Option<u32>,

    /// Clock used to find frame boundaries
    #[arg(long, value_enum)]
    pub clock: Option<ClockKind>,

    /// Pace and count frames without displaying video or writing audio
    #[arg(long)]
    pub pace_only: bool,

    /// Stop after this many frames (default: run until Ctrl+C)
    #[arg(long, value_name = "N")]
    pub frames: Option<u64>,

    /// Simulated device clock error in parts per million
    #[arg(long, value_name = "PPM", allow_hyphen_values = true)]
    pub drift_ppm: Option<f64>,

    /// Configuration file
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Write the effective configuration to FILE and exit
    #[arg(long, value_name = "FILE")]
    pub write_config: Option<PathBuf>,

    /// Verbose output: -v reports the hardware clock every frame, -vv debug, -vvv trace
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode - only show errors
    #[arg(short, long)]
    pub quiet: bool,

    /// Log output to file
    #[arg(long)]
    pub log: Option<String>,
}

impl Args {
    /// Frame rate requested on the command line, if any
    pub fn fps_override(&self) -> Option<u32> {
        if self.fps_25 {
            Some(25000)
        } else if self.fps_24 {
            Some(24000)
        } else {
            self.fps
        }
    }

    /// Per-frame clock reporting
    pub fn clock_verbose(&self) -> bool {
        self.verbose > 0
    }

    /// Get the log level from the quiet/verbose flags, falling back to `configured`
    pub fn log_level(&self, configured: Level) -> Level {
        if self.quiet {
            Level::ERROR
        } else {
            match self.verbose {
                0 | 1 => configured,
                2 => configured.max(Level::DEBUG),
                _ => Level::TRACE,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("framepace").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_rate_flags() {
        assert_eq!(parse(&[]).fps_override(), None);
        assert_eq!(parse(&["-a"]).fps_override(), Some(24000));
        assert_eq!(parse(&["-b"]).fps_override(), Some(25000));
        assert_eq!(parse(&["-a", "-b"]).fps_override(), Some(25000));
        assert_eq!(parse(&["-b", "-a"]).fps_override(), Some(25000));
        assert_eq!(parse(&["--fps", "50000"]).fps_override(), Some(50000));
        assert_eq!(parse(&["-a", "--fps", "50000"]).fps_override(), Some(24000));
    }

    #[test]
    fn test_verbosity() {
        let args = parse(&["-v"]);
        assert!(args.clock_verbose());
        assert_eq!(args.log_level(Level::INFO), Level::INFO);

        assert_eq!(parse(&["-vv"]).log_level(Level::INFO), Level::DEBUG);
        assert_eq!(parse(&["-vvv"]).log_level(Level::INFO), Level::TRACE);
        assert_eq!(parse(&["-q", "-v"]).log_level(Level::INFO), Level::ERROR);
        assert_eq!(parse(&[]).log_level(Level::WARN), Level::WARN);
    }

    #[test]
    fn test_clock_and_simulation_flags() {
        let args = parse(&[
            "--clock",
            "hardware",
            "--drift-ppm",
            "-250",
            "--frames",
            "96",
            "--pace-only",
        ]);
        assert_eq!(args.clock, Some(ClockKind::Hardware));
        assert_eq!(args.drift_ppm, Some(-250.0));
        assert_eq!(args.frames, Some(96));
        assert!(args.pace_only);
    }

    #[test]
    fn test_write_config_flag() {
        assert_eq!(parse(&[]).write_config, None);
        let args = parse(&["--write-config", "probe.toml", "-b"]);
        assert_eq!(args.write_config, Some(PathBuf::from("probe.toml")));
        assert_eq!(args.fps_override(), Some(25000));
    }

    #[test]
    fn test_help_flag() {
        let err = Args::try_parse_from(["framepace", "-h"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
        assert!(err
            .to_string()
            .contains("Choose -a for 24 fps -b for 25 fps -v for verbose"));
    }
}
