//! Configuration file support

use crate::audio::{EngineConfig, ToneParams};
use crate::config::Args;
use crate::device::{PixelFormat, SimulationConfig};
use crate::sync::ClockKind;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::Level;

/// Probe configuration loaded from a TOML file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Frame rate in milli-fps (24000 = 24 fps)
    pub fps: u32,

    /// Frame boundary clock (wall, hardware)
    pub clock: ClockKind,

    /// Audio sample rate in Hz
    pub sample_rate: u32,

    /// Audio channel count
    pub channels: u16,

    /// Audio sample depth
    pub bits_per_sample: u16,

    /// Test tone frequency in Hz
    pub frequency_hz: u32,

    /// Test tone RMS level in dBFS
    pub volume_db: f64,

    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// Log file path (empty = stderr)
    pub log_file: String,

    /// Simulated device settings
    pub simulation: SimulationConfig,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            fps: 24000,
            clock: ClockKind::Wall,
            sample_rate: 48000,
            channels: 2,
            bits_per_sample: 16,
            frequency_hz: 1000,
            volume_db: -18.0,
            log_level: "info".to_string(),
            log_file: String::new(),
            simulation: SimulationConfig::default(),
        }
    }
}

impl ProbeConfig {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().to_string_lossy().to_string(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_string_lossy().to_string(),
            source: e,
        })
    }

    /// Default config file location: `<config dir>/framepace/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("framepace").join("config.toml"))
    }

    /// Load from the default location, or built-in defaults if there is no file
    pub fn load_default() -> Result<Self, ConfigError> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(path),
            _ => Ok(Self::default()),
        }
    }

    /// Save configuration to a TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
                path: parent.to_string_lossy().to_string(),
                source: e,
            })?;
        }

        std::fs::write(path.as_ref(), content).map_err(|e| ConfigError::Io {
            path: path.as_ref().to_string_lossy().to_string(),
            source: e,
        })
    }

    /// Fold command-line overrides into this configuration
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(fps) = args.fps_override() {
            self.fps = fps;
        }
        if let Some(clock) = args.clock {
            self.clock = clock;
        }
        if let Some(ppm) = args.drift_ppm {
            self.simulation.drift_ppm = ppm;
        }
        if let Some(log) = &args.log {
            self.log_file = log.clone();
        }
    }

    /// Parsed `log_level`
    pub fn level(&self) -> Result<Level, ConfigError> {
        Level::from_str(self.log_level.trim()).map_err(|_| ConfigError::InvalidValue {
            field: "log_level",
            message: format!("unknown level '{}'", self.log_level),
        })
    }

    /// Log file path, if one is configured
    pub fn log_path(&self) -> Option<&str> {
        if self.log_file.is_empty() {
            None
        } else {
            Some(&self.log_file)
        }
    }

    /// Convert to EngineConfig
    pub fn to_engine_config(&self) -> EngineConfig {
        EngineConfig {
            fps_milli: self.fps,
            sample_rate: self.sample_rate,
            channels: self.channels,
            bits_per_sample: self.bits_per_sample,
            tone: ToneParams {
                frequency_hz: self.frequency_hz,
                volume_db: self.volume_db,
            },
            pixel_format: PixelFormat::Yuv8Bit,
        }
    }
}

/// Configuration error types
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading/writing config file
    Io {
        path: String,
        source: std::io::Error,
    },
    /// Error parsing TOML
    Parse {
        path: String,
        source: toml::de::Error,
    },
    /// Error serializing config
    Serialize(toml::ser::Error),
    /// Field has an unusable value
    InvalidValue {
        field: &'static str,
        message: String,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "Failed to access config file '{}': {}", path, source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "Failed to parse config file '{}': {}", path, source)
            }
            ConfigError::Serialize(e) => write!(f, "Failed to serialize config: {}", e),
            ConfigError::InvalidValue { field, message } => {
                write!(f, "Invalid config value for '{}': {}", field, message)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            ConfigError::Serialize(e) => Some(e),
            ConfigError::InvalidValue { .. } => None,
        }
    }
}
