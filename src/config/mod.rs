//! Command line and configuration file

mod args;
mod file;

pub use args::Args;
pub use file::{ConfigError, ProbeConfig};
