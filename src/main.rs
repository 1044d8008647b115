//! framepace - video/audio output pacing probe CLI

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use framepace::audio::{prepare_output, FrameScheduler, OutputMode};
use framepace::config::{Args, ProbeConfig};
use framepace::device::{DeviceEnumerator, OutputDevice, SimulatedEnumerator};
use framepace::sync::{ClockKind, ClockSource, HardwareClock, HostTime, StopToken, WallClock};
use framepace::FramepaceError;

const USAGE_HINT: &str = "Choose -a for 24 fps -b for 25 fps -v for verbose";

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ProbeConfig::load(path)?,
        None => ProbeConfig::load_default()?,
    };
    config.apply_args(&args);

    if let Some(path) = &args.write_config {
        config.save(path)?;
        println!("Configuration written to {}", path.display());
        return Ok(());
    }

    init_logging(&args, &config)?;

    if let Err(e) = run(&args, &config) {
        if let Some(FramepaceError::NoFrameRate) = e.downcast_ref::<FramepaceError>() {
            eprintln!("{}", USAGE_HINT);
            std::process::exit(1);
        }
        return Err(e);
    }

    Ok(())
}

fn init_logging(args: &Args, config: &ProbeConfig) -> Result<()> {
    let level = args.log_level(config.level()?);

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    if let Some(log_file) = config.log_path() {
        let file = std::fs::File::create(log_file)
            .with_context(|| format!("Failed to create log file '{}'", log_file))?;
        subscriber.with_writer(file).with_ansi(false).init();
    } else {
        subscriber.init();
    }

    Ok(())
}

/// Set up the device and pace frames until Ctrl+C or the frame limit
fn run(args: &Args, config: &ProbeConfig) -> Result<()> {
    if config.fps == 0 {
        return Err(FramepaceError::NoFrameRate.into());
    }

    println!(
        "framepace {} - video/audio output pacing probe\n",
        framepace::VERSION
    );

    let enumerator = SimulatedEnumerator::new(config.simulation.clone());
    let device = enumerator.first_device()?;

    let prepared = prepare_output(&device, &config.to_engine_config())
        .context("Failed to set up output")?;
    let timing = prepared.timing();

    let clock: Box<dyn ClockSource> = match config.clock {
        ClockKind::Wall => Box::new(WallClock::new(HostTime::new(), timing.period())),
        ClockKind::Hardware => Box::new(HardwareClock::new(
            device.clone(),
            timing.time_scale,
            args.clock_verbose(),
        )?),
    };

    let mode = if args.pace_only {
        OutputMode::PaceOnly
    } else {
        OutputMode::Output
    };
    let mut scheduler_config = prepared.scheduler_config(mode);
    scheduler_config.max_frames = args.frames;

    println!("Device:       {}", device.name());
    println!("Display mode: {}", prepared.display_mode);
    println!("Audio format: {}", prepared.format);
    println!("Clock:        {}", config.clock);

    let mut scheduler = FrameScheduler::new(
        device.clone(),
        clock,
        prepared.frame,
        prepared.signal,
        scheduler_config,
    )?;

    // Setup Ctrl+C handler
    let stop = StopToken::new();
    let s = stop.clone();
    ctrlc::set_handler(move || {
        println!("\nReceived Ctrl+C, stopping...");
        s.stop();
    })
    .context("Failed to install Ctrl+C handler")?;

    println!("\nPacing frames. Press Ctrl+C to stop.\n");
    let counters = scheduler.run(&stop);
    info!(
        "Device: {} frames displayed, {} playback underruns",
        device.frames_displayed(),
        device.underruns()
    );

    println!("\nStopped after {} frames", counters.frames);
    println!("  Underflows: {}", counters.underflows);
    println!("  Overflows:  {}", counters.overflows);
    if scheduler.diagnostics().dropped_events() > 0 {
        println!(
            "  ({} diagnostic events dropped from the in-memory log)",
            scheduler.diagnostics().dropped_events()
        );
    }

    Ok(())
}
