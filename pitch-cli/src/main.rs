//! # Pitch CLI
//!
//! Headless consumer of the pitch tracking engine. It starts the capture
//! thread, polls the published reading at a fixed tick the way a frame-locked
//! game loop would, and logs every note change.
//!
//! ## Usage
//! - `pitch-cli` - track the default microphone with default settings
//! - `pitch-cli --preset whistle --steps` - whistle control, logging up/down steps
//! - `arecord -f S16_LE -c1 -r 2048 | pitch-cli --stdin` - track a PCM pipe
//! - `pitch-cli --list-devices` - show input devices and their indices

use std::fs;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use pitch_core::audio::list_input_devices;
use pitch_core::{
    PcmReaderSource, PitchTracker, StepDetector, TrackerConfig, WindowKind, note_name,
};

#[derive(Parser, Debug)]
#[command(name = "pitch-cli", version, about = "Real-time microphone pitch tracker")]
struct Cli {
    /// JSON file with a tracker configuration (camelCase keys)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Starting settings, applied before the config file and flags
    #[arg(short, long, value_enum, default_value_t = Preset::Default)]
    preset: Preset,

    /// Input device index (see --list-devices)
    #[arg(short, long)]
    device: Option<usize>,

    /// Read little-endian 16-bit mono PCM from stdin instead of a device
    #[arg(long)]
    stdin: bool,

    /// Capture rate in Hz
    #[arg(long)]
    sample_rate: Option<u32>,

    /// Samples per capture cycle
    #[arg(long)]
    buffer_size: Option<usize>,

    /// Rolling median depth
    #[arg(long)]
    history_size: Option<usize>,

    /// Lower band-pass cutoff in Hz
    #[arg(long)]
    low_cut: Option<f64>,

    /// Upper band-pass cutoff in Hz
    #[arg(long)]
    high_cut: Option<f64>,

    /// Mean absolute amplitude below which a block counts as silence
    #[arg(long)]
    threshold: Option<f64>,

    /// EMA weight of the newest note, in (0, 1]
    #[arg(long)]
    alpha: Option<f64>,

    /// Whole octaves added to every note
    #[arg(long, allow_hyphen_values = true)]
    octave_offset: Option<i32>,

    /// Savitzky-Golay window length
    #[arg(long)]
    smoothing_window: Option<usize>,

    /// Taper applied before the FFT
    #[arg(long, value_enum)]
    window: Option<WindowArg>,

    /// Clear the estimate after this many silent cycles
    #[arg(long)]
    silence_reset: Option<u32>,

    /// How often the published reading is polled
    #[arg(long, default_value_t = 60.0)]
    tick_hz: f64,

    /// Stop after this many seconds
    #[arg(long)]
    duration: Option<f64>,

    /// Log up/down pitch steps (whistle control)
    #[arg(long)]
    steps: bool,

    /// Print the resolved configuration as JSON and exit
    #[arg(long)]
    print_config: bool,

    /// List input devices and exit
    #[arg(long)]
    list_devices: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Preset {
    Default,
    Karaoke,
    Whistle,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum WindowArg {
    Hamming,
    Hann,
    Rectangular,
}

impl From<WindowArg> for WindowKind {
    fn from(arg: WindowArg) -> Self {
        match arg {
            WindowArg::Hamming => WindowKind::Hamming,
            WindowArg::Hann => WindowKind::Hann,
            WindowArg::Rectangular => WindowKind::Rectangular,
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    if cli.list_devices {
        return list_devices();
    }

    let config = resolve_config(&cli)?;
    if cli.print_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }
    config.validate().context("Invalid tracker configuration")?;

    if !(cli.tick_hz.is_finite() && cli.tick_hz > 0.0) {
        bail!("--tick-hz must be a positive number, got {}", cli.tick_hz);
    }
    let tick = Duration::try_from_secs_f64(1.0 / cli.tick_hz)
        .with_context(|| format!("--tick-hz {} is too slow to poll at", cli.tick_hz))?;
    let limit = run_time(cli.duration)?;

    let tracker = if cli.stdin {
        PitchTracker::start_with(config, |_| Ok(PcmReaderSource::new(std::io::stdin())))
            .context("Failed to start tracking stdin")?
    } else {
        PitchTracker::start(config).context("Failed to open the audio input device")?
    };

    run(&cli, tracker, tick, limit)
}

/// Preset, then config file, then individual flags.
fn resolve_config(cli: &Cli) -> Result<TrackerConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            let overrides: serde_json::Value = serde_json::from_str(&text)
                .with_context(|| format!("Failed to parse config file {}", path.display()))?;
            merge_json(preset_config(cli.preset), overrides)?
        }
        None => preset_config(cli.preset),
    };

    if let Some(device) = cli.device {
        config.device_index = Some(device);
    }
    if let Some(sample_rate) = cli.sample_rate {
        config.sample_rate = sample_rate;
    }
    if let Some(buffer_size) = cli.buffer_size {
        config.buffer_size = buffer_size;
    }
    if let Some(history_size) = cli.history_size {
        config.history_size = history_size;
    }
    if let Some(low) = cli.low_cut {
        config.low_cut_hz = low;
    }
    if let Some(high) = cli.high_cut {
        config.high_cut_hz = high;
    }
    if let Some(threshold) = cli.threshold {
        config.amplitude_threshold = threshold;
    }
    if let Some(alpha) = cli.alpha {
        config.smoothing_alpha = alpha;
    }
    if let Some(offset) = cli.octave_offset {
        config.octave_offset = offset;
    }
    if let Some(window_len) = cli.smoothing_window {
        config.smoothing_window = window_len;
    }
    if let Some(window) = cli.window {
        config.window_kind = window.into();
    }
    if cli.silence_reset.is_some() {
        config.silence_reset_cycles = cli.silence_reset;
    }
    Ok(config)
}

fn preset_config(preset: Preset) -> TrackerConfig {
    match preset {
        Preset::Default => TrackerConfig::default(),
        Preset::Karaoke => TrackerConfig::karaoke(),
        Preset::Whistle => TrackerConfig::whistle(),
    }
}

/// Overlays the keys present in `overrides` onto `base`.
fn merge_json(base: TrackerConfig, overrides: serde_json::Value) -> Result<TrackerConfig> {
    let serde_json::Value::Object(overrides) = overrides else {
        bail!("Config file must contain a JSON object");
    };
    let mut merged = serde_json::to_value(base)?;
    if let serde_json::Value::Object(fields) = &mut merged {
        fields.extend(overrides);
    }
    serde_json::from_value(merged).context("Config file has an invalid value")
}

fn list_devices() -> Result<()> {
    let devices = list_input_devices().context("Failed to enumerate input devices")?;
    if devices.is_empty() {
        println!("No input devices found");
    }
    for device in devices {
        let marker = if device.is_default { " (default)" } else { "" };
        println!("{:>3}: {}{}", device.index, device.name, marker);
    }
    Ok(())
}

/// Converts `--duration` seconds, rejecting values a `Duration` cannot hold.
fn run_time(seconds: Option<f64>) -> Result<Option<Duration>> {
    seconds
        .map(|secs| {
            Duration::try_from_secs_f64(secs)
                .with_context(|| format!("--duration {} is not a usable number of seconds", secs))
        })
        .transpose()
}

/// Polls the tracker at the tick rate until the source ends or time runs out.
fn run(
    cli: &Cli,
    mut tracker: PitchTracker,
    tick: Duration,
    limit: Option<Duration>,
) -> Result<()> {
    // A limit too far out to represent as an Instant never expires.
    let deadline = limit.and_then(|limit| Instant::now().checked_add(limit));
    let mut steps = cli.steps.then(StepDetector::default);
    let mut last_note: Option<Option<i32>> = None;

    log::info!(
        "Tracking at {} Hz ({:.1} Hz per bin), polling at {} Hz",
        tracker.config().sample_rate,
        tracker.config().bin_width_hz(),
        cli.tick_hz
    );

    while tracker.is_running() {
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            break;
        }

        let reading = tracker.reading();
        if last_note != Some(reading.note) {
            match reading.note {
                Some(note) => println!(
                    "{:>4} {:<4} {:>7.1} Hz  (smoothed {:.2})",
                    note,
                    note_name(note),
                    reading.frequency.unwrap_or_default(),
                    reading.smoothed_note.unwrap_or_default()
                ),
                None => println!("{:>4} -", reading.note_or_sentinel()),
            }
            last_note = Some(reading.note);
        }

        if let Some(detector) = steps.as_mut() {
            if let Some(step) = detector.update(reading.frequency) {
                println!("step {:?}", step);
            }
        }

        thread::sleep(tick);
    }

    tracker.close();
    Ok(())
}
