//! Error types for the pitch tracking engine.
//!
//! Everything here is surfaced synchronously from [`crate::PitchTracker::start`]
//! or from the pure DSP functions. Transient per-cycle conditions (overflow,
//! silence, no pitch) are not errors and never show up as a `PitchError`
//! on the consumer side.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PitchError>;

#[derive(Error, Debug)]
pub enum PitchError {
    #[error("Audio device error: {0}")]
    Device(String),

    #[error("No input device at index {0}")]
    DeviceNotFound(usize),

    #[error("Device does not support {channels} channel(s) at {sample_rate} Hz")]
    UnsupportedFormat { sample_rate: u32, channels: u16 },

    #[error(
        "Invalid band-pass range {low_hz}..{high_hz} Hz for sample rate {sample_rate} Hz \
         (need 0 < low < high < sample_rate / 2)"
    )]
    InvalidFilterRange {
        low_hz: f64,
        high_hz: f64,
        sample_rate: u32,
    },

    #[error("Invalid smoothing window of {window_len} samples for a {block_len}-sample block")]
    InvalidWindow { window_len: usize, block_len: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Capture thread error: {0}")]
    Thread(String),
}
