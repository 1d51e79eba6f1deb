// pitch-core/src/lib.rs

//! The core logic for the real-time pitch tracker.
//! This crate captures microphone audio on a dedicated thread, finds the
//! dominant frequency of each block, and publishes a smoothed note number
//! that any consumer can poll at its own rate. It is completely headless
//! and contains no GUI code.
//!
//! Per block: energy gate → band-pass → Savitzky-Golay smoothing → window →
//! FFT peak pick → rolling median → EMA over note numbers → publish.

pub mod audio;
pub mod conditioning;
pub mod config;
pub mod error;
pub mod fft;
pub mod filter;
pub mod gesture;
pub mod notes;
pub mod pitch;
pub mod savgol;
pub mod smoother;
pub mod tracker;
pub mod window;

pub use audio::{AudioSource, CpalSource, PcmReaderSource, ReadOutcome, SourceConfig};
pub use config::TrackerConfig;
pub use error::{PitchError, Result};
pub use gesture::{Step, StepDetector};
pub use notes::{frequency_to_note, note_name, note_to_frequency};
pub use pitch::{PitchEstimator, peak_frequency};
pub use tracker::{PitchPipeline, PitchTracker};
pub use window::WindowKind;

/// The latest result of the capture loop, published once per cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PitchReading {
    /// Rounded smoothed note; `None` when the last cycle was silent or unpitched.
    pub note: Option<i32>,
    /// The running EMA over note numbers. Survives silent cycles; `None`
    /// before the first voiced cycle and after a reset.
    pub smoothed_note: Option<f64>,
    /// Median frequency of the last voiced cycle, in Hz; `None` when silent.
    pub frequency: Option<f64>,
    /// Mean absolute amplitude of the last block, in 16-bit sample units.
    pub amplitude: f64,
    /// Number of completed capture cycles.
    pub cycle: u64,
}

impl PitchReading {
    /// The published note with `-1` standing in for "no note", for text and
    /// legacy integer interfaces.
    pub fn note_or_sentinel(&self) -> i32 {
        self.note.unwrap_or(-1)
    }
}
