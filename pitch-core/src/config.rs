//! # Tracker Configuration
//!
//! Every knob of the engine lives in [`TrackerConfig`], passed by value into
//! [`crate::PitchTracker::start`]. Nothing is read from globals.
//!
//! The configuration is validated once, before the capture thread exists,
//! so that range and window mistakes fail fast instead of mid-stream.

use serde::{Deserialize, Serialize};

use crate::error::{PitchError, Result};
use crate::{filter, savgol, window::WindowKind};

/// Configuration for the pitch tracking engine.
///
/// JSON keys are camelCase (`sampleRate`, `lowCutHz`, ...); missing keys
/// fall back to [`TrackerConfig::default`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TrackerConfig {
    /// Capture rate in Hz. Also sets the FFT bin resolution.
    pub sample_rate: u32,
    /// Samples per capture cycle. Resolution is `sample_rate / buffer_size` Hz per bin.
    pub buffer_size: usize,
    /// Depth of the rolling median over frequency estimates.
    pub history_size: usize,
    /// Lower band-pass cutoff in Hz.
    pub low_cut_hz: f64,
    /// Upper band-pass cutoff in Hz.
    pub high_cut_hz: f64,
    /// Mean absolute amplitude (in 16-bit sample units) below which a block is silence.
    pub amplitude_threshold: f64,
    /// EMA responsiveness in (0, 1]. 1 snaps instantly.
    pub smoothing_alpha: f64,
    /// Whole octaves added to every detected note.
    pub octave_offset: i32,
    /// Input device index; `None` uses the host default.
    pub device_index: Option<usize>,
    /// Savitzky-Golay window length (forced odd, at least 5).
    pub smoothing_window: usize,
    /// Savitzky-Golay polynomial order.
    pub smoothing_poly_order: usize,
    /// Taper applied before the FFT.
    pub window_kind: WindowKind,
    /// Clear the median history and EMA after this many silent cycles in a row.
    pub silence_reset_cycles: Option<u32>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            sample_rate: 2048,
            buffer_size: 128,
            history_size: 1,
            low_cut_hz: 80.0,
            high_cut_hz: 1000.0,
            amplitude_threshold: 60.0,
            smoothing_alpha: 1.0,
            octave_offset: 0,
            device_index: None,
            smoothing_window: 5,
            smoothing_poly_order: 2,
            window_kind: WindowKind::Hamming,
            silence_reset_cycles: None,
        }
    }
}

impl TrackerConfig {
    /// Settings used by the singing game: voices are tracked one octave up.
    pub fn karaoke() -> Self {
        Self {
            octave_offset: 1,
            ..Self::default()
        }
    }

    /// Settings for whistle control: higher band, longer blocks, louder gate.
    pub fn whistle() -> Self {
        Self {
            sample_rate: 4096,
            buffer_size: 1024,
            high_cut_hz: 2000.0,
            amplitude_threshold: 180.0,
            smoothing_window: 57,
            ..Self::default()
        }
    }

    /// Width of one FFT bin in Hz.
    pub fn bin_width_hz(&self) -> f64 {
        self.sample_rate as f64 / self.buffer_size as f64
    }

    /// Smoothing window length after odd/minimum coercion.
    pub fn effective_smoothing_window(&self) -> usize {
        savgol::effective_window_len(self.smoothing_window)
    }

    /// Checks every option against the others.
    ///
    /// # Returns
    /// * `Ok(())` - The configuration can drive the engine
    /// * `Err(PitchError::InvalidFilterRange)` - Cutoffs outside `(0, sample_rate / 2)`
    /// * `Err(PitchError::InvalidWindow)` - Smoothing window longer than a block
    /// * `Err(PitchError::InvalidConfig)` - Any other out-of-range option
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(PitchError::InvalidConfig("sample rate must be positive".into()));
        }
        if self.buffer_size == 0 {
            return Err(PitchError::InvalidConfig("buffer size must be positive".into()));
        }
        if self.history_size == 0 {
            return Err(PitchError::InvalidConfig("history size must be at least 1".into()));
        }
        if !(self.smoothing_alpha > 0.0 && self.smoothing_alpha <= 1.0) {
            return Err(PitchError::InvalidConfig(format!(
                "smoothing alpha {} is outside (0, 1]",
                self.smoothing_alpha
            )));
        }
        if !self.amplitude_threshold.is_finite() || self.amplitude_threshold < 0.0 {
            return Err(PitchError::InvalidConfig(format!(
                "amplitude threshold {} must be a non-negative number",
                self.amplitude_threshold
            )));
        }
        if self.silence_reset_cycles == Some(0) {
            return Err(PitchError::InvalidConfig(
                "silence reset needs at least one cycle".into(),
            ));
        }

        filter::check_band(self.low_cut_hz, self.high_cut_hz, self.sample_rate)?;
        savgol::check_window(
            self.effective_smoothing_window(),
            self.smoothing_poly_order,
            self.buffer_size,
        )?;

        Ok(())
    }
}
