//! # Pitch Estimation Module
//!
//! Picks the dominant frequency of a conditioned block from its magnitude
//! spectrum. The estimate is the center frequency of the strongest bin,
//! `bin * sample_rate / block_len`, so its resolution is one bin width.
//!
//! Only a single dominant frequency is tracked; chords and other polyphonic
//! material report whichever partial is loudest.

use crate::fft::SpectrumAnalyzer;

/// Dominant frequency of `signal` in Hz.
///
/// Plans a fresh FFT on every call; use [`PitchEstimator`] in loops.
///
/// # Returns
/// * `Some(freq)` - center frequency of the strongest non-DC bin
/// * `None` - empty, silent or non-finite input, or a block whose energy sits at DC
pub fn peak_frequency(signal: &[f64], sample_rate: u32) -> Option<f64> {
    if signal.is_empty() {
        return None;
    }
    PitchEstimator::new(signal.len(), sample_rate).estimate(signal)
}

/// Index of the largest magnitude; the first one wins ties.
///
/// Returns `None` when every magnitude is zero or any is not finite.
pub fn peak_bin(magnitudes: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (bin, &magnitude) in magnitudes.iter().enumerate() {
        if !magnitude.is_finite() {
            return None;
        }
        match best {
            Some((_, top)) if magnitude <= top => {}
            _ if magnitude > 0.0 => best = Some((bin, magnitude)),
            _ => {}
        }
    }
    best.map(|(bin, _)| bin)
}

/// Spectral peak picker for blocks of one fixed length.
#[derive(Debug)]
pub struct PitchEstimator {
    analyzer: SpectrumAnalyzer,
    sample_rate: u32,
}

impl PitchEstimator {
    pub fn new(block_len: usize, sample_rate: u32) -> Self {
        Self {
            analyzer: SpectrumAnalyzer::new(block_len),
            sample_rate,
        }
    }

    /// Width of one spectrum bin in Hz.
    pub fn bin_width_hz(&self) -> f64 {
        self.sample_rate as f64 / self.analyzer.len() as f64
    }

    /// Dominant frequency of a block of the planned length.
    ///
    /// Blocks of any other length are analyzed with a one-off plan.
    pub fn estimate(&mut self, signal: &[f64]) -> Option<f64> {
        if signal.is_empty() || signal.iter().any(|s| !s.is_finite()) {
            return None;
        }
        if signal.len() != self.analyzer.len() {
            return peak_frequency(signal, self.sample_rate);
        }

        let magnitudes = self.analyzer.magnitudes(signal);
        match peak_bin(&magnitudes)? {
            0 => None,
            bin => Some(bin as f64 * self.bin_width_hz()),
        }
    }
}
