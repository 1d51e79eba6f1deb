//! # Fast Fourier Transform (FFT) Module
//!
//! Magnitude spectra of real sample blocks for spectral peak picking.
//!
//! ## Features
//! - FFT plans from RustFFT, planned once per block length
//! - Reused complex and scratch buffers, so the capture loop does not allocate
//!   a new plan per cycle
//! - Only the non-negative frequency half of the spectrum is returned

use rustfft::{Fft, FftPlanner, num_complex::Complex};
use std::sync::Arc;

/// Number of spectrum bins from DC up to and including Nyquist.
pub fn half_spectrum_len(block_len: usize) -> usize {
    block_len / 2 + 1
}

/// A forward FFT planned for one block length.
pub struct SpectrumAnalyzer {
    fft: Arc<dyn Fft<f64>>,
    buffer: Vec<Complex<f64>>,
    scratch: Vec<Complex<f64>>,
}

impl std::fmt::Debug for SpectrumAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectrumAnalyzer")
            .field("len", &self.buffer.len())
            .finish()
    }
}

impl SpectrumAnalyzer {
    /// Plans a forward FFT of `len` points.
    pub fn new(len: usize) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(len);
        let scratch = vec![Complex::default(); fft.get_inplace_scratch_len()];
        Self {
            fft,
            buffer: vec![Complex::default(); len],
            scratch,
        }
    }

    /// Block length this analyzer was planned for.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Computes `|X[k]|` for `k = 0..=len/2`.
    ///
    /// # Panics
    /// * If `signal.len()` differs from the planned length
    pub fn magnitudes(&mut self, signal: &[f64]) -> Vec<f64> {
        assert_eq!(
            signal.len(),
            self.buffer.len(),
            "signal length must match the planned FFT length"
        );
        if signal.is_empty() {
            return Vec::new();
        }

        for (slot, &sample) in self.buffer.iter_mut().zip(signal) {
            *slot = Complex { re: sample, im: 0.0 };
        }
        self.fft
            .process_with_scratch(&mut self.buffer, &mut self.scratch);
        spectrum_to_magnitudes(&self.buffer)
    }
}

/// Magnitudes of the non-negative frequency half of a full complex spectrum.
pub fn spectrum_to_magnitudes(spectrum: &[Complex<f64>]) -> Vec<f64> {
    spectrum
        .iter()
        .take(half_spectrum_len(spectrum.len()))
        .map(|c| c.norm()) // .norm() is sqrt(re^2 + im^2)
        .collect()
}
