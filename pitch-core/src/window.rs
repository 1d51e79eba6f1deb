//! # Window Functions
//!
//! Tapers applied to a block before the FFT to reduce spectral leakage.
//! All windows are the periodic ("DFT-even") variants, which is what spectral
//! analysis of a single block wants.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Window applied before spectral analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowKind {
    /// `0.54 - 0.46 cos(2πn/N)`
    #[default]
    Hamming,
    /// `0.5 - 0.5 cos(2πn/N)`
    Hann,
    /// No taper.
    Rectangular,
}

impl WindowKind {
    /// Window coefficient for sample `n` of a block of length `len`.
    fn coefficient(self, n: usize, len: usize) -> f64 {
        let phase = 2.0 * PI * n as f64 / len as f64;
        match self {
            WindowKind::Hamming => 0.54 - 0.46 * phase.cos(),
            WindowKind::Hann => 0.5 - 0.5 * phase.cos(),
            WindowKind::Rectangular => 1.0,
        }
    }
}

/// Computes the window coefficients for a block of `len` samples.
///
/// A length-1 window is `[1.0]`, an empty one is empty.
pub fn window_table(kind: WindowKind, len: usize) -> Vec<f64> {
    if len == 1 {
        return vec![1.0];
    }
    (0..len).map(|n| kind.coefficient(n, len)).collect()
}

/// Multiplies `buffer` by the window in place.
pub fn apply_window(kind: WindowKind, buffer: &mut [f64]) {
    let len = buffer.len();
    if len <= 1 {
        return;
    }
    for (n, sample) in buffer.iter_mut().enumerate() {
        *sample *= kind.coefficient(n, len);
    }
}
