//! # Signal Conditioning Module
//!
//! Prepares a raw sample block for spectral peak picking:
//! band-pass → Savitzky-Golay smoothing → window, in that order. Smoothing runs
//! before the window so the polynomial fit sees the untapered signal.
//!
//! The free functions are pure and allocate a fresh output on each call. The
//! capture loop uses [`Conditioner`], which validates a configuration once and
//! keeps the filter sections, smoothing weights and window table around.

use crate::config::TrackerConfig;
use crate::error::Result;
use crate::filter::{self, BANDPASS_ORDER, SecondOrderSection};
use crate::savgol::{self, SavitzkyGolay};
use crate::window::{self, WindowKind};

/// Mean of `|sample|` over the block, in 16-bit sample units. 0 for an empty block.
pub fn mean_abs_amplitude(block: &[i16]) -> f64 {
    if block.is_empty() {
        return 0.0;
    }
    let sum: f64 = block.iter().map(|&s| (s as f64).abs()).sum();
    sum / block.len() as f64
}

/// Widens PCM samples for the floating point stages.
pub fn to_f64(block: &[i16]) -> Vec<f64> {
    block.iter().map(|&s| s as f64).collect()
}

/// Applies the 4th-order Butterworth band-pass `[low_hz, high_hz]`.
///
/// # Returns
/// * `Err(PitchError::InvalidFilterRange)` - unless `0 < low_hz < high_hz < sample_rate / 2`
pub fn bandpass(block: &[f64], low_hz: f64, high_hz: f64, sample_rate: u32) -> Result<Vec<f64>> {
    let sections = filter::butterworth_bandpass(BANDPASS_ORDER, low_hz, high_hz, sample_rate)?;
    Ok(filter::sos_filter(&sections, block))
}

/// Savitzky-Golay smoothing over `window_len` samples (forced odd and ≥ 5).
///
/// # Returns
/// * `Err(PitchError::InvalidWindow)` - if the coerced window is longer than the block
///   or not longer than `poly_order`
pub fn smooth(block: &[f64], window_len: usize, poly_order: usize) -> Result<Vec<f64>> {
    let window_len = savgol::effective_window_len(window_len);
    savgol::check_window(window_len, poly_order, block.len())?;
    SavitzkyGolay::new(window_len, poly_order)?.apply(block)
}

/// Returns a tapered copy of `block`.
pub fn window(block: &[f64], kind: WindowKind) -> Vec<f64> {
    let mut output = block.to_vec();
    window::apply_window(kind, &mut output);
    output
}

/// The conditioning chain for one fixed configuration.
#[derive(Debug, Clone)]
pub struct Conditioner {
    sections: Vec<SecondOrderSection>,
    smoother: SavitzkyGolay,
    kind: WindowKind,
    taper: Vec<f64>,
}

impl Conditioner {
    /// Validates the band and smoothing window against the block size and
    /// precomputes every coefficient.
    pub fn new(config: &TrackerConfig) -> Result<Self> {
        let sections = filter::butterworth_bandpass(
            BANDPASS_ORDER,
            config.low_cut_hz,
            config.high_cut_hz,
            config.sample_rate,
        )?;
        let window_len = config.effective_smoothing_window();
        savgol::check_window(window_len, config.smoothing_poly_order, config.buffer_size)?;
        let smoother = SavitzkyGolay::new(window_len, config.smoothing_poly_order)?;
        let taper = window::window_table(config.window_kind, config.buffer_size);

        Ok(Self {
            sections,
            smoother,
            kind: config.window_kind,
            taper,
        })
    }

    /// Block length this conditioner was built for.
    pub fn block_len(&self) -> usize {
        self.taper.len()
    }

    /// Runs band-pass, smoothing and window over one block.
    pub fn process(&self, block: &[i16]) -> Result<Vec<f64>> {
        let filtered = filter::sos_filter(&self.sections, &to_f64(block));
        let mut smoothed = self.smoother.apply(&filtered)?;
        if smoothed.len() == self.taper.len() {
            for (sample, coeff) in smoothed.iter_mut().zip(&self.taper) {
                *sample *= coeff;
            }
        } else {
            // A source handed back a block of a different size.
            window::apply_window(self.kind, &mut smoothed);
        }
        Ok(smoothed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PitchError;
    use crate::pitch::peak_frequency;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::PI;

    fn sine(freq: f64, sample_rate: u32, len: usize, amplitude: f64) -> Vec<f64> {
        (0..len)
            .map(|i| amplitude * (2.0 * PI * freq * i as f64 / sample_rate as f64).sin())
            .collect()
    }

    #[test]
    fn mean_abs_amplitude_of_silence_and_tone() {
        assert_eq!(mean_abs_amplitude(&[]), 0.0);
        assert_eq!(mean_abs_amplitude(&[0; 64]), 0.0);
        assert_eq!(mean_abs_amplitude(&[100, -100, 50, -50]), 75.0);
    }

    #[test]
    fn bandpass_validates_range() {
        let block = vec![0.0; 128];
        assert!(matches!(
            bandpass(&block, 80.0, 1100.0, 2048),
            Err(PitchError::InvalidFilterRange { .. })
        ));
    }

    #[test]
    fn smooth_validates_window() {
        let block = vec![0.0; 16];
        assert!(matches!(
            smooth(&block, 64, 2),
            Err(PitchError::InvalidWindow {
                window_len: 65,
                block_len: 16
            })
        ));
        assert_eq!(smooth(&block, 4, 2).unwrap().len(), 16);
    }

    #[test]
    fn window_is_pure() {
        let block = vec![1.0; 16];
        let tapered = window(&block, WindowKind::Hamming);
        assert_eq!(block, vec![1.0; 16]);
        assert_abs_diff_eq!(tapered[0], 0.08, epsilon = 1e-12);
    }

    #[test]
    fn out_of_band_tone_loses_to_in_band_tone() {
        // 3 kHz interferer at twice the amplitude of an in-band 440 Hz tone.
        let fs = 8192;
        let len = 1024;
        let mixed: Vec<f64> = sine(440.0, fs, len, 1000.0)
            .iter()
            .zip(sine(3000.0, fs, len, 2000.0))
            .map(|(a, b)| a + b)
            .collect();

        let raw_peak = peak_frequency(&window(&mixed, WindowKind::Hamming), fs).unwrap();
        assert!((raw_peak - 3000.0).abs() <= 8.0);

        let filtered = bandpass(&mixed, 80.0, 1000.0, fs).unwrap();
        let peak = peak_frequency(&window(&filtered, WindowKind::Hamming), fs).unwrap();
        assert!((peak - 440.0).abs() <= 8.0, "peak at {peak} Hz");
    }

    #[test]
    fn tone_above_the_band_is_attenuated() {
        // Sampled at 2048 Hz a 2000 Hz tone folds down to 48 Hz, below the band.
        let fs = 2048;
        let rms = |x: &[f64]| (x.iter().map(|s| s * s).sum::<f64>() / x.len() as f64).sqrt();
        let settled = |tone: &[f64]| {
            let filtered = bandpass(tone, 80.0, 1000.0, fs).unwrap();
            rms(&filtered[filtered.len() - 128..])
        };

        let aliased = sine(2000.0, fs, 2048, 3000.0);
        let in_band = sine(440.0, fs, 2048, 3000.0);
        let aliased_gain = settled(&aliased) / rms(&aliased[aliased.len() - 128..]);
        let in_band_gain = settled(&in_band) / rms(&in_band[in_band.len() - 128..]);

        assert!(aliased_gain < 0.25, "aliased gain {aliased_gain}");
        assert!(in_band_gain > 0.9, "in-band gain {in_band_gain}");
    }

    #[test]
    fn conditioner_matches_free_functions() {
        let config = TrackerConfig::default();
        let conditioner = Conditioner::new(&config).unwrap();
        assert_eq!(conditioner.block_len(), 128);

        let block: Vec<i16> = sine(440.0, 2048, 128, 3000.0)
            .into_iter()
            .map(|s| s as i16)
            .collect();
        let chained = window(
            &smooth(
                &bandpass(&to_f64(&block), 80.0, 1000.0, 2048).unwrap(),
                config.smoothing_window,
                config.smoothing_poly_order,
            )
            .unwrap(),
            config.window_kind,
        );
        let processed = conditioner.process(&block).unwrap();
        for (a, b) in processed.iter().zip(&chained) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-9);
        }
    }

    #[test]
    fn conditioner_rejects_bad_config() {
        let config = TrackerConfig {
            buffer_size: 4,
            ..TrackerConfig::default()
        };
        assert!(matches!(
            Conditioner::new(&config),
            Err(PitchError::InvalidWindow { .. })
        ));
    }
}
