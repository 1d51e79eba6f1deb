//! # Band-pass Filter Module
//!
//! Butterworth band-pass design and filtering with cascaded second-order
//! sections (biquads). Cascading biquads instead of running one high-order
//! difference equation keeps the filter stable at low cutoffs relative to the
//! sample rate.
//!
//! ## Design
//! 1. Analog Butterworth low-pass prototype (poles on the left unit half circle)
//! 2. Low-pass to band-pass transform around the pre-warped band edges
//! 3. Bilinear transform to the z-plane
//! 4. Conjugate pole pairs grouped into sections, each with zeros at z = 1 and z = -1
//!
//! All arithmetic is `f64`. Filtering starts from zero state on every call.

use rustfft::num_complex::Complex64;
use std::f64::consts::PI;

use crate::error::{PitchError, Result};

/// Order of the Butterworth prototype used by the band-pass stage.
///
/// The resulting band-pass filter has twice this many poles.
pub const BANDPASS_ORDER: usize = 4;

/// One biquad in normalized form (`a[0] == 1`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SecondOrderSection {
    pub b: [f64; 3],
    pub a: [f64; 3],
}

impl SecondOrderSection {
    /// Runs the section over `signal` in place using Direct Form II Transposed.
    fn process_in_place(&self, signal: &mut [f64]) {
        let [b0, b1, b2] = self.b;
        let [_, a1, a2] = self.a;
        let mut z1 = 0.0;
        let mut z2 = 0.0;
        for sample in signal.iter_mut() {
            let x = *sample;
            let y = b0 * x + z1;
            z1 = b1 * x - a1 * y + z2;
            z2 = b2 * x - a2 * y;
            *sample = y;
        }
    }

    /// Complex response of this section at `z = e^{jω}`.
    fn response(&self, omega: f64) -> Complex64 {
        let z1 = Complex64::from_polar(1.0, -omega);
        let z2 = z1 * z1;
        let num = self.b[0] + z1 * self.b[1] + z2 * self.b[2];
        let den = self.a[0] + z1 * self.a[1] + z2 * self.a[2];
        num / den
    }
}

/// Checks `0 < low_hz < high_hz < sample_rate / 2`.
pub fn check_band(low_hz: f64, high_hz: f64, sample_rate: u32) -> Result<()> {
    let nyquist = sample_rate as f64 / 2.0;
    let valid = low_hz.is_finite()
        && high_hz.is_finite()
        && low_hz > 0.0
        && low_hz < high_hz
        && high_hz < nyquist;
    if valid {
        Ok(())
    } else {
        Err(PitchError::InvalidFilterRange {
            low_hz,
            high_hz,
            sample_rate,
        })
    }
}

/// Designs a digital Butterworth band-pass filter.
///
/// # Arguments
/// * `order` - Order of the low-pass prototype (must be even and non-zero)
/// * `low_hz` / `high_hz` - Band edges in Hz (-3 dB points)
/// * `sample_rate` - Sample rate in Hz
///
/// # Returns
/// * `Ok(sections)` - `order` second-order sections, overall gain folded into the first
/// * `Err(PitchError::InvalidFilterRange)` - Band edges outside `(0, sample_rate / 2)`
pub fn butterworth_bandpass(
    order: usize,
    low_hz: f64,
    high_hz: f64,
    sample_rate: u32,
) -> Result<Vec<SecondOrderSection>> {
    check_band(low_hz, high_hz, sample_rate)?;
    if order == 0 || order % 2 != 0 {
        return Err(PitchError::InvalidConfig(format!(
            "band-pass prototype order must be even and non-zero, got {order}"
        )));
    }

    let fs = sample_rate as f64;
    let fs2 = 2.0 * fs;

    // Pre-warp the band edges so the bilinear transform lands them exactly.
    let warped_low = fs2 * (PI * low_hz / fs).tan();
    let warped_high = fs2 * (PI * high_hz / fs).tan();
    let bandwidth = warped_high - warped_low;
    let center = (warped_low * warped_high).sqrt();

    // Analog prototype: p_k = -exp(jπm / 2N), m = -N+1, -N+3, ..., N-1.
    let prototype = (0..order).map(|k| {
        let m = -(order as f64) + 1.0 + 2.0 * k as f64;
        -Complex64::from_polar(1.0, PI * m / (2.0 * order as f64))
    });

    // Low-pass to band-pass: every prototype pole splits into two.
    let mut analog_poles = Vec::with_capacity(2 * order);
    for pole in prototype {
        let scaled = pole * (bandwidth / 2.0);
        let offset = (scaled * scaled - center * center).sqrt();
        analog_poles.push(scaled + offset);
        analog_poles.push(scaled - offset);
    }
    // The transform adds `order` zeros at s = 0 and scales the gain by bw^order.
    let analog_gain = bandwidth.powi(order as i32);

    // Bilinear transform. Zeros at s = 0 map to z = 1; the pole excess adds
    // `order` zeros at z = -1.
    let mut gain_den = Complex64::new(1.0, 0.0);
    let digital_poles: Vec<Complex64> = analog_poles
        .iter()
        .map(|&p| {
            gain_den *= fs2 - p;
            (fs2 + p) / (fs2 - p)
        })
        .collect();
    let digital_gain = analog_gain * (fs2.powi(order as i32) / gain_den).re;

    // One section per conjugate pair, keeping the upper-half-plane member.
    let mut upper: Vec<Complex64> = digital_poles.into_iter().filter(|p| p.im > 0.0).collect();
    if upper.len() != order {
        return Err(PitchError::InvalidConfig(format!(
            "band-pass design produced {} conjugate pole pairs, expected {order}",
            upper.len()
        )));
    }
    // Poles nearest the unit circle go last.
    upper.sort_by(|a, b| a.norm().total_cmp(&b.norm()));

    let mut sections: Vec<SecondOrderSection> = upper
        .iter()
        .map(|p| SecondOrderSection {
            b: [1.0, 0.0, -1.0],
            a: [1.0, -2.0 * p.re, p.norm_sqr()],
        })
        .collect();
    for coeff in sections[0].b.iter_mut() {
        *coeff *= digital_gain;
    }

    Ok(sections)
}

/// Runs `input` through a cascade of sections, starting from zero state.
pub fn sos_filter(sections: &[SecondOrderSection], input: &[f64]) -> Vec<f64> {
    let mut output = input.to_vec();
    for section in sections {
        section.process_in_place(&mut output);
    }
    output
}

/// Magnitude response of a cascade at `freq_hz`.
pub fn magnitude_response(sections: &[SecondOrderSection], freq_hz: f64, sample_rate: u32) -> f64 {
    let omega = 2.0 * PI * freq_hz / sample_rate as f64;
    sections
        .iter()
        .map(|s| s.response(omega))
        .fold(Complex64::new(1.0, 0.0), |acc, h| acc * h)
        .norm()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    const FS: u32 = 2048;

    fn design() -> Vec<SecondOrderSection> {
        butterworth_bandpass(BANDPASS_ORDER, 80.0, 1000.0, FS).unwrap()
    }

    #[test]
    fn produces_one_section_per_prototype_pole() {
        assert_eq!(design().len(), BANDPASS_ORDER);
    }

    #[test]
    fn poles_are_inside_unit_circle() {
        for section in design() {
            // a2 is |p|^2 for the conjugate pair.
            assert!(section.a[2] < 1.0, "unstable section {:?}", section);
            assert!(section.a[2] > 0.0);
        }
    }

    #[test]
    fn band_edges_are_minus_three_db() {
        let sections = design();
        let edge = std::f64::consts::FRAC_1_SQRT_2;
        assert_abs_diff_eq!(magnitude_response(&sections, 80.0, FS), edge, epsilon = 1e-6);
        assert_abs_diff_eq!(magnitude_response(&sections, 1000.0, FS), edge, epsilon = 1e-6);
    }

    #[test]
    fn passband_is_unity_and_stopband_is_rejected() {
        let sections = design();
        // Geometric center of the pre-warped band maps back to unity gain.
        let fs = FS as f64;
        let wl = 2.0 * fs * (PI * 80.0 / fs).tan();
        let wh = 2.0 * fs * (PI * 1000.0 / fs).tan();
        let center_hz = fs / PI * ((wl * wh).sqrt() / (2.0 * fs)).atan();
        assert_abs_diff_eq!(magnitude_response(&sections, center_hz, FS), 1.0, epsilon = 1e-6);

        assert!(magnitude_response(&sections, 0.0, FS) < 1e-9);
        assert!(magnitude_response(&sections, 20.0, FS) < 0.01);
        assert!(magnitude_response(&sections, 1023.0, FS) < 0.05);
    }

    #[test]
    fn rejects_invalid_ranges() {
        for (low, high) in [(0.0, 500.0), (500.0, 400.0), (80.0, 1024.0), (-10.0, 100.0)] {
            assert!(matches!(
                butterworth_bandpass(BANDPASS_ORDER, low, high, FS),
                Err(PitchError::InvalidFilterRange { .. })
            ));
        }
    }

    #[test]
    fn filtering_removes_dc() {
        let input = vec![1000.0; 4096];
        let output = sos_filter(&design(), &input);
        let tail = &output[3000..];
        let peak = tail.iter().fold(0.0_f64, |m, x| m.max(x.abs()));
        assert!(peak < 1.0, "DC leaked through: {peak}");
    }

    #[test]
    fn empty_input_gives_empty_output() {
        assert!(sos_filter(&design(), &[]).is_empty());
    }
}
