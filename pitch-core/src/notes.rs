//! # Musical Note Module
//!
//! Conversions between frequencies and note numbers on the 12-tone equal
//! tempered scale, with A4 = 440 Hz = note 69 (the MIDI convention).
//!
//! ## Features
//! - Frequency to nearest note number and back
//! - Fractional note numbers for continuous displays
//! - Note names with sharp spelling (e.g. "A4", "C#5")
//! - Cent deviation for tuning-style readouts
//!
//! Note numbers are plain integers and are not clamped to any instrument or
//! MIDI range; range limits belong to whoever consumes them.

/// Reference pitch of A4 in Hz.
pub const A4_FREQUENCY: f64 = 440.0;

/// Note number of A4.
pub const A4_NOTE: i32 = 69;

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Continuous note number of a frequency: `12 * log2(f / 440) + 69`.
///
/// # Returns
/// * `Some(note)` - for finite, positive frequencies
/// * `None` - for `freq_hz <= 0`, NaN or infinity
pub fn frequency_to_fractional_note(freq_hz: f64) -> Option<f64> {
    if !freq_hz.is_finite() || freq_hz <= 0.0 {
        return None;
    }
    Some(12.0 * (freq_hz / A4_FREQUENCY).log2() + A4_NOTE as f64)
}

/// Nearest note number of a frequency.
///
/// # Arguments
/// * `freq_hz` - Frequency in Hz
///
/// # Returns
/// * `Some(note)` - `12 * log2(freq_hz / 440) + 69`, exact halves rounded to even
/// * `None` - there is no note for a non-positive or non-finite frequency
pub fn frequency_to_note(freq_hz: f64) -> Option<i32> {
    frequency_to_fractional_note(freq_hz).map(|note| note.round_ties_even() as i32)
}

/// Frequency of a note number: `440 * 2^((note - 69) / 12)`.
pub fn note_to_frequency(note: i32) -> f64 {
    A4_FREQUENCY * 2.0_f64.powf((note - A4_NOTE) as f64 / 12.0)
}

/// Name of a note number with sharp spelling, octave changing at C.
///
/// Note 60 is "C4", note 69 is "A4". Negative notes yield negative octaves.
pub fn note_name(note: i32) -> String {
    let name = NOTE_NAMES[note.rem_euclid(12) as usize];
    let octave = note.div_euclid(12) - 1;
    format!("{}{}", name, octave)
}

/// Calculates the deviation from a target frequency in cents.
///
/// - 100 cents = 1 semitone
/// - Positive values are sharp, negative values flat
pub fn cents_deviation(freq_hz: f64, target_hz: f64) -> f64 {
    1200.0 * (freq_hz / target_hz).log2()
}
