//! # Temporal Smoothing Module
//!
//! Two stages between the per-block frequency estimate and the published note:
//!
//! 1. A rolling median over the last few frequency estimates, which removes
//!    single-block octave jumps and outliers.
//! 2. An exponential moving average over the note number of that median,
//!    which trades a little lag for a steady output.
//!
//! Silent blocks do not touch either stage, so a note resumes from where it
//! left off when the voice comes back. An optional policy clears both stages
//! after a long enough run of silent blocks.

use std::collections::VecDeque;

use crate::config::TrackerConfig;
use crate::notes::frequency_to_note;

/// Bounded FIFO of recent frequency estimates.
#[derive(Debug, Clone)]
pub struct FrequencyHistory {
    capacity: usize,
    values: VecDeque<f64>,
}

impl FrequencyHistory {
    /// Creates an empty history holding at most `capacity` (at least 1) values.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            values: VecDeque::with_capacity(capacity),
        }
    }

    /// Appends a value, evicting the oldest one when full.
    pub fn push(&mut self, value: f64) {
        if self.values.len() == self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    /// Median of the stored values; the mean of the two middle values for an even count.
    pub fn median(&self) -> Option<f64> {
        if self.values.is_empty() {
            return None;
        }
        let mut sorted: Vec<f64> = self.values.iter().copied().collect();
        sorted.sort_by(f64::total_cmp);
        let mid = sorted.len() / 2;
        if sorted.len() % 2 == 0 {
            Some((sorted[mid - 1] + sorted[mid]) / 2.0)
        } else {
            Some(sorted[mid])
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }
}

/// Output of one voiced smoothing step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmoothedPitch {
    /// Median frequency of the history after this step, in Hz.
    pub frequency: f64,
    /// Note of the median frequency, octave offset included.
    pub raw_note: i32,
    /// EMA over raw notes.
    pub smoothed: f64,
    /// `smoothed` rounded to the nearest note, halves to even.
    pub note: i32,
}

/// Median + EMA smoother owned by the capture loop.
#[derive(Debug, Clone)]
pub struct TemporalSmoother {
    history: FrequencyHistory,
    alpha: f64,
    octave_offset: i32,
    silence_reset_cycles: Option<u32>,
    silent_cycles: u32,
    smoothed: Option<f64>,
}

impl TemporalSmoother {
    /// # Arguments
    /// * `history_size` - Median depth; 1 passes estimates straight through
    /// * `alpha` - EMA weight of the newest note in (0, 1]; 1 disables smoothing
    /// * `octave_offset` - Whole octaves added to every note
    pub fn new(history_size: usize, alpha: f64, octave_offset: i32) -> Self {
        Self {
            history: FrequencyHistory::new(history_size),
            alpha,
            octave_offset,
            silence_reset_cycles: None,
            silent_cycles: 0,
            smoothed: None,
        }
    }

    pub fn from_config(config: &TrackerConfig) -> Self {
        Self::new(
            config.history_size,
            config.smoothing_alpha,
            config.octave_offset,
        )
        .with_silence_reset(config.silence_reset_cycles)
    }

    /// Clears all state after `cycles` consecutive silent cycles (`None` never clears).
    pub fn with_silence_reset(mut self, cycles: Option<u32>) -> Self {
        self.silence_reset_cycles = cycles;
        self
    }

    /// Feeds one valid frequency estimate.
    ///
    /// Returns `None` (and leaves all state alone apart from counting a silent
    /// cycle) if `frequency_hz` has no note, i.e. is not a positive finite number.
    pub fn update(&mut self, frequency_hz: f64) -> Option<SmoothedPitch> {
        if frequency_to_note(frequency_hz).is_none() {
            self.mark_silent();
            return None;
        }
        self.silent_cycles = 0;
        self.history.push(frequency_hz);

        let frequency = self.history.median()?;
        let raw_note = frequency_to_note(frequency)? + 12 * self.octave_offset;
        let raw = raw_note as f64;

        let smoothed = match self.smoothed {
            None => raw,
            Some(previous) => previous + self.alpha * (raw - previous),
        };
        self.smoothed = Some(smoothed);

        Some(SmoothedPitch {
            frequency,
            raw_note,
            smoothed,
            note: smoothed.round_ties_even() as i32,
        })
    }

    /// Records a silent or unpitched cycle.
    ///
    /// Returns `true` if this cycle triggered the silence reset policy.
    pub fn mark_silent(&mut self) -> bool {
        self.silent_cycles = self.silent_cycles.saturating_add(1);
        match self.silence_reset_cycles {
            Some(limit) if self.silent_cycles == limit && self.has_state() => {
                self.history.clear();
                self.smoothed = None;
                true
            }
            _ => false,
        }
    }

    /// Current EMA value, `None` before the first voiced cycle.
    pub fn smoothed_estimate(&self) -> Option<f64> {
        self.smoothed
    }

    pub fn history(&self) -> &FrequencyHistory {
        &self.history
    }

    /// Forgets everything, as if no cycle had run.
    pub fn reset(&mut self) {
        self.history.clear();
        self.smoothed = None;
        self.silent_cycles = 0;
    }

    fn has_state(&self) -> bool {
        self.smoothed.is_some() || !self.history.is_empty()
    }
}
