//! # Pitch Gesture Module
//!
//! Turns a stream of frequency readings into discrete up/down steps, for
//! driving a cursor or arrow-key style control by whistling. A step fires
//! when two consecutive readings differ by more than a threshold and the
//! previous step is at least a cooldown old.
//!
//! Delivering the step (a key press, a menu move) is the caller's business.

use std::time::{Duration, Instant};

/// Default frequency jump that counts as a step, in Hz.
pub const DEFAULT_JUMP_THRESHOLD_HZ: f64 = 70.0;

/// Default minimum time between two steps.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_millis(500);

/// Direction of a detected pitch jump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Up,
    Down,
}

#[derive(Debug, Clone)]
pub struct StepDetector {
    jump_threshold_hz: f64,
    cooldown: Duration,
    previous: Option<f64>,
    last_step: Option<Instant>,
}

impl Default for StepDetector {
    fn default() -> Self {
        Self::new(DEFAULT_JUMP_THRESHOLD_HZ, DEFAULT_COOLDOWN)
    }
}

impl StepDetector {
    pub fn new(jump_threshold_hz: f64, cooldown: Duration) -> Self {
        Self {
            jump_threshold_hz,
            cooldown,
            previous: None,
            last_step: None,
        }
    }

    /// Feeds the latest reading, timestamped now.
    pub fn update(&mut self, frequency_hz: Option<f64>) -> Option<Step> {
        self.update_at(frequency_hz, Instant::now())
    }

    /// Feeds a reading taken at `now`.
    ///
    /// A missing reading clears the reference frequency. After a step the
    /// reference is cleared too, so the next reading only re-arms the detector.
    pub fn update_at(&mut self, frequency_hz: Option<f64>, now: Instant) -> Option<Step> {
        let (Some(previous), Some(current)) = (self.previous, frequency_hz) else {
            self.previous = frequency_hz;
            return None;
        };

        let diff = previous - current;
        let cooled_down = self
            .last_step
            .is_none_or(|last| now.saturating_duration_since(last) >= self.cooldown);

        if diff.abs() > self.jump_threshold_hz && cooled_down {
            self.last_step = Some(now);
            self.previous = None;
            log::debug!("Pitch step {:.1} Hz -> {:.1} Hz", previous, current);
            Some(if diff > 0.0 { Step::Down } else { Step::Up })
        } else {
            self.previous = Some(current);
            None
        }
    }
}
