//! # Pitch Tracker Engine
//!
//! [`PitchTracker`] owns a dedicated capture thread that reads fixed-size
//! blocks from an [`AudioSource`], runs each through the [`PitchPipeline`],
//! and publishes the resulting [`PitchReading`] for any number of readers.
//!
//! ## Threading
//! - The capture thread only blocks on the source read
//! - Readers never block on capture: they clone the last published reading
//! - Commands (reset, stop) are only observed between cycles, so a cycle is
//!   never cut short
//! - The source is opened on the capture thread and closed there exactly once

use crossbeam_channel::{Receiver, Sender, TryRecvError};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::PitchReading;
use crate::audio::{AudioSource, CpalSource, ReadOutcome, SourceConfig};
use crate::conditioning::{Conditioner, mean_abs_amplitude};
use crate::config::TrackerConfig;
use crate::error::{PitchError, Result};
use crate::pitch::PitchEstimator;
use crate::smoother::TemporalSmoother;

/// Pause after a failed read, so a broken source does not spin the thread.
const READ_ERROR_BACKOFF: Duration = Duration::from_millis(10);

/// One capture cycle's worth of processing, without any I/O.
///
/// Energy gate → conditioning → peak pick → median/EMA smoothing.
#[derive(Debug)]
pub struct PitchPipeline {
    amplitude_threshold: f64,
    conditioner: Conditioner,
    estimator: PitchEstimator,
    smoother: TemporalSmoother,
    cycle: u64,
    last_note: Option<i32>,
}

impl PitchPipeline {
    /// Validates `config` and precomputes the filters, kernels and FFT plan.
    pub fn new(config: &TrackerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            amplitude_threshold: config.amplitude_threshold,
            conditioner: Conditioner::new(config)?,
            estimator: PitchEstimator::new(config.buffer_size, config.sample_rate),
            smoother: TemporalSmoother::from_config(config),
            cycle: 0,
            last_note: None,
        })
    }

    /// Samples per block.
    pub fn block_len(&self) -> usize {
        self.conditioner.block_len()
    }

    /// Processes one block and returns the reading to publish.
    pub fn process(&mut self, block: &[i16]) -> PitchReading {
        self.cycle += 1;
        let amplitude = mean_abs_amplitude(block);
        if amplitude < self.amplitude_threshold {
            return self.unvoiced(amplitude);
        }

        let conditioned = match self.conditioner.process(block) {
            Ok(samples) => samples,
            Err(e) => {
                log::warn!("Skipping block of {} samples: {}", block.len(), e);
                return self.unvoiced(amplitude);
            }
        };

        let Some(frequency) = self.estimator.estimate(&conditioned) else {
            return self.unvoiced(amplitude);
        };
        // The smoother counts its own silent cycle when it rejects an estimate.
        let Some(step) = self.smoother.update(frequency) else {
            self.note_changed(None);
            return PitchReading {
                amplitude,
                ..self.idle_reading()
            };
        };

        log::trace!(
            "cycle {}: peak {:.1} Hz, median {:.1} Hz, note {} ({:.2})",
            self.cycle,
            frequency,
            step.frequency,
            step.note,
            step.smoothed
        );
        self.note_changed(Some(step.note));

        PitchReading {
            note: Some(step.note),
            smoothed_note: Some(step.smoothed),
            frequency: Some(step.frequency),
            amplitude,
            cycle: self.cycle,
        }
    }

    /// Accounts for a cycle whose block could not be read.
    pub fn skip(&mut self) -> PitchReading {
        self.cycle += 1;
        self.unvoiced(0.0)
    }

    /// Clears the median history and EMA.
    pub fn reset(&mut self) {
        self.smoother.reset();
        self.last_note = None;
    }

    /// The reading that reflects current state without a note.
    pub fn idle_reading(&self) -> PitchReading {
        PitchReading {
            note: None,
            smoothed_note: self.smoother.smoothed_estimate(),
            frequency: None,
            amplitude: 0.0,
            cycle: self.cycle,
        }
    }

    fn unvoiced(&mut self, amplitude: f64) -> PitchReading {
        if self.smoother.mark_silent() {
            log::debug!("Silence reset after cycle {}", self.cycle);
        }
        self.note_changed(None);
        PitchReading {
            amplitude,
            ..self.idle_reading()
        }
    }

    fn note_changed(&mut self, note: Option<i32>) {
        if note != self.last_note {
            log::debug!("Note {:?} -> {:?}", self.last_note, note);
            self.last_note = note;
        }
    }
}

enum Command {
    Reset,
    Stop,
}

/// Handle to a running capture thread.
///
/// Dropping the handle stops the thread and releases the source.
pub struct PitchTracker {
    command_tx: Sender<Command>,
    thread_handle: Option<JoinHandle<()>>,
    latest: Arc<Mutex<PitchReading>>,
    running: Arc<AtomicBool>,
    config: TrackerConfig,
}

impl PitchTracker {
    /// Starts tracking the configured microphone.
    ///
    /// # Returns
    /// * `Ok(tracker)` - The device is open and the capture thread is running
    /// * `Err(_)` - Invalid configuration or the device could not be opened;
    ///   no thread is left behind
    pub fn start(config: TrackerConfig) -> Result<Self> {
        Self::start_with(config, CpalSource::open)
    }

    /// Starts tracking a source built by `opener`.
    ///
    /// The opener runs on the capture thread, so sources that cannot move
    /// between threads (device streams) work. Its error is returned from here.
    pub fn start_with<S, F>(config: TrackerConfig, opener: F) -> Result<Self>
    where
        S: AudioSource + 'static,
        F: FnOnce(&SourceConfig) -> Result<S> + Send + 'static,
    {
        let pipeline = PitchPipeline::new(&config)?;
        let source_config = SourceConfig::from(&config);

        let (command_tx, command_rx) = crossbeam_channel::unbounded();
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<()>>(1);
        let latest = Arc::new(Mutex::new(PitchReading::default()));
        let running = Arc::new(AtomicBool::new(false));

        let latest_clone = latest.clone();
        let running_clone = running.clone();
        let thread_handle = thread::Builder::new()
            .name("pitch-capture".to_string())
            .spawn(move || {
                let mut source = match opener(&source_config) {
                    Ok(source) => source,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                running_clone.store(true, Ordering::SeqCst);
                let _ = ready_tx.send(Ok(()));

                log::info!(
                    "Pitch capture running: {} Hz, {} samples per block",
                    source_config.sample_rate,
                    source_config.buffer_size
                );
                run_capture_loop(&mut source, pipeline, &command_rx, &latest_clone);

                source.close();
                latest_clone.lock().note = None;
                running_clone.store(false, Ordering::SeqCst);
                log::info!("Pitch capture stopped");
            })
            .map_err(|e| PitchError::Thread(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                command_tx,
                thread_handle: Some(thread_handle),
                latest,
                running,
                config,
            }),
            Ok(Err(e)) => {
                let _ = thread_handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread_handle.join();
                Err(PitchError::Thread(
                    "capture thread exited before opening the audio source".to_string(),
                ))
            }
        }
    }

    /// Last published note, `None` for silence or no pitch. Never blocks on capture.
    pub fn current_note(&self) -> Option<i32> {
        self.latest.lock().note
    }

    /// Running EMA over note numbers, for consumers that want a continuous value.
    pub fn current_smoothed_estimate(&self) -> Option<f64> {
        self.latest.lock().smoothed_note
    }

    /// The whole last published reading, read in one piece.
    pub fn reading(&self) -> PitchReading {
        *self.latest.lock()
    }

    /// Asks the capture thread to clear its history and EMA before its next cycle.
    pub fn reset(&self) {
        let _ = self.command_tx.send(Command::Reset);
    }

    /// Whether the capture thread is still looping.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Stops the capture thread after its current cycle and waits for it.
    ///
    /// Calling this more than once is harmless.
    pub fn close(&mut self) {
        if let Some(handle) = self.thread_handle.take() {
            let _ = self.command_tx.send(Command::Stop);
            if handle.join().is_err() {
                log::error!("Pitch capture thread panicked");
            }
        }
    }
}

impl Drop for PitchTracker {
    fn drop(&mut self) {
        self.close();
    }
}

/// The capture loop. Returns on `Stop`, when the handle is gone, or at end of stream.
fn run_capture_loop<S: AudioSource + ?Sized>(
    source: &mut S,
    mut pipeline: PitchPipeline,
    commands: &Receiver<Command>,
    latest: &Mutex<PitchReading>,
) {
    let mut block = vec![0i16; pipeline.block_len()];
    let mut overflows: u64 = 0;
    let mut read_errors: u64 = 0;

    loop {
        loop {
            match commands.try_recv() {
                Ok(Command::Reset) => {
                    log::info!("Resetting pitch history");
                    pipeline.reset();
                    *latest.lock() = pipeline.idle_reading();
                }
                Ok(Command::Stop) | Err(TryRecvError::Disconnected) => return,
                Err(TryRecvError::Empty) => break,
            }
        }

        let reading = match source.read(&mut block) {
            Ok(ReadOutcome::Complete) => pipeline.process(&block),
            Ok(ReadOutcome::Overflowed { dropped }) => {
                overflows += 1;
                if overflows.is_power_of_two() {
                    log::warn!(
                        "Input overflow: {} samples dropped ({} overflows so far)",
                        dropped,
                        overflows
                    );
                }
                pipeline.process(&block)
            }
            Ok(ReadOutcome::EndOfStream) => {
                log::info!("Audio source reached end of stream");
                return;
            }
            Err(e) => {
                read_errors += 1;
                if read_errors.is_power_of_two() {
                    log::warn!("Audio read failed ({} so far): {}", read_errors, e);
                }
                thread::sleep(READ_ERROR_BACKOFF);
                pipeline.skip()
            }
        };

        *latest.lock() = reading;
    }
}
