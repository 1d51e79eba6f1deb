use pitch_core::{
    AudioSource, PcmReaderSource, PitchError, PitchTracker, ReadOutcome, Result, SourceConfig,
    TrackerConfig,
};
use std::f64::consts::PI;
use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

const WAIT: Duration = Duration::from_secs(5);

fn tone(freq: f64, amplitude: f64, config: &TrackerConfig) -> Vec<i16> {
    (0..config.buffer_size)
        .map(|i| (amplitude * (2.0 * PI * freq * i as f64 / config.sample_rate as f64).sin()) as i16)
        .collect()
}

/// Plays `script` once, then repeats `tail` until closed.
struct ScriptedSource {
    script: Vec<Vec<i16>>,
    tail: Vec<i16>,
    position: usize,
    closes: Arc<AtomicUsize>,
    overflow_every: Option<usize>,
}

impl ScriptedSource {
    fn new(script: Vec<Vec<i16>>, tail: Vec<i16>, closes: Arc<AtomicUsize>) -> Self {
        Self {
            script,
            tail,
            position: 0,
            closes,
            overflow_every: None,
        }
    }
}

impl AudioSource for ScriptedSource {
    fn read(&mut self, block: &mut [i16]) -> Result<ReadOutcome> {
        thread::sleep(Duration::from_millis(1));
        let samples = self.script.get(self.position).unwrap_or(&self.tail);
        block.copy_from_slice(samples);
        self.position += 1;
        match self.overflow_every {
            Some(n) if self.position % n == 0 => Ok(ReadOutcome::Overflowed { dropped: 17 }),
            _ => Ok(ReadOutcome::Complete),
        }
    }

    fn close(&mut self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

fn wait_until(tracker: &PitchTracker, mut done: impl FnMut(&PitchTracker) -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if done(tracker) {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    false
}

#[test]
fn steady_a440_reads_as_note_69() {
    let config = TrackerConfig::default();
    let closes = Arc::new(AtomicUsize::new(0));
    let block = tone(440.0, 4000.0, &config);
    let source = ScriptedSource::new(Vec::new(), block, closes.clone());

    let mut tracker = PitchTracker::start_with(config, move |_| Ok(source)).unwrap();
    assert!(tracker.is_running());
    assert!(wait_until(&tracker, |t| t.current_note() == Some(69)));
    assert_eq!(tracker.current_smoothed_estimate(), Some(69.0));

    tracker.close();
    assert!(!tracker.is_running());
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[test]
fn silence_publishes_no_note_but_keeps_estimate() {
    let config = TrackerConfig::default();
    let closes = Arc::new(AtomicUsize::new(0));
    let voiced = vec![tone(440.0, 4000.0, &config); 5];
    let silence = vec![0i16; config.buffer_size];
    let source = ScriptedSource::new(voiced, silence, closes);

    let tracker = PitchTracker::start_with(config, move |_| Ok(source)).unwrap();
    assert!(wait_until(&tracker, |t| t.reading().cycle > 20));

    let reading = tracker.reading();
    assert_eq!(reading.note, None);
    assert_eq!(reading.note_or_sentinel(), -1);
    assert_eq!(reading.frequency, None);
    assert_eq!(reading.smoothed_note, Some(69.0));
}

#[test]
fn quiet_tone_stays_below_the_gate() {
    let config = TrackerConfig {
        smoothing_alpha: 0.5,
        ..TrackerConfig::default()
    };
    let closes = Arc::new(AtomicUsize::new(0));
    let loud = vec![tone(440.0, 4000.0, &config); 3];
    // Mean absolute value around 25, under the default threshold of 60.
    let quiet = tone(880.0, 40.0, &config);
    let source = ScriptedSource::new(loud, quiet, closes);

    let tracker = PitchTracker::start_with(config, move |_| Ok(source)).unwrap();
    assert!(wait_until(&tracker, |t| t.reading().cycle > 20));
    assert_eq!(tracker.current_note(), None);
    assert_eq!(tracker.current_smoothed_estimate(), Some(69.0));
}

#[test]
fn silence_reset_policy_forgets_the_estimate() {
    let config = TrackerConfig {
        silence_reset_cycles: Some(4),
        ..TrackerConfig::default()
    };
    let closes = Arc::new(AtomicUsize::new(0));
    let voiced = vec![tone(440.0, 4000.0, &config); 5];
    let source = ScriptedSource::new(voiced, vec![0; config.buffer_size], closes);

    let tracker = PitchTracker::start_with(config, move |_| Ok(source)).unwrap();
    assert!(wait_until(&tracker, |t| t.reading().cycle > 20));
    assert_eq!(tracker.current_smoothed_estimate(), None);
}

#[test]
fn reset_clears_the_running_estimate() {
    let config = TrackerConfig::default();
    let closes = Arc::new(AtomicUsize::new(0));
    let voiced = vec![tone(440.0, 4000.0, &config); 5];
    let source = ScriptedSource::new(voiced, vec![0; config.buffer_size], closes);

    let tracker = PitchTracker::start_with(config, move |_| Ok(source)).unwrap();
    assert!(wait_until(&tracker, |t| {
        t.reading().cycle > 10 && t.current_smoothed_estimate() == Some(69.0)
    }));
    tracker.reset();
    assert!(wait_until(&tracker, |t| t.current_smoothed_estimate().is_none()));
}

#[test]
fn close_stops_the_thread_and_closes_the_source_once() {
    let config = TrackerConfig::default();
    let closes = Arc::new(AtomicUsize::new(0));
    let source = ScriptedSource::new(Vec::new(), tone(440.0, 4000.0, &config), closes.clone());

    let mut tracker = PitchTracker::start_with(config, move |_| Ok(source)).unwrap();
    assert!(wait_until(&tracker, |t| t.reading().cycle > 3));

    tracker.close();
    tracker.close();
    assert!(!tracker.is_running());
    assert_eq!(tracker.current_note(), None);
    drop(tracker);
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[test]
fn dropping_the_handle_closes_the_source() {
    let config = TrackerConfig::default();
    let closes = Arc::new(AtomicUsize::new(0));
    let source = ScriptedSource::new(Vec::new(), vec![0; config.buffer_size], closes.clone());

    let tracker = PitchTracker::start_with(config, move |_| Ok(source)).unwrap();
    drop(tracker);
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[test]
fn open_failure_is_reported_by_start() {
    let result = PitchTracker::start_with(TrackerConfig::default(), |_: &SourceConfig| {
        Err::<ScriptedSource, _>(PitchError::DeviceNotFound(7))
    });
    assert!(matches!(result, Err(PitchError::DeviceNotFound(7))));
}

#[test]
fn opener_sees_the_configured_source() {
    let config = TrackerConfig {
        device_index: Some(2),
        ..TrackerConfig::whistle()
    };
    let block_len = config.buffer_size;
    let closes = Arc::new(AtomicUsize::new(0));
    let seen = Arc::new(AtomicUsize::new(0));
    let seen_clone = seen.clone();

    let tracker = PitchTracker::start_with(config, move |source: &SourceConfig| {
        assert_eq!(source.sample_rate, 4096);
        assert_eq!(source.device_index, Some(2));
        seen_clone.store(source.buffer_size, Ordering::SeqCst);
        Ok(ScriptedSource::new(Vec::new(), vec![0; source.buffer_size], closes))
    })
    .unwrap();

    assert_eq!(seen.load(Ordering::SeqCst), block_len);
    assert_eq!(tracker.config().buffer_size, 1024);
}

#[test]
fn invalid_config_never_opens_a_source() {
    let opened = Arc::new(AtomicUsize::new(0));
    let opened_clone = opened.clone();
    let config = TrackerConfig {
        high_cut_hz: 1500.0,
        ..TrackerConfig::default()
    };

    let result = PitchTracker::start_with(config, move |_: &SourceConfig| {
        opened_clone.fetch_add(1, Ordering::SeqCst);
        Ok(ScriptedSource::new(Vec::new(), Vec::new(), Arc::new(AtomicUsize::new(0))))
    });

    assert!(matches!(result, Err(PitchError::InvalidFilterRange { .. })));
    assert_eq!(opened.load(Ordering::SeqCst), 0);
}

#[test]
fn overflowed_blocks_are_still_tracked() {
    let config = TrackerConfig::default();
    let closes = Arc::new(AtomicUsize::new(0));
    let mut source = ScriptedSource::new(Vec::new(), tone(440.0, 4000.0, &config), closes);
    source.overflow_every = Some(2);

    let tracker = PitchTracker::start_with(config, move |_| Ok(source)).unwrap();
    assert!(wait_until(&tracker, |t| t.reading().cycle > 10));
    assert_eq!(tracker.current_note(), Some(69));
}

#[test]
fn pcm_stream_runs_to_end_of_stream() {
    let config = TrackerConfig::default();
    let mut bytes = Vec::new();
    for _ in 0..8 {
        for sample in tone(440.0, 4000.0, &config) {
            bytes.extend_from_slice(&sample.to_le_bytes());
        }
    }

    let tracker =
        PitchTracker::start_with(config, move |_| Ok(PcmReaderSource::new(Cursor::new(bytes))))
            .unwrap();
    assert!(wait_until(&tracker, |t| !t.is_running()));

    let reading = tracker.reading();
    assert_eq!(reading.cycle, 8);
    assert_eq!(reading.note, None);
    assert_eq!(reading.smoothed_note, Some(69.0));
}
