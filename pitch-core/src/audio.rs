//! # Audio Capture Module
//!
//! The engine reads audio through the [`AudioSource`] trait: a blocking
//! "fill this block with the next N samples" call plus `close`. Two adapters
//! are provided:
//!
//! - [`CpalSource`]: a live input device through CPAL (Cross-Platform Audio Library)
//! - [`PcmReaderSource`]: any byte stream of little-endian signed 16-bit mono PCM
//!
//! ## Features
//! - Default or indexed input device selection
//! - `i16` and `f32` device formats, delivered as `i16`
//! - Multi-channel devices reduced to their first channel
//! - Overflow reported per read instead of failing the read

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample, SupportedStreamConfigRange};
use crossbeam_channel::{Receiver, Sender};
use std::collections::VecDeque;
use std::io::{ErrorKind, Read};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::config::TrackerConfig;
use crate::error::{PitchError, Result};

/// Chunks the realtime callback may queue before new ones are dropped.
const CHUNK_QUEUE_DEPTH: usize = 64;

/// What a source needs to know to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceConfig {
    pub sample_rate: u32,
    pub buffer_size: usize,
    pub device_index: Option<usize>,
}

impl From<&TrackerConfig> for SourceConfig {
    fn from(config: &TrackerConfig) -> Self {
        Self {
            sample_rate: config.sample_rate,
            buffer_size: config.buffer_size,
            device_index: config.device_index,
        }
    }
}

/// Result of a successful read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// The block holds fresh samples.
    Complete,
    /// The block was filled, but `dropped` samples were lost before it.
    Overflowed { dropped: usize },
    /// The source has no more samples; the block content is unspecified.
    EndOfStream,
}

/// A blocking mono 16-bit PCM source.
///
/// Sources are opened and used on the capture thread, so they do not need to
/// be `Send`.
pub trait AudioSource {
    /// Blocks until `block` is completely filled with the next samples.
    fn read(&mut self, block: &mut [i16]) -> Result<ReadOutcome>;

    /// Releases the underlying device or stream. Further reads report end of stream.
    fn close(&mut self);
}

impl<S: AudioSource + ?Sized> AudioSource for Box<S> {
    fn read(&mut self, block: &mut [i16]) -> Result<ReadOutcome> {
        (**self).read(block)
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// Interprets little-endian bytes as signed 16-bit samples. A trailing odd byte is ignored.
pub fn decode_pcm16le(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// An input device as seen by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputDevice {
    pub index: usize,
    pub name: String,
    pub is_default: bool,
}

/// Lists the host's input devices in the order `device_index` refers to.
pub fn list_input_devices() -> Result<Vec<InputDevice>> {
    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());
    let devices = host
        .input_devices()
        .map_err(|e| PitchError::Device(e.to_string()))?;

    Ok(devices
        .enumerate()
        .map(|(index, device)| {
            let name = device.name().unwrap_or_else(|_| "<unnamed>".to_string());
            let is_default = default_name.as_deref() == Some(name.as_str());
            InputDevice {
                index,
                name,
                is_default,
            }
        })
        .collect())
}

/// Live microphone input through CPAL.
///
/// The realtime callback never blocks: it forwards each callback's samples as
/// one chunk over a bounded channel and counts the samples of any chunk that
/// does not fit. `read` reassembles chunks into blocks of the requested size.
pub struct CpalSource {
    stream: Option<cpal::Stream>,
    receiver: Receiver<Vec<i16>>,
    pending: VecDeque<i16>,
    dropped: Arc<AtomicUsize>,
    device_name: String,
}

impl CpalSource {
    /// Opens the configured input device and starts streaming.
    ///
    /// # Returns
    /// * `Ok(source)` - The stream is running
    /// * `Err(PitchError::DeviceNotFound)` - `device_index` is out of range
    /// * `Err(PitchError::UnsupportedFormat)` - No i16/f32 config at the sample rate
    /// * `Err(PitchError::Device)` - The host refused to open or start the stream
    pub fn open(config: &SourceConfig) -> Result<Self> {
        let host = cpal::default_host();
        let device = select_input_device(&host, config.device_index)?;
        let device_name = device.name().unwrap_or_else(|_| "<unnamed>".to_string());
        log::info!("Using audio input device: {}", device_name);

        let configs = device
            .supported_input_configs()
            .map_err(|e| PitchError::Device(e.to_string()))?
            .collect::<Vec<_>>();
        let supported = find_supported_config(configs, config.sample_rate).ok_or(
            PitchError::UnsupportedFormat {
                sample_rate: config.sample_rate,
                channels: 1,
            },
        )?;

        let channels = supported.channels().max(1) as usize;
        let sample_format = supported.sample_format();
        let stream_config: cpal::StreamConfig = supported
            .with_sample_rate(cpal::SampleRate(config.sample_rate))
            .into();
        log::info!(
            "Capturing {} Hz, {} channel(s), {:?}",
            config.sample_rate,
            channels,
            sample_format
        );

        let (sender, receiver) = crossbeam_channel::bounded(CHUNK_QUEUE_DEPTH);
        let dropped = Arc::new(AtomicUsize::new(0));

        let stream = match sample_format {
            SampleFormat::I16 => {
                build_stream::<i16>(&device, &stream_config, channels, sender, dropped.clone())?
            }
            SampleFormat::F32 => {
                build_stream::<f32>(&device, &stream_config, channels, sender, dropped.clone())?
            }
            other => {
                return Err(PitchError::Device(format!(
                    "unsupported sample format {other:?}"
                )));
            }
        };
        stream
            .play()
            .map_err(|e| PitchError::Device(e.to_string()))?;

        Ok(Self {
            stream: Some(stream),
            receiver,
            pending: VecDeque::with_capacity(config.buffer_size * 2),
            dropped,
            device_name,
        })
    }
}

impl AudioSource for CpalSource {
    fn read(&mut self, block: &mut [i16]) -> Result<ReadOutcome> {
        if self.stream.is_none() {
            return Ok(ReadOutcome::EndOfStream);
        }
        while self.pending.len() < block.len() {
            match self.receiver.recv() {
                Ok(chunk) => self.pending.extend(chunk),
                Err(_) => return Ok(ReadOutcome::EndOfStream),
            }
        }
        let n = block.len();
        for (slot, sample) in block.iter_mut().zip(self.pending.drain(..n)) {
            *slot = sample;
        }

        match self.dropped.swap(0, Ordering::Relaxed) {
            0 => Ok(ReadOutcome::Complete),
            dropped => Ok(ReadOutcome::Overflowed { dropped }),
        }
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                log::warn!("Failed to pause input stream: {}", e);
            }
            drop(stream);
            self.pending.clear();
            log::info!("Closed audio input device: {}", self.device_name);
        }
    }
}

impl Drop for CpalSource {
    fn drop(&mut self) {
        self.close();
    }
}

fn select_input_device(host: &cpal::Host, device_index: Option<usize>) -> Result<cpal::Device> {
    match device_index {
        None => host
            .default_input_device()
            .ok_or_else(|| PitchError::Device("No input device available".to_string())),
        Some(index) => host
            .input_devices()
            .map_err(|e| PitchError::Device(e.to_string()))?
            .nth(index)
            .ok_or(PitchError::DeviceNotFound(index)),
    }
}

/// Finds the best supported configuration for the target sample rate.
///
/// Only i16 and f32 configurations whose range contains `target_rate` qualify.
/// Among those, mono beats multi-channel and i16 beats f32.
fn find_supported_config(
    configs: Vec<SupportedStreamConfigRange>,
    target_rate: u32,
) -> Option<SupportedStreamConfigRange> {
    configs
        .into_iter()
        .filter(|c| matches!(c.sample_format(), SampleFormat::I16 | SampleFormat::F32))
        .filter(|c| c.min_sample_rate().0 <= target_rate && target_rate <= c.max_sample_rate().0)
        .min_by_key(|c| {
            (
                c.channels() != 1,
                c.sample_format() != SampleFormat::I16,
                c.channels(),
            )
        })
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    channels: usize,
    sender: Sender<Vec<i16>>,
    dropped: Arc<AtomicUsize>,
) -> Result<cpal::Stream>
where
    T: SizedSample,
    i16: FromSample<T>,
{
    let err_fn = |err: cpal::StreamError| log::error!("An error occurred on the audio stream: {}", err);

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let chunk: Vec<i16> = data
                    .chunks(channels)
                    .map(|frame| <i16 as Sample>::from_sample(frame[0]))
                    .collect();
                let len = chunk.len();
                // Never block the audio callback; account for what we lose instead.
                if sender.try_send(chunk).is_err() {
                    dropped.fetch_add(len, Ordering::Relaxed);
                }
            },
            err_fn,
            None,
        )
        .map_err(|e| PitchError::Device(e.to_string()))
}

/// Little-endian signed 16-bit mono PCM from any reader (a pipe, a file, stdin).
///
/// A short final read is zero-padded to a full block; the read after it
/// reports [`ReadOutcome::EndOfStream`].
pub struct PcmReaderSource<R> {
    reader: Option<R>,
    bytes: Vec<u8>,
    exhausted: bool,
}

impl<R: Read> PcmReaderSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: Some(reader),
            bytes: Vec::new(),
            exhausted: false,
        }
    }
}

impl<R: Read> AudioSource for PcmReaderSource<R> {
    fn read(&mut self, block: &mut [i16]) -> Result<ReadOutcome> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(ReadOutcome::EndOfStream);
        };
        if self.exhausted {
            return Ok(ReadOutcome::EndOfStream);
        }

        let wanted = block.len() * 2;
        self.bytes.clear();
        self.bytes.resize(wanted, 0);
        let mut filled = 0;
        while filled < wanted {
            match reader.read(&mut self.bytes[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        if filled == 0 {
            self.exhausted = true;
            return Ok(ReadOutcome::EndOfStream);
        }
        if filled < wanted {
            self.exhausted = true;
            // Zero-pad, dropping a dangling half sample.
            let whole = filled - filled % 2;
            self.bytes[whole..].fill(0);
        }

        for (slot, pair) in block.iter_mut().zip(self.bytes.chunks_exact(2)) {
            *slot = i16::from_le_bytes([pair[0], pair[1]]);
        }
        Ok(ReadOutcome::Complete)
    }

    fn close(&mut self) {
        if self.reader.take().is_some() {
            log::info!("Closed PCM input stream");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn encode(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    #[test]
    fn decodes_little_endian_pairs() {
        assert_eq!(
            decode_pcm16le(&[0x01, 0x00, 0xff, 0xff, 0x00, 0x80, 0x7f]),
            vec![1, -1, i16::MIN]
        );
    }

    #[test]
    fn reader_source_fills_blocks_in_order() {
        let samples: Vec<i16> = (0..8).map(|i| i * 100 - 300).collect();
        let mut source = PcmReaderSource::new(Cursor::new(encode(&samples)));
        let mut block = [0i16; 4];

        assert_eq!(source.read(&mut block).unwrap(), ReadOutcome::Complete);
        assert_eq!(block, [-300, -200, -100, 0]);
        assert_eq!(source.read(&mut block).unwrap(), ReadOutcome::Complete);
        assert_eq!(block, [100, 200, 300, 400]);
        assert_eq!(source.read(&mut block).unwrap(), ReadOutcome::EndOfStream);
    }

    #[test]
    fn short_tail_is_zero_padded() {
        let mut bytes = encode(&[7, 8, 9]);
        bytes.push(0x55);
        let mut source = PcmReaderSource::new(Cursor::new(bytes));
        let mut block = [-1i16; 6];
        assert_eq!(source.read(&mut block).unwrap(), ReadOutcome::Complete);
        assert_eq!(block, [7, 8, 9, 0, 0, 0]);
        assert_eq!(source.read(&mut block).unwrap(), ReadOutcome::EndOfStream);
    }

    #[test]
    fn closed_reader_reports_end_of_stream() {
        let mut source = PcmReaderSource::new(Cursor::new(encode(&[1, 2, 3, 4])));
        source.close();
        source.close();
        let mut block = [0i16; 2];
        assert_eq!(source.read(&mut block).unwrap(), ReadOutcome::EndOfStream);
    }

    #[test]
    fn boxed_sources_forward_calls() {
        let mut source: Box<dyn AudioSource> =
            Box::new(PcmReaderSource::new(Cursor::new(encode(&[5, 6]))));
        let mut block = [0i16; 2];
        assert_eq!(source.read(&mut block).unwrap(), ReadOutcome::Complete);
        assert_eq!(block, [5, 6]);
    }

    #[test]
    fn source_config_comes_from_tracker_config() {
        let config = TrackerConfig {
            device_index: Some(2),
            ..TrackerConfig::whistle()
        };
        assert_eq!(
            SourceConfig::from(&config),
            SourceConfig {
                sample_rate: 4096,
                buffer_size: 1024,
                device_index: Some(2)
            }
        );
    }
}
