//! Audio capture
//!
//! The pipeline pulls fixed-size frames of normalized samples from an
//! [`AudioSource`]. Two sources exist: a live microphone (feature
//! `microphone`) and a WAV file replayed frame by frame for bench runs.

use std::collections::VecDeque;
use std::path::Path;
use std::thread;
use std::time::Duration;

use crate::{Error, Result};

/// Sample rate for audio capture (16kHz for speech)
pub const SAMPLE_RATE: u32 = 16000;

/// Default samples per classifier frame (one second at 16kHz)
pub const FRAME_LEN: usize = 16000;

/// One frame of normalized samples in roughly [-1.0, 1.0]
pub type AudioFrame = Vec<f32>;

/// Produces audio frames on demand, strictly in capture order
pub trait AudioSource {
    /// Block until `len` samples are available and return them
    ///
    /// # Errors
    ///
    /// Returns [`Error::Audio`] if this read failed (the caller skips the
    /// iteration) or [`Error::EndOfInput`] if the source is exhausted
    fn read_frame(&mut self, len: usize) -> Result<AudioFrame>;
}

impl<S: AudioSource + ?Sized> AudioSource for Box<S> {
    fn read_frame(&mut self, len: usize) -> Result<AudioFrame> {
        (**self).read_frame(len)
    }
}

/// Call `open` until it succeeds, at most `attempts` times with `delay` between
///
/// Only opening is retried; steady-state read failures are the caller's to skip.
///
/// # Errors
///
/// Returns [`Error::Audio`] carrying the last failure once every attempt failed
pub fn open_with_retry<S, F>(mut open: F, attempts: u32, delay: Duration) -> Result<S>
where
    F: FnMut() -> Result<S>,
{
    let attempts = attempts.max(1);
    let mut last_error = None;

    for attempt in 1..=attempts {
        match open() {
            Ok(source) => {
                tracing::info!(attempt, attempts, "audio input opened");
                return Ok(source);
            }
            Err(e) => {
                tracing::warn!(attempt, attempts, error = %e, "failed to open audio input");
                last_error = Some(e);
                if attempt < attempts {
                    tracing::info!(delay_ms = delay.as_millis(), "waiting before next attempt");
                    thread::sleep(delay);
                }
            }
        }
    }

    let reason = last_error.map_or_else(String::new, |e| e.to_string());
    Err(Error::Audio(format!(
        "could not open audio input after {attempts} attempts: {reason}"
    )))
}

/// Normalize a signed 16-bit PCM sample
#[must_use]
pub fn pcm_to_float(sample: i16) -> f32 {
    f32::from(sample) / 32768.0
}

/// Convert a normalized sample back to signed 16-bit PCM
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn float_to_pcm(sample: f32) -> i16 {
    (sample * 32768.0).clamp(-32768.0, 32767.0) as i16
}

/// Replays a WAV file as if it came from the microphone
///
/// Multi-channel files contribute their first channel. A trailing partial
/// frame is dropped and reported as [`Error::EndOfInput`].
#[derive(Debug)]
pub struct WavSource {
    samples: Vec<f32>,
    position: usize,
}

impl WavSource {
    /// Load a WAV file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or decoded
    #[allow(clippy::cast_precision_loss)]
    pub fn open<P: AsRef<Path>>(path: P, expected_rate: u32) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = hound::WavReader::open(path)?;
        let spec = reader.spec();

        if spec.sample_rate != expected_rate {
            tracing::warn!(
                path = %path.display(),
                file_rate = spec.sample_rate,
                expected_rate,
                "sample rate mismatch, replaying without resampling"
            );
        }

        let interleaved: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader.samples::<f32>().collect::<hound::Result<_>>()?,
            hound::SampleFormat::Int => {
                let scale = (1u64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<hound::Result<_>>()?
            }
        };

        let channels = usize::from(spec.channels.max(1));
        let samples: Vec<f32> = interleaved.into_iter().step_by(channels).collect();

        tracing::debug!(
            path = %path.display(),
            samples = samples.len(),
            channels,
            "wav input loaded"
        );

        Ok(Self::from_samples(samples))
    }

    /// Replay samples already in memory
    #[must_use]
    pub const fn from_samples(samples: Vec<f32>) -> Self {
        Self {
            samples,
            position: 0,
        }
    }

    /// Samples not yet handed out
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.samples.len() - self.position
    }
}

impl AudioSource for WavSource {
    fn read_frame(&mut self, len: usize) -> Result<AudioFrame> {
        if self.remaining() < len || len == 0 {
            return Err(Error::EndOfInput);
        }

        let frame = self.samples[self.position..self.position + len].to_vec();
        self.position += len;
        Ok(frame)
    }
}

/// Live capture queue holding at most one frame
///
/// The device pushes samples as they arrive. Once more than one frame is
/// queued the oldest samples are dropped, and the next [`take`] reports
/// the overrun instead of returning audio.
///
/// [`take`]: CaptureBuffer::take
#[derive(Debug)]
pub struct CaptureBuffer {
    samples: VecDeque<f32>,
    capacity: usize,
    dropped: usize,
}

impl CaptureBuffer {
    /// Empty buffer sized for `capacity` samples
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
            dropped: 0,
        }
    }

    /// Resize to the frame length about to be read
    ///
    /// Shrinking keeps the newest samples.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
        let excess = self.samples.len().saturating_sub(capacity);
        self.samples.drain(..excess);
    }

    /// Append captured samples, dropping the oldest beyond one frame
    pub fn push(&mut self, samples: impl IntoIterator<Item = f32>) {
        self.samples.extend(samples);
        let excess = self.samples.len().saturating_sub(self.capacity);
        if excess > 0 {
            self.samples.drain(..excess);
            self.dropped += excess;
        }
    }

    /// Take a frame of `len` samples if one is queued
    ///
    /// Returns `None` while fewer than `len` samples are queued.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Audio`] once after samples were dropped
    pub fn take(&mut self, len: usize) -> Option<Result<AudioFrame>> {
        if self.dropped > 0 {
            let dropped = std::mem::take(&mut self.dropped);
            return Some(Err(Error::Audio(format!(
                "capture overrun, {dropped} samples dropped"
            ))));
        }
        (self.samples.len() >= len).then(|| Ok(self.samples.drain(..len).collect()))
    }

    /// Samples currently queued
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether nothing is queued
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[cfg(feature = "microphone")]
pub use microphone::MicrophoneSource;

#[cfg(feature = "microphone")]
mod microphone {
    use std::sync::{Arc, Mutex};
    use std::thread;
    use std::time::Duration;

    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use cpal::{Device, SampleFormat, SampleRate, SizedSample, Stream, StreamConfig};

    use super::{AudioFrame, AudioSource, CaptureBuffer, FRAME_LEN, pcm_to_float};
    use crate::{Error, Result};

    /// How often a blocked `read_frame` re-checks the capture buffer
    const POLL_INTERVAL: Duration = Duration::from_millis(5);

    /// Captures mono audio from an input device
    ///
    /// The stream callback appends to a shared [`CaptureBuffer`];
    /// `read_frame` blocks until a whole frame is queued. Audio arriving
    /// faster than frames are read is dropped and reported as an overrun.
    pub struct MicrophoneSource {
        _stream: Stream,
        buffer: Arc<Mutex<CaptureBuffer>>,
        failure: Arc<Mutex<Option<String>>>,
    }

    impl MicrophoneSource {
        /// Open `device` (or the default input) at `sample_rate`, mono
        ///
        /// # Errors
        ///
        /// Returns error if no suitable device or configuration exists or
        /// the stream cannot be started
        pub fn open(device: Option<&str>, sample_rate: u32) -> Result<Self> {
            let host = cpal::default_host();
            let device = select_device(&host, device)?;

            let supported = device
                .supported_input_configs()
                .map_err(|e| Error::Audio(e.to_string()))?
                .find(|c| {
                    c.channels() == 1
                        && matches!(c.sample_format(), SampleFormat::F32 | SampleFormat::I16)
                        && c.min_sample_rate() <= SampleRate(sample_rate)
                        && c.max_sample_rate() >= SampleRate(sample_rate)
                })
                .ok_or_else(|| Error::Audio("no suitable audio config found".to_string()))?
                .with_sample_rate(SampleRate(sample_rate));

            let sample_format = supported.sample_format();
            let config = supported.config();

            tracing::debug!(
                device = device.name().unwrap_or_default(),
                sample_rate,
                ?sample_format,
                "audio capture initialized"
            );

            let buffer = Arc::new(Mutex::new(CaptureBuffer::new(FRAME_LEN)));
            let failure = Arc::new(Mutex::new(None));

            let stream = match sample_format {
                SampleFormat::I16 => {
                    build_stream::<i16>(&device, &config, &buffer, &failure, pcm_to_float)?
                }
                _ => build_stream::<f32>(&device, &config, &buffer, &failure, |s| s)?,
            };

            stream.play().map_err(|e| Error::Audio(e.to_string()))?;
            tracing::debug!("audio capture started");

            Ok(Self {
                _stream: stream,
                buffer,
                failure,
            })
        }
    }

    impl AudioSource for MicrophoneSource {
        fn read_frame(&mut self, len: usize) -> Result<AudioFrame> {
            loop {
                if let Some(reason) = self
                    .failure
                    .lock()
                    .map_err(|_| Error::Audio("capture state poisoned".to_string()))?
                    .take()
                {
                    return Err(Error::Audio(reason));
                }

                {
                    let mut buffer = self
                        .buffer
                        .lock()
                        .map_err(|_| Error::Audio("capture buffer poisoned".to_string()))?;
                    buffer.set_capacity(len);
                    if let Some(frame) = buffer.take(len) {
                        return frame;
                    }
                }

                thread::sleep(POLL_INTERVAL);
            }
        }
    }

    fn select_device(host: &cpal::Host, name: Option<&str>) -> Result<Device> {
        match name {
            Some(name) => host
                .input_devices()
                .map_err(|e| Error::Audio(e.to_string()))?
                .find(|d| d.name().is_ok_and(|n| n == name))
                .ok_or_else(|| Error::Audio(format!("input device not found: {name}"))),
            None => host
                .default_input_device()
                .ok_or_else(|| Error::Audio("no input device available".to_string())),
        }
    }

    fn build_stream<T>(
        device: &Device,
        config: &StreamConfig,
        buffer: &Arc<Mutex<CaptureBuffer>>,
        failure: &Arc<Mutex<Option<String>>>,
        convert: fn(T) -> f32,
    ) -> Result<Stream>
    where
        T: SizedSample + Copy + Send + 'static,
    {
        let buffer = Arc::clone(buffer);
        let failure = Arc::clone(failure);

        device
            .build_input_stream(
                config,
                move |data: &[T], _: &cpal::InputCallbackInfo| {
                    if let Ok(mut buf) = buffer.lock() {
                        buf.push(data.iter().copied().map(convert));
                    }
                },
                move |err| {
                    tracing::error!(error = %err, "audio capture error");
                    if let Ok(mut slot) = failure.lock() {
                        *slot = Some(err.to_string());
                    }
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pcm_normalization() {
        assert!((pcm_to_float(i16::MIN) + 1.0).abs() < f32::EPSILON);
        assert!(pcm_to_float(0).abs() < f32::EPSILON);
        assert_eq!(float_to_pcm(pcm_to_float(1234)), 1234);
        assert_eq!(float_to_pcm(2.0), i16::MAX);
        assert_eq!(float_to_pcm(-2.0), i16::MIN);
    }

    #[test]
    fn wav_source_yields_frames_in_order_then_ends() {
        let samples: Vec<f32> = (0..10u8).map(f32::from).collect();
        let mut source = WavSource::from_samples(samples);

        assert_eq!(source.read_frame(4).unwrap(), vec![0.0, 1.0, 2.0, 3.0]);
        assert_eq!(source.read_frame(4).unwrap(), vec![4.0, 5.0, 6.0, 7.0]);
        assert!(matches!(source.read_frame(4), Err(Error::EndOfInput)));
        assert_eq!(source.remaining(), 2);
    }

    #[test]
    fn wav_file_round_trip_takes_first_channel() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: SAMPLE_RATE,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for i in 0..8i16 {
            writer.write_sample(i * 100).unwrap();
            writer.write_sample(-1).unwrap();
        }
        writer.finalize().unwrap();

        let mut source = WavSource::open(&path, SAMPLE_RATE).unwrap();
        assert_eq!(source.remaining(), 8);
        let frame = source.read_frame(8).unwrap();
        assert_eq!(float_to_pcm(frame[3]), 300);
    }

    #[test]
    fn eight_bit_wav_uses_full_scale() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mono8.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: SAMPLE_RATE,
            bits_per_sample: 8,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for sample in [64i8, -128, 0, 127] {
            writer.write_sample(sample).unwrap();
        }
        writer.finalize().unwrap();

        let frame = WavSource::open(&path, SAMPLE_RATE).unwrap().read_frame(4).unwrap();
        assert!((frame[0] - 0.5).abs() < f32::EPSILON);
        assert!((frame[1] + 1.0).abs() < f32::EPSILON);
        assert!(frame[2].abs() < f32::EPSILON);
    }

    #[test]
    fn capture_buffer_keeps_only_the_newest_frame() {
        let mut buffer = CaptureBuffer::new(4);
        buffer.push((0..10u8).map(f32::from));
        assert_eq!(buffer.len(), 4);

        let overrun = buffer.take(4);
        assert!(matches!(overrun, Some(Err(Error::Audio(msg))) if msg.contains("6 samples dropped")));
        assert_eq!(buffer.take(4).unwrap().unwrap(), vec![6.0, 7.0, 8.0, 9.0]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn capture_buffer_waits_for_a_whole_frame() {
        let mut buffer = CaptureBuffer::new(4);
        buffer.push([0.1, 0.2, 0.3]);
        assert!(buffer.take(4).is_none());

        buffer.push([0.4]);
        assert_eq!(buffer.take(4).unwrap().unwrap(), vec![0.1, 0.2, 0.3, 0.4]);
    }

    #[test]
    fn shrinking_the_frame_keeps_newest_without_overrun() {
        let mut buffer = CaptureBuffer::new(4);
        buffer.push([1.0, 2.0, 3.0]);
        buffer.set_capacity(2);

        assert_eq!(buffer.take(2).unwrap().unwrap(), vec![2.0, 3.0]);
    }

    #[test]
    fn retry_gives_up_after_all_attempts() {
        let mut calls = 0;
        let result: Result<()> = open_with_retry(
            || {
                calls += 1;
                Err(Error::Audio("busy".to_string()))
            },
            3,
            Duration::ZERO,
        );
        assert_eq!(calls, 3);
        assert!(matches!(result, Err(Error::Audio(msg)) if msg.contains("busy")));
    }

    #[test]
    fn retry_stops_on_first_success() {
        let mut calls = 0;
        let result = open_with_retry(
            || {
                calls += 1;
                if calls < 2 {
                    Err(Error::Audio("busy".to_string()))
                } else {
                    Ok(calls)
                }
            },
            10,
            Duration::ZERO,
        );
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls, 2);
    }
}
