//! Audio sinks: where decoded frames are rendered.
//!
//! [`SpeakerOutput`] opens a cpal output device and returns a
//! [`SpeakerSink`].  Each written frame goes through a [`FrameConverter`]
//! (mono `f32`, fixed output gain, streaming resample to the device rate) and
//! is queued for the cpal callback.  `write` blocks while more than
//! [`LOOKAHEAD_SECS`] of audio is queued, so decode steps run at playback
//! pace instead of preloading the whole asset.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use thiserror::Error;

use super::decoder::StreamFormat;
use crate::audio::{downmix_to_mono, pcm_to_f32, LinearResampler};

/// Maximum audio queued ahead of the device.
pub const LOOKAHEAD_SECS: f32 = 0.5;

/// How long `write` waits for the device to consume anything before giving up.
const STALL_TIMEOUT: Duration = Duration::from_secs(2);

// ---------------------------------------------------------------------------
// SinkError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("no output device available")]
    NoDevice,

    #[error("output device `{0}` not found")]
    DeviceNotFound(String),

    #[error("failed to enumerate output devices: {0}")]
    Devices(#[from] cpal::DevicesError),

    #[error("failed to query default output config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("unsupported output sample format {0:?}")]
    UnsupportedFormat(cpal::SampleFormat),

    #[error("failed to build output stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start output stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("write before configure")]
    NotConfigured,

    #[error("output device stopped consuming audio")]
    Stalled,
}

// ---------------------------------------------------------------------------
// AudioSink / SinkProvider traits
// ---------------------------------------------------------------------------

/// A hardware audio output bound to one playback.
///
/// Dropping the sink releases the device.
pub trait AudioSink {
    /// Prepare the output for frames of `format`.
    fn configure(&mut self, format: StreamFormat) -> Result<(), SinkError>;

    /// Render one frame of interleaved PCM.
    fn write(&mut self, pcm: &[i16]) -> Result<(), SinkError>;

    /// Block until everything written has been played.
    fn finish(&mut self);
}

/// Opens a fresh sink for each playback.
pub trait SinkProvider: Send + Sync {
    /// `gain` is clamped to `[0, 1]` by implementations.
    fn open(&self, gain: f32) -> Result<Box<dyn AudioSink>, SinkError>;
}

// ---------------------------------------------------------------------------
// FrameConverter
// ---------------------------------------------------------------------------

/// Turns decoded frames of one stream into device-ready mono samples.
///
/// Holds the resampler state, so consecutive frames join without a seam.
#[derive(Debug, Clone)]
pub struct FrameConverter {
    channels: u16,
    resampler: LinearResampler,
    gain: f32,
}

impl FrameConverter {
    pub fn new(format: StreamFormat, device_rate: u32, gain: f32) -> Self {
        Self {
            channels: format.channels,
            resampler: LinearResampler::new(format.sample_rate, device_rate),
            gain,
        }
    }

    pub fn convert(&mut self, pcm: &[i16]) -> Vec<f32> {
        let mono = downmix_to_mono(&pcm_to_f32(pcm), self.channels);
        let mut out = self.resampler.process(&mono);
        for s in &mut out {
            *s *= self.gain;
        }
        out
    }
}

// ---------------------------------------------------------------------------
// SpeakerOutput
// ---------------------------------------------------------------------------

/// Provider for the host speaker.
#[derive(Debug, Clone, Default)]
pub struct SpeakerOutput {
    /// Output device name; `None` selects the default device.
    device_name: Option<String>,
}

impl SpeakerOutput {
    pub fn new(device_name: Option<String>) -> Self {
        Self { device_name }
    }

    fn device(&self) -> Result<cpal::Device, SinkError> {
        let host = cpal::default_host();
        match &self.device_name {
            None => host.default_output_device().ok_or(SinkError::NoDevice),
            Some(name) => host
                .output_devices()?
                .find(|d| d.name().is_ok_and(|n| &n == name))
                .ok_or_else(|| SinkError::DeviceNotFound(name.clone())),
        }
    }
}

impl SinkProvider for SpeakerOutput {
    fn open(&self, gain: f32) -> Result<Box<dyn AudioSink>, SinkError> {
        let device = self.device()?;
        Ok(Box::new(SpeakerSink {
            device,
            gain: gain.clamp(0.0, 1.0),
            queue: Arc::new(Mutex::new(VecDeque::new())),
            active: None,
        }))
    }
}

// ---------------------------------------------------------------------------
// SpeakerSink
// ---------------------------------------------------------------------------

/// cpal-backed sink.  The stream is built by `configure`.
pub struct SpeakerSink {
    device: cpal::Device,
    gain: f32,
    queue: Arc<Mutex<VecDeque<f32>>>,
    active: Option<ActiveStream>,
}

struct ActiveStream {
    _stream: cpal::Stream,
    converter: FrameConverter,
    device_rate: u32,
}

impl SpeakerSink {
    fn queued(&self) -> usize {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl AudioSink for SpeakerSink {
    fn configure(&mut self, format: StreamFormat) -> Result<(), SinkError> {
        let supported = self.device.default_output_config()?;
        if supported.sample_format() != cpal::SampleFormat::F32 {
            return Err(SinkError::UnsupportedFormat(supported.sample_format()));
        }

        let config: cpal::StreamConfig = supported.into();
        let channels = usize::from(config.channels.max(1));
        let device_rate = config.sample_rate.0;
        let queue = Arc::clone(&self.queue);

        let stream = self.device.build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let mut queue = queue.lock().unwrap_or_else(PoisonError::into_inner);
                for frame in data.chunks_mut(channels) {
                    let sample = queue.pop_front().unwrap_or(0.0);
                    frame.fill(sample);
                }
            },
            |err: cpal::StreamError| {
                log::error!("cpal output stream error: {err}");
            },
            None,
        )?;
        stream.play()?;

        log::debug!(
            "speaker: {} Hz {} ch source -> {} Hz {} ch device, gain {:.2}",
            format.sample_rate,
            format.channels,
            device_rate,
            channels,
            self.gain
        );

        self.active = Some(ActiveStream {
            _stream: stream,
            converter: FrameConverter::new(format, device_rate, self.gain),
            device_rate,
        });
        Ok(())
    }

    fn write(&mut self, pcm: &[i16]) -> Result<(), SinkError> {
        let Some(active) = self.active.as_mut() else {
            return Err(SinkError::NotConfigured);
        };
        let device_rate = active.device_rate;
        let samples = active.converter.convert(pcm);
        let limit = (device_rate as f32 * LOOKAHEAD_SECS) as usize;

        let mut last_len = self.queued();
        let mut last_progress = Instant::now();
        while last_len > limit {
            std::thread::sleep(Duration::from_millis(5));
            let len = self.queued();
            if len < last_len {
                last_progress = Instant::now();
            } else if last_progress.elapsed() > STALL_TIMEOUT {
                return Err(SinkError::Stalled);
            }
            last_len = len;
        }

        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(samples);
        Ok(())
    }

    fn finish(&mut self) {
        let Some(active) = &self.active else {
            return;
        };
        let remaining = self.queued();
        let budget = Duration::from_secs_f32(remaining as f32 / active.device_rate.max(1) as f32)
            + Duration::from_millis(500);

        let start = Instant::now();
        while self.queued() > 0 && start.elapsed() < budget {
            std::thread::sleep(Duration::from_millis(10));
        }
        // Let the device flush its own buffer.
        std::thread::sleep(Duration::from_millis(100));
    }
}

// ---------------------------------------------------------------------------
// RecordingSink (test double)
// ---------------------------------------------------------------------------

/// What a [`RecordingOutput`] saw.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct SinkLog {
    pub opened: usize,
    pub gain: Option<f32>,
    pub format: Option<StreamFormat>,
    pub samples: Vec<i16>,
    pub finished: bool,
    pub released: usize,
}

/// Provider whose sinks record everything instead of playing it.
#[cfg(test)]
#[derive(Default, Clone)]
pub struct RecordingOutput {
    pub log: Arc<Mutex<SinkLog>>,
    pub fail_open: bool,
    pub fail_write_after: Option<usize>,
}

#[cfg(test)]
struct RecordingSink {
    log: Arc<Mutex<SinkLog>>,
    writes_left: Option<usize>,
}

#[cfg(test)]
impl SinkProvider for RecordingOutput {
    fn open(&self, gain: f32) -> Result<Box<dyn AudioSink>, SinkError> {
        if self.fail_open {
            return Err(SinkError::NoDevice);
        }
        let mut log = self.log.lock().unwrap();
        log.opened += 1;
        log.gain = Some(gain);
        Ok(Box::new(RecordingSink {
            log: Arc::clone(&self.log),
            writes_left: self.fail_write_after,
        }))
    }
}

#[cfg(test)]
impl AudioSink for RecordingSink {
    fn configure(&mut self, format: StreamFormat) -> Result<(), SinkError> {
        self.log.lock().unwrap().format = Some(format);
        Ok(())
    }

    fn write(&mut self, pcm: &[i16]) -> Result<(), SinkError> {
        if let Some(left) = self.writes_left.as_mut() {
            if *left == 0 {
                return Err(SinkError::Stalled);
            }
            *left -= 1;
        }
        self.log.lock().unwrap().samples.extend_from_slice(pcm);
        Ok(())
    }

    fn finish(&mut self) {
        self.log.lock().unwrap().finished = true;
    }
}

#[cfg(test)]
impl Drop for RecordingSink {
    fn drop(&mut self) {
        self.log.lock().unwrap().released += 1;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn mono(sample_rate: u32) -> StreamFormat {
        StreamFormat {
            sample_rate,
            channels: 1,
        }
    }

    #[test]
    fn converter_applies_gain() {
        let mut conv = FrameConverter::new(mono(24_000), 24_000, 0.3);
        let out = conv.convert(&[16_384, -16_384, 0]);
        assert_eq!(out.len(), 2);
        assert!((out[0] - 0.15).abs() < 1e-6);
        assert!((out[1] + 0.15).abs() < 1e-6);
    }

    #[test]
    fn converter_downmixes_and_upsamples() {
        let stereo = StreamFormat {
            sample_rate: 24_000,
            channels: 2,
        };
        let mut conv = FrameConverter::new(stereo, 48_000, 1.0);
        let pcm = vec![8_192_i16; 2 * 1152];

        let first = conv.convert(&pcm);
        let second = conv.convert(&pcm);

        // One input sample is held back at the end of each frame.
        assert_eq!(first.len(), 2302);
        assert_eq!(second.len(), 2304);
        assert!(first.iter().chain(&second).all(|s| (s - 0.25).abs() < 1e-5));
    }

    #[test]
    fn frame_boundary_is_interpolated() {
        let mut conv = FrameConverter::new(mono(24_000), 48_000, 1.0);
        conv.convert(&[0, 0, 0, 8_192]);
        let next = conv.convert(&[16_384, 16_384]);

        // Between the last sample of one frame and the first of the next.
        assert!((next[0] - 0.25).abs() < 1e-6);
        assert!((next[1] - 0.375).abs() < 1e-6);
        assert!((next[2] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn zero_gain_silences_output() {
        let mut conv = FrameConverter::new(mono(16_000), 16_000, 0.0);
        let out = conv.convert(&[32_000, -32_000, 1]);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn recording_sink_tracks_release() {
        let output = RecordingOutput::default();
        {
            let mut sink = output.open(0.3).expect("open");
            sink.write(&[1, 2]).expect("write");
        }
        let log = output.log.lock().unwrap();
        assert_eq!(log.opened, 1);
        assert_eq!(log.released, 1);
        assert_eq!(log.samples, vec![1, 2]);
        assert_eq!(log.gain, Some(0.3));
    }

    #[test]
    fn speaker_output_is_object_safe() {
        let provider: Box<dyn SinkProvider> = Box::new(SpeakerOutput::new(None));
        drop(provider);
    }
}
