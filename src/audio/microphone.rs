//! Host microphone presented as an ADC pin, via `cpal`.
//!
//! [`MicrophoneAdc::open`] starts a cpal input stream whose callback keeps
//! publishing the most recent sample, quantised to the converter range
//! `0..=adc_max`.  The returned [`AdcReader`] is the [`AnalogInput`] the
//! sampler reads; the returned [`StreamHandle`] is a RAII guard, and dropping
//! it stops the underlying cpal stream.

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use thiserror::Error;

use super::sampler::AnalogInput;

// ---------------------------------------------------------------------------
// StreamHandle
// ---------------------------------------------------------------------------

/// RAII guard that keeps the cpal input stream alive.
pub struct StreamHandle {
    _stream: cpal::Stream,
}

// ---------------------------------------------------------------------------
// MicrophoneError
// ---------------------------------------------------------------------------

/// Errors that can occur while opening the microphone.
#[derive(Debug, Error)]
pub enum MicrophoneError {
    #[error("no input device found on the default audio host")]
    NoDevice,

    #[error("failed to query default input config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("failed to build input stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start audio stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),
}

// ---------------------------------------------------------------------------
// AdcReader
// ---------------------------------------------------------------------------

/// Latest microphone level in ADC units.  Cheap to clone.
#[derive(Debug, Clone)]
pub struct AdcReader {
    latest: Arc<AtomicU16>,
}

impl AnalogInput for AdcReader {
    fn read(&mut self) -> u16 {
        self.latest.load(Ordering::Relaxed)
    }
}

/// Map a `[-1.0, 1.0]` sample onto `0..=adc_max`.
pub fn quantize(sample: f32, adc_max: u16) -> u16 {
    let unit = (sample.clamp(-1.0, 1.0) + 1.0) * 0.5;
    (unit * f32::from(adc_max)).round() as u16
}

// ---------------------------------------------------------------------------
// MicrophoneAdc
// ---------------------------------------------------------------------------

/// Opens the system default input device as an analog input.
pub struct MicrophoneAdc;

impl MicrophoneAdc {
    /// Start the input stream and return the reader plus its stream guard.
    ///
    /// Until the first callback arrives the reader reports the midpoint of the
    /// range, i.e. silence.
    ///
    /// # Errors
    ///
    /// Returns [`MicrophoneError::NoDevice`] when no input device exists, or a
    /// cpal error when the stream cannot be configured or started.
    pub fn open(adc_max: u16) -> Result<(AdcReader, StreamHandle), MicrophoneError> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or(MicrophoneError::NoDevice)?;

        let supported = device.default_input_config()?;
        let channels = usize::from(supported.channels().max(1));
        let config: cpal::StreamConfig = supported.into();

        let latest = Arc::new(AtomicU16::new(quantize(0.0, adc_max)));
        let latest_cb = Arc::clone(&latest);

        let stream = device.build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                // First channel of the newest frame.
                if let Some(frame) = data.chunks_exact(channels).last() {
                    latest_cb.store(quantize(frame[0], adc_max), Ordering::Relaxed);
                }
            },
            |err: cpal::StreamError| {
                log::error!("cpal input stream error: {err}");
            },
            None,
        )?;

        stream.play()?;
        log::info!(
            "microphone open ({} Hz, {} ch)",
            config.sample_rate.0,
            config.channels
        );

        Ok((AdcReader { latest }, StreamHandle { _stream: stream }))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
