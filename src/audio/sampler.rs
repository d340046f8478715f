//! Periodic sampler: one ADC reading per tick, rescaled into the buffer.

use std::sync::{Arc, Mutex, PoisonError};

use super::buffer::SharedSampleBuffer;
use crate::config::CaptureConfig;

// ---------------------------------------------------------------------------
// AnalogInput
// ---------------------------------------------------------------------------

/// A single analog input pin.
///
/// `read` returns the raw converter value in `0..=adc_max` and must not
/// block: it runs inside the periodic trigger.
pub trait AnalogInput: Send {
    fn read(&mut self) -> u16;
}

// ---------------------------------------------------------------------------
// Rescale
// ---------------------------------------------------------------------------

/// Maps a raw ADC value to a signed 16-bit amplitude.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rescale {
    pub midpoint: i32,
    pub gain: i32,
}

impl Rescale {
    pub fn from_config(config: &CaptureConfig) -> Self {
        Self {
            midpoint: i32::from(config.adc_midpoint),
            gain: config.mic_gain,
        }
    }

    /// `(raw - midpoint) * gain`, truncated to 16 bits.
    ///
    /// With a 10-bit converter and the default gain of 64 the product always
    /// fits; larger gains wrap rather than saturate.
    pub fn apply(&self, raw: u16) -> i16 {
        (i32::from(raw) - self.midpoint).wrapping_mul(self.gain) as i16
    }
}

// ---------------------------------------------------------------------------
// Sampler
// ---------------------------------------------------------------------------

/// The trigger body: reads one value and appends it until the buffer fills.
pub struct Sampler {
    buffer: SharedSampleBuffer,
    input: Mutex<Box<dyn AnalogInput>>,
    rescale: Rescale,
}

impl Sampler {
    pub fn new(buffer: SharedSampleBuffer, input: Box<dyn AnalogInput>, rescale: Rescale) -> Self {
        Self {
            buffer,
            input: Mutex::new(input),
            rescale,
        }
    }

    /// Take one sample.
    ///
    /// A no-op once the buffer is full; the input is not even read.
    pub fn sample(&self) {
        let mut buf = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        if buf.is_full() {
            return;
        }
        let raw = self
            .input
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .read();
        buf.push(self.rescale.apply(raw));
    }

    /// Wrap `self` as a callback for a [`crate::audio::Ticker`].
    pub fn into_tick(self: Arc<Self>) -> super::ticker::TickFn {
        Arc::new(move || self.sample())
    }
}

// ---------------------------------------------------------------------------
// FixedInput (test double)
// ---------------------------------------------------------------------------

/// Analog input that always reports the same value and counts reads.
#[cfg(test)]
pub struct FixedInput {
    pub value: u16,
    pub reads: Arc<std::sync::atomic::AtomicUsize>,
}

#[cfg(test)]
impl FixedInput {
    pub fn new(value: u16) -> Self {
        Self {
            value,
            reads: Arc::new(std::sync::atomic::AtomicUsize::new(0)),
        }
    }
}

#[cfg(test)]
impl AnalogInput for FixedInput {
    fn read(&mut self) -> u16 {
        self.reads
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.value
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
