//! Audio capture: analog input → periodic sampler → fixed sample buffer.
//!
//! # Pipeline
//!
//! ```text
//! AnalogInput (ADC / MicrophoneAdc)
//!     └─▶ Sampler::sample()   ← fired every 1/sample_rate by a Ticker
//!           └─▶ SampleBuffer  (saturates at capacity)
//!
//! CaptureController: start_recording / stop_recording / is_full
//! ```
//!
//! The speaker path reuses [`downmix_to_mono`] and [`LinearResampler`] from this
//! module.

pub mod buffer;
pub mod capture;
pub mod microphone;
pub mod resample;
pub mod sampler;
pub mod ticker;

pub use buffer::{SampleBuffer, SharedSampleBuffer};
pub use capture::CaptureController;
pub use microphone::{AdcReader, MicrophoneAdc, MicrophoneError, StreamHandle};
pub use resample::{downmix_to_mono, pcm_to_f32, LinearResampler};
pub use sampler::{AnalogInput, Rescale, Sampler};
pub use ticker::{ThreadTicker, TickFn, Ticker, TickerError};

#[cfg(test)]
pub use sampler::FixedInput;
#[cfg(test)]
pub use ticker::{BurstTicker, FailingTicker};
