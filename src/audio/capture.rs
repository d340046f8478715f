//! Capture controller: owns the sample buffer, the sampler, and the ticker.
//!
//! [`CaptureController::start_recording`] resets the fill index and attaches
//! the sampler to the ticker.  [`CaptureController::stop_recording`] detaches
//! it; because [`Ticker::detach`] joins the trigger, the buffer is frozen and
//! fully visible to the dispatch loop as soon as `stop_recording` returns.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use super::buffer::{SampleBuffer, SharedSampleBuffer};
use super::sampler::{AnalogInput, Rescale, Sampler};
use super::ticker::{Ticker, TickerError};
use crate::config::CaptureConfig;
use crate::pipeline::state::{set_cycle, CycleState, SharedState};

// ---------------------------------------------------------------------------
// CaptureController
// ---------------------------------------------------------------------------

/// Starts and stops the sampler and reports when the buffer is full.
pub struct CaptureController {
    buffer: SharedSampleBuffer,
    sampler: Arc<Sampler>,
    ticker: Box<dyn Ticker>,
    period: Duration,
    sample_rate: u32,
    state: SharedState,
}

impl CaptureController {
    /// Build a controller for one `config.capacity()`-sample window.
    pub fn new(
        config: &CaptureConfig,
        input: Box<dyn AnalogInput>,
        ticker: Box<dyn Ticker>,
        state: SharedState,
    ) -> Self {
        let buffer = Arc::new(Mutex::new(SampleBuffer::new(config.capacity())));
        let sampler = Arc::new(Sampler::new(
            Arc::clone(&buffer),
            input,
            Rescale::from_config(config),
        ));

        Self {
            buffer,
            sampler,
            ticker,
            period: config.period(),
            sample_rate: config.sample_rate,
            state,
        }
    }

    /// Reset the fill index, attach the sampler, and enter `Recording`.
    ///
    /// Calling this while already recording is ignored so the trigger is
    /// never scheduled twice.  If the trigger cannot be started the state
    /// stays as it was and nothing will be sampled.
    pub fn start_recording(&mut self) -> Result<(), TickerError> {
        if self.ticker.is_attached() {
            log::warn!("capture: start_recording while already recording, ignored");
            return Ok(());
        }

        self.lock_buffer().reset();
        self.ticker
            .attach(self.period, Arc::clone(&self.sampler).into_tick())?;
        set_cycle(&self.state, CycleState::Recording);
        log::info!("recording started");
        Ok(())
    }

    /// Detach the sampler and return to `Idle`.
    pub fn stop_recording(&mut self) {
        self.ticker.detach();
        set_cycle(&self.state, CycleState::Idle);

        let buf = self.lock_buffer();
        log::info!(
            "recording stopped ({} samples, {:.2} s)",
            buf.len(),
            buf.duration_secs(self.sample_rate)
        );
    }

    /// `true` iff the fill index has reached capacity.
    pub fn is_full(&self) -> bool {
        self.lock_buffer().is_full()
    }

    pub fn is_recording(&self) -> bool {
        self.ticker.is_attached()
    }

    /// Copy of the samples captured so far.
    pub fn samples(&self) -> Vec<i16> {
        self.lock_buffer().filled().to_vec()
    }

    /// Fill index.
    pub fn len(&self) -> usize {
        self.lock_buffer().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_buffer().is_empty()
    }

    /// Zero the buffer ahead of the next cycle.
    pub fn clear(&mut self) {
        self.lock_buffer().clear();
    }

    fn lock_buffer(&self) -> std::sync::MutexGuard<'_, SampleBuffer> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for CaptureController {
    fn drop(&mut self) {
        self.ticker.detach();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
