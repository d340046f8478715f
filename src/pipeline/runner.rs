//! Cycle orchestrator: drives the record → transmit → play loop forever.
//!
//! [`CycleOrchestrator`] owns the capture controller, the transmitter and the
//! player, and records its progress in the [`SharedState`].
//!
//! # Cycle flow
//!
//! ```text
//! bring-up: sleep(warm-up) → start_recording            [Recording]
//!
//! loop:
//!   poll is_full (sleep poll_interval between polls)
//!   └─▶ stop_recording → transmitter.send(samples)      [Transmitting]
//!         ├─ Ok  → spawn_blocking(player.play)          [Playing]
//!         │         └─ any outcome: asset already gone
//!         └─ Err → warn, count failed transfer
//!   clear buffer → start_recording                      [Recording]
//! ```
//!
//! No failure stops the loop.  Playback runs on the blocking pool so the async
//! runtime never stalls on the speaker.  If the sampler trigger cannot be
//! started the device stays `Idle` and each cycle retries it after
//! [`REARM_DELAY`], reporting [`CycleOutcome::CaptureFailed`] until it works.
//!
//! The sleep between buffer polls lets other tasks on the runtime make
//! progress; it is not part of the cycle timing.

use std::sync::{Arc, PoisonError};
use std::time::Duration;

use crate::audio::{CaptureController, TickerError};
use crate::config::CaptureConfig;
use crate::playback::{PlaybackReport, Player};
use crate::transmit::{TransferError, TransferReceipt, Transmitter};

use super::state::{set_cycle, CycleState, SharedState};

/// Wait before retrying a sampler trigger that failed to start.
pub const REARM_DELAY: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// CycleReport
// ---------------------------------------------------------------------------

/// How a cycle ended.  Every variant leads to the next cycle.
#[derive(Debug)]
pub enum CycleOutcome {
    /// The reply was stored and playback started.
    Played {
        receipt: TransferReceipt,
        playback: PlaybackReport,
    },
    /// The reply was stored but playback could not start.
    PlaybackFailed {
        receipt: TransferReceipt,
        reason: String,
    },
    /// Every transfer attempt failed; playback was skipped.
    TransferFailed(TransferError),
    /// Recording could not be started; nothing was captured or sent.
    CaptureFailed(TickerError),
}

#[derive(Debug)]
pub struct CycleReport {
    /// Samples sent in this cycle.
    pub samples: usize,
    pub outcome: CycleOutcome,
}

// ---------------------------------------------------------------------------
// CycleOrchestrator
// ---------------------------------------------------------------------------

pub struct CycleOrchestrator {
    state: SharedState,
    capture: CaptureController,
    transmitter: Transmitter,
    player: Arc<Player>,
    warmup: Duration,
    poll_interval: Duration,
}

impl CycleOrchestrator {
    pub fn new(
        config: &CaptureConfig,
        state: SharedState,
        capture: CaptureController,
        transmitter: Transmitter,
        player: Player,
    ) -> Self {
        Self {
            state,
            capture,
            transmitter,
            player: Arc::new(player),
            warmup: config.warmup(),
            poll_interval: config.poll_interval(),
        }
    }

    pub fn capture(&self) -> &CaptureController {
        &self.capture
    }

    /// Bring up, then cycle forever.
    pub async fn run(mut self) {
        self.start().await;
        loop {
            let report = self.run_cycle().await;
            log::debug!("cycle done: {} samples, {:?}", report.samples, report.outcome);
        }
    }

    /// Wait out the warm-up delay and start the first recording.
    pub async fn start(&mut self) {
        if !self.warmup.is_zero() {
            log::info!("warming up for {:?}", self.warmup);
            tokio::time::sleep(self.warmup).await;
        }
        // A failure is recorded here and retried by the next cycle.
        let _ = self.arm();
    }

    /// Run one cycle: wait for a full buffer, send it, play the reply, reset.
    pub async fn run_cycle(&mut self) -> CycleReport {
        if !self.capture.is_recording() && !self.capture.is_full() {
            if let Err(e) = self.arm() {
                tokio::time::sleep(REARM_DELAY).await;
                return CycleReport {
                    samples: 0,
                    outcome: CycleOutcome::CaptureFailed(e),
                };
            }
        }

        while !self.capture.is_full() {
            tokio::time::sleep(self.poll_interval).await;
        }

        self.capture.stop_recording();
        let samples = self.capture.samples();
        set_cycle(&self.state, CycleState::Transmitting);

        let outcome = match self.transmitter.send(&samples).await {
            Ok(receipt) => self.play(receipt).await,
            Err(e) => {
                log::warn!("cycle: {e}, skipping playback");
                self.update(|st| {
                    st.failed_transfers += 1;
                    st.last_error = Some(e.to_string());
                });
                CycleOutcome::TransferFailed(e)
            }
        };

        self.capture.clear();
        self.update(|st| st.completed_cycles += 1);
        let _ = self.arm();

        CycleReport {
            samples: samples.len(),
            outcome,
        }
    }

    async fn play(&self, receipt: TransferReceipt) -> CycleOutcome {
        set_cycle(&self.state, CycleState::Playing);

        let player = Arc::clone(&self.player);
        let reason = match tokio::task::spawn_blocking(move || player.play()).await {
            Ok(Ok(playback)) => {
                if !playback.end.is_clean() {
                    self.update(|st| {
                        st.interrupted_playbacks += 1;
                        st.last_error = Some(format!("{:?}", playback.end));
                    });
                }
                return CycleOutcome::Played { receipt, playback };
            }
            Ok(Err(e)) => e.to_string(),
            Err(e) => format!("playback task failed: {e}"),
        };

        log::warn!("cycle: playback failed: {reason}");
        self.update(|st| st.last_error = Some(reason.clone()));
        CycleOutcome::PlaybackFailed { receipt, reason }
    }

    /// Start recording, recording a trigger failure in the status.
    fn arm(&mut self) -> Result<(), TickerError> {
        self.capture.start_recording().map_err(|e| {
            log::error!("cycle: {e}, retrying in {REARM_DELAY:?}");
            set_cycle(&self.state, CycleState::Idle);
            self.update(|st| {
                st.capture_failures += 1;
                st.last_error = Some(e.to_string());
            });
            e
        })
    }

    fn update(&self, f: impl FnOnce(&mut super::state::DeviceStatus)) {
        let mut st = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut st);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
