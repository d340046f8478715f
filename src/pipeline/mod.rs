//! Cycle orchestration for the voice relay.
//!
//! This module wires capture → transfer → playback into one endless loop and
//! exposes the shared status the loop maintains.
//!
//! # Architecture
//!
//! ```text
//! CycleOrchestrator::run()  ← async, block_on from main
//!        │
//!        ├─ CaptureController   (ticker thread fills the SampleBuffer)
//!        ├─ Transmitter         (reqwest upload, reply → AssetStore)
//!        └─ spawn_blocking(Player::play)  (minimp3 → cpal, asset removed)
//!
//! SharedState (Arc<Mutex<DeviceStatus>>) ←── phase + counters
//! ```
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use voice_relay::audio::{CaptureController, MicrophoneAdc, ThreadTicker};
//! use voice_relay::config::{DeviceConfig, StoragePaths};
//! use voice_relay::pipeline::{new_shared_state, CycleOrchestrator};
//! use voice_relay::playback::{Mp3Codec, Player, SpeakerOutput};
//! use voice_relay::storage::{AssetStore, FsStore};
//! use voice_relay::transmit::{HttpVoiceService, Transmitter};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let config = DeviceConfig::builtin()?;
//! let state = new_shared_state();
//! let store: Arc<dyn AssetStore> = Arc::new(FsStore::mount(StoragePaths::new().flash_dir)?);
//! let (adc, _stream) = MicrophoneAdc::open(config.capture.adc_max)?;
//!
//! let capture = CaptureController::new(
//!     &config.capture,
//!     Box::new(adc),
//!     Box::new(ThreadTicker::new()),
//!     Arc::clone(&state),
//! );
//! let transmitter = Transmitter::new(
//!     &config.service,
//!     config.capture.sample_rate,
//!     Arc::new(HttpVoiceService::from_config(&config.service)),
//!     Arc::clone(&store),
//!     config.storage.asset_name.clone(),
//! );
//! let player = Player::new(
//!     store,
//!     config.storage.asset_name.clone(),
//!     Arc::new(Mp3Codec),
//!     Arc::new(SpeakerOutput::new(None)),
//!     config.playback.gain,
//! );
//!
//! CycleOrchestrator::new(&config.capture, state, capture, transmitter, player)
//!     .run()
//!     .await;
//! # Ok(())
//! # }
//! ```

pub mod runner;
pub mod state;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use runner::{CycleOrchestrator, CycleOutcome, CycleReport};
pub use state::{current_cycle, new_shared_state, set_cycle, CycleState, DeviceStatus, SharedState};
