//! Application entry point: voice relay device.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`DeviceConfig`] compiled in from `device.toml` (defaults if it is
//!    invalid).
//! 3. Mount the flash directory and drop any stale response asset.
//! 4. Open the microphone as an ADC and the sampler ticker.
//! 5. Build the HTTP voice service, the MP3 decoder and the speaker output.
//! 6. Create the [`tokio`] runtime and block on the cycle orchestrator, which
//!    never returns.

use std::sync::Arc;

use anyhow::{Context, Result};
use voice_relay::{
    audio::{CaptureController, MicrophoneAdc, ThreadTicker},
    config::{DeviceConfig, StoragePaths},
    pipeline::{new_shared_state, CycleOrchestrator},
    playback::{Mp3Codec, Player, SpeakerOutput},
    storage::{remove_stale, AssetStore, FsStore},
    transmit::{HttpVoiceService, Transmitter},
};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match DeviceConfig::builtin() {
        Ok(config) => config,
        Err(e) => {
            log::warn!("{e:#}, using defaults");
            DeviceConfig::default()
        }
    };

    // --- Storage ----------------------------------------------------------
    let paths = StoragePaths::resolve(config.storage.root.as_deref());
    let fs = FsStore::mount(&paths.flash_dir)
        .with_context(|| format!("failed to mount {}", paths.flash_dir.display()))?;
    log::info!("flash mounted at {}", fs.root().display());

    let store: Arc<dyn AssetStore> = Arc::new(fs);
    remove_stale(store.as_ref(), &config.storage.asset_name);

    // --- Capture ----------------------------------------------------------
    let state = new_shared_state();
    // The stream stops when the handle drops; keep it for the whole run.
    let (adc, _mic_stream) =
        MicrophoneAdc::open(config.capture.adc_max).context("failed to open microphone")?;
    let capture = CaptureController::new(
        &config.capture,
        Box::new(adc),
        Box::new(ThreadTicker::new()),
        Arc::clone(&state),
    );

    // --- Transfer / playback ----------------------------------------------
    let service = HttpVoiceService::from_config(&config.service);
    log::info!("voice service at {}", service.endpoint());

    let transmitter = Transmitter::new(
        &config.service,
        config.capture.sample_rate,
        Arc::new(service),
        Arc::clone(&store),
        config.storage.asset_name.clone(),
    );
    let player = Player::new(
        store,
        config.storage.asset_name.clone(),
        Arc::new(Mp3Codec),
        Arc::new(SpeakerOutput::new(config.playback.output_device.clone())),
        config.playback.gain,
    );

    let orchestrator =
        CycleOrchestrator::new(&config.capture, state, capture, transmitter, player);

    // --- Runtime ----------------------------------------------------------
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    log::info!(
        "voice relay up: {} Hz, {} s window",
        config.capture.sample_rate,
        config.capture.record_seconds
    );
    rt.block_on(orchestrator.run());

    Ok(())
}
