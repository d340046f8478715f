//! Plays the stored response asset once, then deletes it.
//!
//! [`Player::play`] is blocking and is meant to run on a
//! `tokio::task::spawn_blocking` worker.  Whatever happens (clean end,
//! init failure, mid-stream failure) the asset is removed before `play`
//! returns and the sink is released.

use std::sync::Arc;

use thiserror::Error;

use super::decoder::{DecodeError, DecoderFactory};
use super::sink::{SinkError, SinkProvider};
use crate::storage::{AssetStore, StorageError};

// ---------------------------------------------------------------------------
// PlaybackError / PlaybackEnd
// ---------------------------------------------------------------------------

/// Playback could not start.  Nothing was rendered.
#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("response asset unavailable: {0}")]
    Source(#[from] StorageError),

    #[error("decoder initialisation failed: {0}")]
    DecoderInit(#[from] DecodeError),

    #[error("audio output unavailable: {0}")]
    SinkInit(#[from] SinkError),
}

/// Why a started playback stopped.
#[derive(Debug)]
pub enum PlaybackEnd {
    /// The decoder reported end of stream.
    Finished,
    /// A frame failed to decode; the rest of the asset was skipped.
    DecodeError(DecodeError),
    /// The output rejected a frame.
    Sink(SinkError),
}

impl PlaybackEnd {
    pub fn is_clean(&self) -> bool {
        matches!(self, PlaybackEnd::Finished)
    }
}

#[derive(Debug)]
pub struct PlaybackReport {
    pub end: PlaybackEnd,
    /// Frames handed to the sink.
    pub frames: usize,
}

// ---------------------------------------------------------------------------
// AssetGuard
// ---------------------------------------------------------------------------

/// Removes the asset when dropped.
struct AssetGuard<'a> {
    store: &'a dyn AssetStore,
    name: &'a str,
}

impl Drop for AssetGuard<'_> {
    fn drop(&mut self) {
        match self.store.remove(self.name) {
            Ok(()) => log::debug!("response asset {} removed", self.name),
            Err(StorageError::NotFound(_)) => {}
            Err(e) => log::warn!("could not remove response asset {}: {e}", self.name),
        }
    }
}

// ---------------------------------------------------------------------------
// Player
// ---------------------------------------------------------------------------

pub struct Player {
    store: Arc<dyn AssetStore>,
    asset_name: String,
    codec: Arc<dyn DecoderFactory>,
    output: Arc<dyn SinkProvider>,
    gain: f32,
}

impl Player {
    pub fn new(
        store: Arc<dyn AssetStore>,
        asset_name: impl Into<String>,
        codec: Arc<dyn DecoderFactory>,
        output: Arc<dyn SinkProvider>,
        gain: f32,
    ) -> Self {
        Self {
            store,
            asset_name: asset_name.into(),
            codec,
            output,
            gain,
        }
    }

    /// Decode the asset frame by frame to the output, then delete it.
    pub fn play(&self) -> Result<PlaybackReport, PlaybackError> {
        // Declared first so it drops last, after the decoder and the sink.
        let _guard = AssetGuard {
            store: self.store.as_ref(),
            name: &self.asset_name,
        };

        let source = self.store.open(&self.asset_name)?;
        let mut decoder = self.codec.decoder(source);
        let mut sink = self.output.open(self.gain)?;

        let format = decoder.begin()?;
        sink.configure(format)?;
        log::info!(
            "playing {} ({} Hz, {} ch)",
            self.asset_name,
            format.sample_rate,
            format.channels
        );

        let mut frames = 0;
        let end = loop {
            match decoder.next_frame() {
                Ok(Some(pcm)) => {
                    if let Err(e) = sink.write(&pcm) {
                        break PlaybackEnd::Sink(e);
                    }
                    frames += 1;
                }
                Ok(None) => break PlaybackEnd::Finished,
                Err(e) => break PlaybackEnd::DecodeError(e),
            }
        };

        sink.finish();

        match &end {
            PlaybackEnd::Finished => log::info!("playback finished ({frames} frames)"),
            PlaybackEnd::DecodeError(e) => {
                log::warn!("playback stopped after {frames} frames: {e}")
            }
            PlaybackEnd::Sink(e) => log::warn!("playback stopped after {frames} frames: {e}"),
        }

        Ok(PlaybackReport { end, frames })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
