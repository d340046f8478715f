//! Response playback: decode the stored asset to the speaker, then delete it.
//!
//! * [`FrameDecoder`] / [`DecoderFactory`]: step-wise decoding; [`Mp3Codec`]
//!   is the `minimp3` implementation.
//! * [`AudioSink`] / [`SinkProvider`]: output device; [`SpeakerOutput`] is
//!   the `cpal` implementation.
//! * [`Player`]: drives one playback and guarantees the asset is removed.

pub mod decoder;
pub mod player;
pub mod sink;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use decoder::{DecodeError, DecoderFactory, FrameDecoder, Mp3Codec, Mp3Decoder, StreamFormat};
pub use player::{PlaybackEnd, PlaybackError, PlaybackReport, Player};
pub use sink::{
    AudioSink, FrameConverter, SinkError, SinkProvider, SpeakerOutput, SpeakerSink, LOOKAHEAD_SECS,
};

#[cfg(test)]
pub use decoder::ScriptedCodec;
#[cfg(test)]
pub use sink::{RecordingOutput, SinkLog};
