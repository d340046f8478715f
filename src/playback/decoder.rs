//! Streaming frame decoders for the response asset.
//!
//! [`FrameDecoder`] splits decoding into an initialisation step
//! ([`FrameDecoder::begin`], which must find the first frame and report the
//! stream format) and repeated single-frame steps.  [`Mp3Codec`] produces the
//! `minimp3`-backed implementation.

use thiserror::Error;

use crate::storage::AssetReader;

// ---------------------------------------------------------------------------
// StreamFormat / DecodeError
// ---------------------------------------------------------------------------

/// Format of decoded PCM frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

#[derive(Debug, Error)]
pub enum DecodeError {
    /// The source ended before a single frame could be decoded.
    #[error("no decodable audio frames in stream")]
    Empty,

    /// A frame header was found but its data was cut short.
    #[error("truncated frame")]
    Truncated,

    #[error("source read failed: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// FrameDecoder / DecoderFactory traits
// ---------------------------------------------------------------------------

/// A decoder bound to one source.
pub trait FrameDecoder {
    /// Locate the first frame and report the stream format.
    fn begin(&mut self) -> Result<StreamFormat, DecodeError>;

    /// Decode the next frame of interleaved PCM, or `None` at end of stream.
    fn next_frame(&mut self) -> Result<Option<Vec<i16>>, DecodeError>;
}

/// Builds a decoder for a freshly opened source.
pub trait DecoderFactory: Send + Sync {
    fn decoder(&self, source: AssetReader) -> Box<dyn FrameDecoder>;
}

// ---------------------------------------------------------------------------
// Mp3Codec / Mp3Decoder
// ---------------------------------------------------------------------------

/// MP3 decoding via `minimp3`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Mp3Codec;

impl DecoderFactory for Mp3Codec {
    fn decoder(&self, source: AssetReader) -> Box<dyn FrameDecoder> {
        Box::new(Mp3Decoder::new(source))
    }
}

pub struct Mp3Decoder {
    inner: minimp3::Decoder<AssetReader>,
    /// First frame, decoded by `begin` and handed out by the first step.
    pending: Option<Vec<i16>>,
}

impl Mp3Decoder {
    pub fn new(source: AssetReader) -> Self {
        Self {
            inner: minimp3::Decoder::new(source),
            pending: None,
        }
    }

    fn read_frame(&mut self) -> Result<Option<minimp3::Frame>, DecodeError> {
        loop {
            match self.inner.next_frame() {
                Ok(frame) => return Ok(Some(frame)),
                Err(minimp3::Error::Eof) => return Ok(None),
                // Junk between frames (ID3 tags, padding) is skipped.
                Err(minimp3::Error::SkippedData) => continue,
                Err(minimp3::Error::InsufficientData) => return Err(DecodeError::Truncated),
                Err(minimp3::Error::Io(e)) => return Err(DecodeError::Io(e)),
            }
        }
    }
}

impl FrameDecoder for Mp3Decoder {
    fn begin(&mut self) -> Result<StreamFormat, DecodeError> {
        let frame = self.read_frame()?.ok_or(DecodeError::Empty)?;
        let format = StreamFormat {
            sample_rate: u32::try_from(frame.sample_rate).unwrap_or(0),
            channels: u16::try_from(frame.channels).unwrap_or(1),
        };
        log::debug!(
            "mp3 stream: {} Hz, {} ch, {} kbps",
            format.sample_rate,
            format.channels,
            frame.bitrate
        );
        self.pending = Some(frame.data);
        Ok(format)
    }

    fn next_frame(&mut self) -> Result<Option<Vec<i16>>, DecodeError> {
        if let Some(first) = self.pending.take() {
            return Ok(Some(first));
        }
        Ok(self.read_frame()?.map(|frame| frame.data))
    }
}

// ---------------------------------------------------------------------------
// ScriptedCodec (test double)
// ---------------------------------------------------------------------------

/// How a scripted decoder behaves.
#[cfg(test)]
#[derive(Debug, Clone)]
pub struct ScriptedCodec {
    /// `false` makes `begin` fail.
    pub init_ok: bool,
    pub frames: Vec<Vec<i16>>,
    /// Fail with a decode error after the frames instead of ending cleanly.
    pub fail_after_frames: bool,
}

#[cfg(test)]
impl ScriptedCodec {
    pub fn clean(frames: usize) -> Self {
        Self {
            init_ok: true,
            frames: vec![vec![1_000; 4]; frames],
            fail_after_frames: false,
        }
    }
}

#[cfg(test)]
struct ScriptedDecoder {
    _source: AssetReader,
    script: ScriptedCodec,
    frames: std::collections::VecDeque<Vec<i16>>,
}

#[cfg(test)]
impl DecoderFactory for ScriptedCodec {
    fn decoder(&self, source: AssetReader) -> Box<dyn FrameDecoder> {
        Box::new(ScriptedDecoder {
            _source: source,
            script: self.clone(),
            frames: self.frames.iter().cloned().collect(),
        })
    }
}

#[cfg(test)]
impl FrameDecoder for ScriptedDecoder {
    fn begin(&mut self) -> Result<StreamFormat, DecodeError> {
        if !self.script.init_ok {
            return Err(DecodeError::Empty);
        }
        Ok(StreamFormat {
            sample_rate: 24_000,
            channels: 1,
        })
    }

    fn next_frame(&mut self) -> Result<Option<Vec<i16>>, DecodeError> {
        match self.frames.pop_front() {
            Some(frame) => Ok(Some(frame)),
            None if self.script.fail_after_frames => Err(DecodeError::Truncated),
            None => Ok(None),
        }
    }
}

/// `frames` silent MPEG-1 Layer III frames: 128 kbps, 44.1 kHz, mono, no
/// CRC, zeroed side info.  Each frame is 417 bytes and decodes to 1152
/// samples of silence.
#[cfg(test)]
pub fn silent_mp3(frames: usize) -> Vec<u8> {
    const HEADER: [u8; 4] = [0xFF, 0xFB, 0x90, 0xC4];
    const FRAME_BYTES: usize = 417;

    let mut out = Vec::with_capacity(frames * FRAME_BYTES);
    for _ in 0..frames {
        out.extend_from_slice(&HEADER);
        out.resize(out.len() + FRAME_BYTES - HEADER.len(), 0);
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
