//! Voice relay device: record a fixed window from the microphone, send it to
//! a voice service, play the MP3 reply, repeat.

pub mod audio;
pub mod config;
pub mod pipeline;
pub mod playback;
pub mod storage;
pub mod transmit;
