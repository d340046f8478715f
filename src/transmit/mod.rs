//! Outbound transfer: filled sample buffer → voice service → response asset.
//!
//! This module provides:
//! * [`VoiceService`]: async trait for one upload/reply exchange.
//! * [`HttpVoiceService`]: `reqwest` implementation POSTing raw PCM.
//! * [`Transmitter`]: retry/backoff loop that persists the reply.
//! * [`TransferError`] / [`AttemptError`]: failure taxonomy.

pub mod service;
pub mod transmitter;

// ---------------------------------------------------------------------------
// Public re-exports
// ---------------------------------------------------------------------------

pub use service::{
    AttemptError, HttpVoiceService, PcmFormat, PcmUpload, ReplyBody, ServiceReply, VoiceService,
};
pub use transmitter::{TransferError, TransferReceipt, Transmitter};

#[cfg(test)]
pub use service::{Scripted, ScriptedService};
