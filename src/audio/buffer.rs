//! Fixed-capacity linear buffer for one recording window of `i16` samples.
//!
//! Unlike a ring buffer, the sample buffer **saturates**: once `capacity`
//! samples have been pushed, further pushes are dropped until the buffer is
//! reset.  The sampler relies on this for back-pressure, since the periodic
//! trigger keeps firing until it is detached.
//!
//! # Example
//!
//! ```rust
//! use voice_relay::audio::SampleBuffer;
//!
//! let mut buf = SampleBuffer::new(2);
//! assert!(buf.push(10));
//! assert!(buf.push(-10));
//! assert!(!buf.push(99)); // full: dropped
//! assert_eq!(buf.filled(), &[10, -10]);
//! ```

use std::sync::{Arc, Mutex};

// ---------------------------------------------------------------------------
// SampleBuffer
// ---------------------------------------------------------------------------

/// Fixed-capacity store of signed 16-bit samples with a fill index.
///
/// Invariant: `0 <= len <= capacity`.  Writes only land while
/// `len < capacity`; the buffer is full iff `len == capacity`.
#[derive(Debug)]
pub struct SampleBuffer {
    samples: Box<[i16]>,
    /// Fill index: number of samples written since the last reset.
    len: usize,
}

impl SampleBuffer {
    /// Allocate a zeroed buffer with room for `capacity` samples.
    ///
    /// # Panics
    ///
    /// Panics if `capacity == 0`.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "SampleBuffer capacity must be > 0");
        Self {
            samples: vec![0; capacity].into_boxed_slice(),
            len: 0,
        }
    }

    /// Store `sample` at the fill index.
    ///
    /// Returns `false` (and stores nothing) when the buffer is already full.
    pub fn push(&mut self, sample: i16) -> bool {
        if self.is_full() {
            return false;
        }
        self.samples[self.len] = sample;
        self.len += 1;
        true
    }

    /// Move the fill index back to zero without touching stored samples.
    pub fn reset(&mut self) {
        self.len = 0;
    }

    /// Zero every slot and reset the fill index.
    pub fn clear(&mut self) {
        self.samples.fill(0);
        self.len = 0;
    }

    /// Samples written since the last reset, in capture order.
    pub fn filled(&self) -> &[i16] {
        &self.samples[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.samples.len()
    }

    pub fn is_full(&self) -> bool {
        self.len == self.samples.len()
    }

    /// Recorded duration in seconds at `sample_rate` Hz mono.
    pub fn duration_secs(&self, sample_rate: u32) -> f32 {
        if sample_rate == 0 {
            return 0.0;
        }
        self.len as f32 / sample_rate as f32
    }
}

// ---------------------------------------------------------------------------
// SharedSampleBuffer
// ---------------------------------------------------------------------------

/// Sample buffer shared between the sampler trigger and the dispatch loop.
///
/// The sampler is the only writer while a ticker is attached; the dispatch
/// loop reads or resets it only after the ticker has been detached.
pub type SharedSampleBuffer = Arc<Mutex<SampleBuffer>>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
