//! Channel mixing and rate conversion for the speaker path.
//!
//! Decoded response frames arrive at the encoder's rate (commonly 24 kHz
//! mono or stereo) while the output device runs at its own native rate.
//! The speaker sink converts each frame with:
//!
//! 1. [`downmix_to_mono`]: average interleaved channels.
//! 2. [`LinearResampler`]: linear interpolation from the source rate to the
//!    device rate, continuous across frames.

// ---------------------------------------------------------------------------
// downmix_to_mono
// ---------------------------------------------------------------------------

/// Mix interleaved multi-channel audio down to mono by averaging all channels.
///
/// * `channels == 1` returns the input unchanged.
/// * `channels == 0` returns an empty vector.
///
/// ```rust
/// use voice_relay::audio::downmix_to_mono;
///
/// let stereo = vec![0.5_f32, -0.5, 0.2, 0.4]; // L R L R
/// let mono = downmix_to_mono(&stereo, 2);
/// assert_eq!(mono.len(), 2);
/// assert!((mono[0] - 0.0).abs() < 1e-6);
/// assert!((mono[1] - 0.3).abs() < 1e-6);
/// ```
pub fn downmix_to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => samples.to_vec(),
        n => {
            let n = n as usize;
            samples
                .chunks_exact(n)
                .map(|frame| frame.iter().sum::<f32>() / n as f32)
                .collect()
        }
    }
}

// ---------------------------------------------------------------------------
// LinearResampler
// ---------------------------------------------------------------------------

/// Streaming linear-interpolation resampler for mono audio.
///
/// Input arrives in blocks (one decoded frame at a time).  The read position
/// and the last input sample carry over between blocks, so the first output
/// of a block interpolates from the previous block's tail instead of
/// restarting at a block edge.  The final input sample of each block is
/// emitted with the next one.
///
/// ```rust
/// use voice_relay::audio::LinearResampler;
///
/// let mut rs = LinearResampler::new(24_000, 48_000);
/// let first = rs.process(&[0.0, 1.0]);
/// assert_eq!(first, vec![0.0, 0.5]);
/// let second = rs.process(&[2.0]);
/// assert_eq!(second, vec![1.0, 1.5]);
/// ```
#[derive(Debug, Clone)]
pub struct LinearResampler {
    /// Input samples advanced per output sample.
    step: f64,
    /// Read position relative to the start of the next block.  Values in
    /// `-1.0..0.0` fall between `last` and the block's first sample.
    pos: f64,
    last: Option<f32>,
}

impl LinearResampler {
    /// A zero rate on either side degrades to pass-through.
    pub fn new(source_rate: u32, target_rate: u32) -> Self {
        let step = if source_rate == 0 || target_rate == 0 {
            1.0
        } else {
            f64::from(source_rate) / f64::from(target_rate)
        };
        Self {
            step,
            pos: 0.0,
            last: None,
        }
    }

    /// Resample the next block of the stream.
    pub fn process(&mut self, input: &[f32]) -> Vec<f32> {
        let Some(&tail) = input.last() else {
            return Vec::new();
        };

        let len = input.len();
        let last = self.last.unwrap_or(input[0]);
        let last_index = (len - 1) as f64;
        let mut pos = self.pos;
        let mut out = Vec::with_capacity((len as f64 / self.step).ceil() as usize + 1);

        while pos < last_index {
            let base = pos.floor();
            let frac = (pos - base) as f32;
            let idx = base as isize;
            let a = if idx < 0 { last } else { input[idx as usize] };
            let b = input[(idx + 1) as usize];
            out.push(a + (b - a) * frac);
            pos += self.step;
        }

        self.pos = pos - len as f64;
        self.last = Some(tail);
        out
    }
}

/// Convert signed 16-bit PCM to `f32` in `[-1.0, 1.0)`.
pub fn pcm_to_f32(pcm: &[i16]) -> Vec<f32> {
    pcm.iter().map(|&s| f32::from(s) / 32_768.0).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downmix_already_mono() {
        let input = vec![0.1_f32, 0.2, 0.3];
        assert_eq!(downmix_to_mono(&input, 1), input);
    }

    #[test]
    fn downmix_two_channel() {
        let out = downmix_to_mono(&[1.0_f32, -1.0, 0.5, 0.5], 2);
        assert_eq!(out.len(), 2);
        assert!((out[0] - 0.0).abs() < 1e-6);
        assert!((out[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn downmix_zero_channels() {
        assert!(downmix_to_mono(&[1.0_f32, 2.0], 0).is_empty());
    }

    #[test]
    fn same_rate_passes_samples_through_one_behind() {
        let mut rs = LinearResampler::new(24_000, 24_000);
        assert_eq!(rs.process(&[1.0, 2.0, 3.0]), vec![1.0, 2.0]);
        assert_eq!(rs.process(&[4.0, 5.0]), vec![3.0, 4.0]);
    }

    #[test]
    fn empty_block_leaves_state_untouched() {
        let mut rs = LinearResampler::new(24_000, 48_000);
        assert_eq!(rs.process(&[0.0, 1.0]), vec![0.0, 0.5]);
        assert!(rs.process(&[]).is_empty());
        assert_eq!(rs.process(&[2.0]), vec![1.0, 1.5]);
    }

    #[test]
    fn blocks_join_without_a_seam() {
        let ramp: Vec<f32> = (0..2304).map(|i| i as f32 / 2304.0).collect();

        let whole = LinearResampler::new(24_000, 48_000).process(&ramp);

        let mut rs = LinearResampler::new(24_000, 48_000);
        let mut split = rs.process(&ramp[..1152]);
        split.extend(rs.process(&ramp[1152..]));

        assert_eq!(whole.len(), split.len());
        for (a, b) in whole.iter().zip(&split) {
            assert!((a - b).abs() < 1e-5, "seam mismatch: {a} vs {b}");
        }
    }

    #[test]
    fn downsampling_keeps_the_long_run_ratio() {
        let mut rs = LinearResampler::new(48_000, 16_000);
        let total: usize = (0..100).map(|_| rs.process(&[0.5_f32; 480]).len()).sum();
        assert!((15_999..=16_000).contains(&total), "got {total}");
    }

    #[test]
    fn constant_signal_preserves_amplitude() {
        let mut rs = LinearResampler::new(44_100, 48_000);
        for _ in 0..4 {
            for s in rs.process(&[0.25_f32; 441]) {
                assert!((s - 0.25).abs() < 1e-5, "amplitude drift: {s}");
            }
        }
    }

    #[test]
    fn pcm_conversion_scales_to_unit_range() {
        let out = pcm_to_f32(&[0, 16_384, -32_768]);
        assert_eq!(out, vec![0.0, 0.5, -1.0]);
    }
}
