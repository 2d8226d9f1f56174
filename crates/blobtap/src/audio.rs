//! Audio sample buffers captured from the page and their content fingerprint.

use std::hash::Hasher;

use base64::Engine;
use byteorder::{ByteOrder, LittleEndian};
use fnv::FnvHasher;
use serde::{Deserialize, Serialize};

use crate::types::{CaptureError, CaptureResult};
use crate::wav::WavLayout;

/// Number of leading channel-0 samples that feed the fingerprint.
pub const FINGERPRINT_PREFIX: usize = 1000;

/// A multi-channel floating-point sample buffer.
///
/// Well-formed sets have `channels.len() == channel_count` and every
/// channel holds exactly `frame_count` samples. Use [`AudioSampleSet::validate`]
/// before trusting a set that came from the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioSampleSet {
    pub sample_rate: u32,
    pub frame_count: usize,
    pub channel_count: usize,
    pub channels: Vec<Vec<f32>>,
}

/// Identity of an audio buffer: shape plus a hash over a prefix of channel 0.
///
/// Distinct buffers with the same shape and the same leading samples collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AudioFingerprint {
    pub sample_rate: u32,
    pub frame_count: usize,
    pub channel_count: usize,
    pub prefix_hash: u64,
}

impl AudioSampleSet {
    /// Build a set from already-split channels.
    pub fn new(sample_rate: u32, channels: Vec<Vec<f32>>) -> Self {
        let frame_count = channels.first().map_or(0, Vec::len);
        Self {
            sample_rate,
            frame_count,
            channel_count: channels.len(),
            channels,
        }
    }

    /// Build a set from per-channel base64 strings of little-endian `f32`s,
    /// as delivered by page instrumentation.
    ///
    /// Declared counts are kept as given so that [`validate`](Self::validate)
    /// can reject a mismatched shape later.
    pub fn from_packed(
        sample_rate: u32,
        frame_count: usize,
        channel_count: usize,
        packed: &[String],
    ) -> CaptureResult<Self> {
        let mut channels = Vec::with_capacity(packed.len());
        for (index, encoded) in packed.iter().enumerate() {
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(encoded)
                .map_err(|e| CaptureError::InvalidSamples(format!("channel {index}: {e}")))?;
            if bytes.len() % 4 != 0 {
                return Err(CaptureError::InvalidSamples(format!(
                    "channel {index}: {} bytes is not a whole number of f32 samples",
                    bytes.len()
                )));
            }
            let mut samples = vec![0.0f32; bytes.len() / 4];
            LittleEndian::read_f32_into(&bytes, &mut samples);
            channels.push(samples);
        }
        Ok(Self {
            sample_rate,
            frame_count,
            channel_count,
            channels,
        })
    }

    /// Check the shape invariants.
    pub fn validate(&self) -> CaptureResult<()> {
        if self.sample_rate == 0 {
            return Err(CaptureError::ShapeViolation(
                "sample rate must be positive".to_string(),
            ));
        }
        if self.channel_count == 0 {
            return Err(CaptureError::ShapeViolation(
                "channel count must be positive".to_string(),
            ));
        }
        if self.channels.len() != self.channel_count {
            return Err(CaptureError::ShapeViolation(format!(
                "declared {} channels, got {}",
                self.channel_count,
                self.channels.len()
            )));
        }
        if let Some((index, channel)) = self
            .channels
            .iter()
            .enumerate()
            .find(|(_, c)| c.len() != self.frame_count)
        {
            return Err(CaptureError::ShapeViolation(format!(
                "channel {index} has {} frames, expected {}",
                channel.len(),
                self.frame_count
            )));
        }
        WavLayout::for_shape(self.sample_rate, self.frame_count, self.channel_count)?;
        Ok(())
    }

    /// Derive the dedup identity. Reads at most [`FINGERPRINT_PREFIX`] samples.
    pub fn fingerprint(&self) -> AudioFingerprint {
        let mut hasher = FnvHasher::default();
        if let Some(first) = self.channels.first() {
            for sample in first.iter().take(FINGERPRINT_PREFIX) {
                hasher.write_u32(sample.to_bits());
            }
        }
        AudioFingerprint {
            sample_rate: self.sample_rate,
            frame_count: self.frame_count,
            channel_count: self.channel_count,
            prefix_hash: hasher.finish(),
        }
    }
}
