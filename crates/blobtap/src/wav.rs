//! PCM-to-container encoder: 16-bit little-endian RIFF/WAVE.

use std::io::{self, Write};

use byteorder::{LittleEndian, WriteBytesExt};

use crate::audio::AudioSampleSet;
use crate::types::{CaptureError, CaptureResult};

/// Size of the canonical RIFF/WAVE header.
pub const HEADER_SIZE: usize = 44;

/// Extension used for every encoded audio buffer.
pub const WAV_EXTENSION: &str = "wav";

/// Format label recorded for encoded audio buffers.
pub const WAV_MEDIA_TYPE: &str = "audio/wav";

const FORMAT_PCM: u16 = 1;
const BITS_PER_SAMPLE: u16 = 16;
const BYTES_PER_SAMPLE: u32 = 2;

/// Convert one float sample to a signed 16-bit value.
///
/// Clamps to [-1, 1], then scales negatives by 32768 and non-negatives by
/// 32767 so that +1.0 lands on `i16::MAX` without wrapping. Truncates toward
/// zero. NaN maps to 0.
pub fn sample_to_i16(sample: f32) -> i16 {
    let s = sample.clamp(-1.0, 1.0);
    if s < 0.0 {
        (s * 32768.0) as i16
    } else {
        (s * 32767.0) as i16
    }
}

/// Header fields derived from a buffer shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavLayout {
    pub channels: u16,
    pub sample_rate: u32,
    pub byte_rate: u32,
    pub block_align: u16,
    pub data_len: u32,
}

impl WavLayout {
    /// Compute the header fields, or report a shape the container cannot
    /// represent.
    pub fn for_shape(
        sample_rate: u32,
        frame_count: usize,
        channel_count: usize,
    ) -> CaptureResult<Self> {
        let too_large = |what: &str| {
            CaptureError::ShapeViolation(format!(
                "{what} does not fit a WAV header ({sample_rate} Hz, {frame_count} frames, {channel_count} channels)"
            ))
        };

        let channels = u16::try_from(channel_count).map_err(|_| too_large("channel count"))?;
        let block_align = channels
            .checked_mul(BYTES_PER_SAMPLE as u16)
            .ok_or_else(|| too_large("block alignment"))?;
        let byte_rate = sample_rate
            .checked_mul(u32::from(block_align))
            .ok_or_else(|| too_large("byte rate"))?;
        let data_len = u32::try_from(frame_count)
            .ok()
            .and_then(|frames| frames.checked_mul(u32::from(block_align)))
            .filter(|len| len.checked_add(36).is_some())
            .ok_or_else(|| too_large("data length"))?;

        Ok(Self {
            channels,
            sample_rate,
            byte_rate,
            block_align,
            data_len,
        })
    }
}

/// Encode a sample set as a complete WAV file.
///
/// Samples are interleaved frame-major, channel-minor. Missing samples in a
/// short channel are written as silence rather than read out of bounds.
pub fn encode_wav(set: &AudioSampleSet) -> CaptureResult<Vec<u8>> {
    let layout = WavLayout::for_shape(set.sample_rate, set.frame_count, set.channel_count)?;

    let mut buf = Vec::with_capacity(HEADER_SIZE + layout.data_len as usize);
    write_header(&mut buf, &layout)?;

    for frame in 0..set.frame_count {
        for channel in &set.channels {
            let value = channel.get(frame).copied().map_or(0, sample_to_i16);
            buf.write_i16::<LittleEndian>(value)?;
        }
    }
    Ok(buf)
}

fn write_header<W: Write>(out: &mut W, layout: &WavLayout) -> io::Result<()> {
    out.write_all(b"RIFF")?;
    out.write_u32::<LittleEndian>(36 + layout.data_len)?;
    out.write_all(b"WAVE")?;

    out.write_all(b"fmt ")?;
    out.write_u32::<LittleEndian>(16)?;
    out.write_u16::<LittleEndian>(FORMAT_PCM)?;
    out.write_u16::<LittleEndian>(layout.channels)?;
    out.write_u32::<LittleEndian>(layout.sample_rate)?;
    out.write_u32::<LittleEndian>(layout.byte_rate)?;
    out.write_u16::<LittleEndian>(layout.block_align)?;
    out.write_u16::<LittleEndian>(BITS_PER_SAMPLE)?;

    out.write_all(b"data")?;
    out.write_u32::<LittleEndian>(layout.data_len)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn le_u32(buf: &[u8], at: usize) -> u32 {
        u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
    }

    fn le_u16(buf: &[u8], at: usize) -> u16 {
        u16::from_le_bytes([buf[at], buf[at + 1]])
    }

    #[test]
    fn test_sample_conversion_rails() {
        assert_eq!(sample_to_i16(1.0), 32767);
        assert_eq!(sample_to_i16(-1.0), -32768);
        assert_eq!(sample_to_i16(0.0), 0);
        assert_eq!(sample_to_i16(2.5), 32767);
        assert_eq!(sample_to_i16(-7.0), -32768);
        assert_eq!(sample_to_i16(f32::NAN), 0);
    }

    #[test]
    fn test_sample_conversion_truncates_toward_zero() {
        // 0.5 * 32767 = 16383.5
        assert_eq!(sample_to_i16(0.5), 16383);
        // -0.5 * 32768 = -16384 exactly
        assert_eq!(sample_to_i16(-0.5), -16384);
        // -0.00002 * 32768 = -0.655..
        assert_eq!(sample_to_i16(-0.00002), 0);
    }

    #[test]
    fn test_empty_buffer_is_header_only() {
        let set = AudioSampleSet::new(44100, vec![Vec::new()]);
        let wav = encode_wav(&set).unwrap();
        assert_eq!(wav.len(), HEADER_SIZE);
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(le_u32(&wav, 4), 36);
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(le_u32(&wav, 40), 0);
    }

    #[test]
    fn test_header_fields_stereo() {
        let set = AudioSampleSet::new(48000, vec![vec![0.0; 10], vec![0.0; 10]]);
        let wav = encode_wav(&set).unwrap();
        assert_eq!(wav.len(), HEADER_SIZE + 10 * 2 * 2);
        assert_eq!(&wav[12..16], b"fmt ");
        assert_eq!(le_u32(&wav, 16), 16);
        assert_eq!(le_u16(&wav, 20), 1);
        assert_eq!(le_u16(&wav, 22), 2);
        assert_eq!(le_u32(&wav, 24), 48000);
        assert_eq!(le_u32(&wav, 28), 48000 * 2 * 2);
        assert_eq!(le_u16(&wav, 32), 4);
        assert_eq!(le_u16(&wav, 34), 16);
        assert_eq!(&wav[36..40], b"data");
        assert_eq!(le_u32(&wav, 4), 36 + 40);
        assert_eq!(le_u32(&wav, 40), 40);
    }

    #[test]
    fn test_interleaving_is_frame_major() {
        let set = AudioSampleSet::new(8000, vec![vec![1.0, 0.0], vec![-1.0, 0.5]]);
        let wav = encode_wav(&set).unwrap();
        let samples: Vec<i16> = wav[HEADER_SIZE..]
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();
        assert_eq!(samples, vec![32767, -32768, 0, 16383]);
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let set = AudioSampleSet::new(22050, vec![vec![0.3, -0.7, 0.99, -0.01]]);
        assert_eq!(encode_wav(&set).unwrap(), encode_wav(&set).unwrap());
    }

    #[test]
    fn test_layout_rejects_unrepresentable_shapes() {
        // byte rate overflows u32
        assert!(matches!(
            WavLayout::for_shape(3_000_000_000, 1, 1),
            Err(CaptureError::ShapeViolation(_))
        ));
        // channel count exceeds the 16-bit header field
        assert!(matches!(
            WavLayout::for_shape(44100, 0, 40_000),
            Err(CaptureError::ShapeViolation(_))
        ));
        // block alignment overflows u16
        assert!(WavLayout::for_shape(8000, 0, 32_768).is_err());
        // data length leaves no room for the RIFF size field
        assert!(WavLayout::for_shape(8000, (u32::MAX / 2) as usize, 1).is_err());
    }

    #[test]
    fn test_layout_at_limits() {
        let layout = WavLayout::for_shape(8000, 0, 32767).unwrap();
        assert_eq!(layout.block_align, 65534);
        let layout = WavLayout::for_shape(48000, 1000, 2).unwrap();
        assert_eq!(layout.byte_rate, 192_000);
        assert_eq!(layout.data_len, 4000);
    }

    #[test]
    fn test_oversized_shape_is_an_error_not_a_panic() {
        let set = AudioSampleSet {
            sample_rate: 3_000_000_000,
            frame_count: 1,
            channel_count: 1,
            channels: vec![vec![0.5]],
        };
        assert!(encode_wav(&set).is_err());
    }
}
