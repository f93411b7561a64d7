//! G.711 mu-law <-> 16-bit linear PCM conversion.
//!
//! Telephony delivers 8-bit mu-law samples; the voice agent speaks signed
//! 16-bit little-endian PCM at the same sample rate. Conversion is
//! sample-for-sample: no resampling, no buffering, no state between frames.
//!
//! The curve is the classic G.711 one (bias `0x84`, clip `32635`). Every
//! code word except `0x7F` survives a decode/encode round trip unchanged;
//! `0x7F` is the redundant negative zero and re-encodes as `0xFF`.

use crate::error::CodecError;

const BIAS: i32 = 0x84;
const CLIP: i32 = 32_635;
const SIGN_BIT: u8 = 0x80;
const SEGMENT_SHIFT: u8 = 4;
const SEGMENT_MASK: u8 = 0x70;
const QUANT_MASK: u8 = 0x0F;

/// Upper bound of each of the eight mu-law segments (biased magnitude).
const SEGMENT_ENDS: [i32; 8] = [0xFF, 0x1FF, 0x3FF, 0x7FF, 0xFFF, 0x1FFF, 0x3FFF, 0x7FFF];

/// Expands one mu-law code word to a linear sample.
pub fn ulaw_expand(code: u8) -> i16 {
    let code = !code;
    let mut magnitude = (i32::from(code & QUANT_MASK) << 3) + BIAS;
    magnitude <<= (code & SEGMENT_MASK) >> SEGMENT_SHIFT;

    let sample = if code & SIGN_BIT != 0 {
        BIAS - magnitude
    } else {
        magnitude - BIAS
    };
    // Largest magnitude is (15 << 3) + 0x84 shifted by 7, well inside i16.
    sample as i16
}

/// Compresses one linear sample to a mu-law code word.
pub fn ulaw_compress(sample: i16) -> u8 {
    let sample = i32::from(sample);
    let (magnitude, mask) = if sample < 0 {
        (-sample, 0x7F)
    } else {
        (sample, 0xFF)
    };
    let biased = magnitude.min(CLIP) + BIAS;

    let Some(segment) = SEGMENT_ENDS.iter().position(|&end| biased <= end) else {
        return 0x7F ^ mask;
    };
    let mantissa = (biased >> (segment + 3)) & i32::from(QUANT_MASK);
    (((segment as u8) << SEGMENT_SHIFT) | mantissa as u8) ^ mask
}

/// Decodes a telephony frame (mu-law) into little-endian 16-bit PCM.
///
/// The output carries the same number of samples, so it is exactly twice
/// as many bytes as the input.
pub fn decode_telephony_frame(mu_law: &[u8]) -> Result<Vec<u8>, CodecError> {
    if mu_law.is_empty() {
        return Err(CodecError::Empty);
    }

    let mut pcm = Vec::with_capacity(mu_law.len() * 2);
    for &code in mu_law {
        pcm.extend_from_slice(&ulaw_expand(code).to_le_bytes());
    }
    Ok(pcm)
}

/// Encodes an agent frame (little-endian 16-bit PCM) into mu-law.
///
/// Fails on odd-length input, which cannot hold whole samples.
pub fn encode_agent_frame(pcm: &[u8]) -> Result<Vec<u8>, CodecError> {
    if pcm.is_empty() {
        return Err(CodecError::Empty);
    }
    if pcm.len() % 2 != 0 {
        return Err(CodecError::OddLength(pcm.len()));
    }

    Ok(pcm
        .chunks_exact(2)
        .map(|pair| ulaw_compress(i16::from_le_bytes([pair[0], pair[1]])))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_decodes_to_zero() {
        assert_eq!(ulaw_expand(0xFF), 0);
        assert_eq!(ulaw_expand(0x7F), 0);
        assert_eq!(ulaw_compress(0), 0xFF);
    }

    #[test]
    fn extremes_map_to_outer_segments() {
        assert_eq!(ulaw_expand(0x80), 32_124);
        assert_eq!(ulaw_expand(0x00), -32_124);
        assert_eq!(ulaw_compress(i16::MAX), 0x80);
        assert_eq!(ulaw_compress(i16::MIN), 0x00);
    }

    #[test]
    fn compress_is_monotonic_in_magnitude() {
        let mut previous = ulaw_compress(0);
        for sample in (0..=i16::MAX).step_by(97) {
            let code = ulaw_compress(sample);
            // Positive codes count down from 0xFF toward 0x80 as loudness grows.
            assert!(code <= previous, "sample {} gave {:#x} after {:#x}", sample, code, previous);
            previous = code;
        }
    }

    #[test]
    fn decode_doubles_byte_length() {
        let pcm = decode_telephony_frame(&[0xFF; 160]).expect("decode should succeed");
        assert_eq!(pcm.len(), 320);
        assert!(pcm.iter().all(|&b| b == 0));
    }

    #[test]
    fn encode_rejects_odd_length() {
        assert_eq!(encode_agent_frame(&[0, 0, 0]), Err(CodecError::OddLength(3)));
    }

    #[test]
    fn empty_frames_are_rejected() {
        assert_eq!(decode_telephony_frame(&[]), Err(CodecError::Empty));
        assert_eq!(encode_agent_frame(&[]), Err(CodecError::Empty));
    }
}
