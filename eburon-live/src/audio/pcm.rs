//! PCM16 wire codec for the realtime audio link.
//!
//! The remote endpoint consumes 16 kHz PCM16-LE microphone audio and produces
//! 24 kHz PCM16-LE model speech, both base64-encoded inside the message
//! envelope. Encoding clamps out-of-range samples instead of rejecting them.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::buffering::chunk::AudioChunk;
use crate::error::{LiveError, Result};

/// One encoded realtime media payload: base64 data plus its MIME tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedAudio {
    pub mime_type: String,
    pub data: String,
}

/// MIME tag for raw PCM16-LE at the given rate, e.g. `audio/pcm;rate=16000`.
pub fn pcm_mime_type(sample_rate: u32) -> String {
    format!("audio/pcm;rate={sample_rate}")
}

/// Encode mono f32 samples as base64 PCM16-LE tagged with the sample rate.
///
/// Samples outside [-1.0, 1.0] are clamped, never wrapped. The float-to-int
/// cast saturates, so full-scale 1.0 lands on `i16::MAX`.
pub fn encode_pcm16(samples: &[f32], sample_rate: u32) -> EncodedAudio {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &s in samples {
        let v = (s.clamp(-1.0, 1.0) * 32768.0) as i16;
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    EncodedAudio {
        mime_type: pcm_mime_type(sample_rate),
        data: BASE64.encode(bytes),
    }
}

/// Decode a base64 PCM16-LE payload into a mono chunk at the declared rate.
///
/// Empty input yields an empty chunk, not an error. A dangling trailing byte
/// is ignored.
pub fn decode_pcm16(data: &str, sample_rate: u32) -> Result<AudioChunk> {
    let bytes = BASE64
        .decode(data)
        .map_err(|e| LiveError::AudioDecode(e.to_string()))?;
    let mut samples = Vec::with_capacity(bytes.len() / 2);
    for pair in bytes.chunks_exact(2) {
        let v = i16::from_le_bytes([pair[0], pair[1]]);
        samples.push(f32::from(v) / 32768.0);
    }
    Ok(AudioChunk::new(samples, sample_rate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{PIPELINE_RATE_HZ, PLAYBACK_RATE_HZ};
    use approx::assert_abs_diff_eq;

    #[test]
    fn round_trip_stays_within_quantization_error() {
        let samples: Vec<f32> = (0..4096).map(|i| (i as f32 * 0.013).sin() * 0.9).collect();
        let encoded = encode_pcm16(&samples, PIPELINE_RATE_HZ);
        let decoded = decode_pcm16(&encoded.data, PIPELINE_RATE_HZ).unwrap();
        assert_eq!(decoded.samples.len(), samples.len());
        for (a, b) in samples.iter().zip(decoded.samples.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1.0 / 32768.0);
        }
    }

    #[test]
    fn full_scale_endpoints_round_trip() {
        let encoded = encode_pcm16(&[1.0, -1.0], PIPELINE_RATE_HZ);
        let decoded = decode_pcm16(&encoded.data, PIPELINE_RATE_HZ).unwrap();
        assert_abs_diff_eq!(decoded.samples[0], 1.0, epsilon = 1.0 / 32768.0);
        assert_abs_diff_eq!(decoded.samples[1], -1.0, epsilon = 1.0 / 32768.0);
    }

    #[test]
    fn out_of_range_samples_clamp_to_full_scale() {
        let hot = encode_pcm16(&[2.0, -2.0], PIPELINE_RATE_HZ);
        let full = encode_pcm16(&[1.0, -1.0], PIPELINE_RATE_HZ);
        assert_eq!(hot.data, full.data);
    }

    #[test]
    fn empty_input_yields_empty_chunk() {
        let encoded = encode_pcm16(&[], PIPELINE_RATE_HZ);
        assert_eq!(encoded.data, "");
        let decoded = decode_pcm16(&encoded.data, PLAYBACK_RATE_HZ).unwrap();
        assert!(decoded.is_empty());
    }

    #[test]
    fn mime_tag_embeds_sample_rate() {
        let encoded = encode_pcm16(&[0.0], PIPELINE_RATE_HZ);
        assert_eq!(encoded.mime_type, "audio/pcm;rate=16000");
        assert_eq!(pcm_mime_type(PLAYBACK_RATE_HZ), "audio/pcm;rate=24000");
    }

    #[test]
    fn malformed_base64_is_a_decode_error() {
        let err = decode_pcm16("!!definitely not base64!!", PLAYBACK_RATE_HZ);
        assert!(matches!(err, Err(LiveError::AudioDecode(_))));
    }

    #[test]
    fn decoded_chunk_reports_duration_at_declared_rate() {
        let encoded = encode_pcm16(&vec![0.25; 24_000], PLAYBACK_RATE_HZ);
        let decoded = decode_pcm16(&encoded.data, PLAYBACK_RATE_HZ).unwrap();
        assert_abs_diff_eq!(decoded.duration_secs(), 1.0, epsilon = 1e-9);
    }
}
