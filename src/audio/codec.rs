// PCM and wire-encoding conversions for the streaming pipeline
//
// The capture side packs f32 microphone blocks into little-endian 16-bit
// PCM and base64 for the session transport; the playback side reverses the
// trip for synthesized audio chunks. Everything here is pure and runs
// without an audio device.

use base64::Engine;

use crate::error::{Error, Result};

/// Convert f32 samples in [-1.0, 1.0] to little-endian 16-bit PCM bytes.
///
/// Samples are scaled by 32768 and cast, so +1.0 lands on 32767 while -1.0
/// lands on -32768 (the cast saturates out-of-range input). The decode path
/// divides by 32768.0, which leaves a one-quantization-step asymmetry at the
/// positive rail; callers are expected to stay inside [-1, 1].
pub fn float_to_pcm16(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let value = (sample * 32768.0) as i16;
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Convert little-endian 16-bit PCM bytes back to f32 samples, de-interleaved
/// per channel.
///
/// Returns one `Vec<f32>` per channel with `bytes.len() / 2 / channels`
/// samples each. A trailing odd byte is ignored.
pub fn pcm16_to_float(bytes: &[u8], channels: usize) -> Vec<Vec<f32>> {
    if channels == 0 {
        return Vec::new();
    }

    let frame_count = bytes.len() / 2 / channels;
    let mut deinterleaved = vec![Vec::with_capacity(frame_count); channels];

    for frame in 0..frame_count {
        for (ch, channel_samples) in deinterleaved.iter_mut().enumerate() {
            let offset = (frame * channels + ch) * 2;
            let value = i16::from_le_bytes([bytes[offset], bytes[offset + 1]]);
            channel_samples.push(value as f32 / 32768.0);
        }
    }

    deinterleaved
}

/// Encode raw bytes as standard-alphabet base64 for the session transport.
pub fn encode_base64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Decode standard-alphabet base64 back to raw bytes.
pub fn decode_base64(text: &str) -> Result<Vec<u8>> {
    base64::engine::general_purpose::STANDARD
        .decode(text)
        .map_err(|e| Error::Session(format!("invalid base64 audio payload: {}", e)))
}
