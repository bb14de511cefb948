// Property-style tests for the PCM codec
//
// These pin down the wire contract: exact base64 round trips for every
// byte value, and float round trips within one quantization step.

use voicelink::audio::codec::{decode_base64, encode_base64, float_to_pcm16, pcm16_to_float};
use voicelink::session::AudioChunk;

#[test]
fn test_base64_round_trip_is_exact_for_all_byte_values() {
    // Every byte value, at several lengths to cover all padding cases
    for length in [1usize, 2, 3, 256, 1000] {
        let bytes: Vec<u8> = (0..length).map(|i| (i % 256) as u8).collect();
        let decoded = decode_base64(&encode_base64(&bytes)).unwrap();
        assert_eq!(decoded, bytes, "round trip failed for length {}", length);
    }
}

#[test]
fn test_pcm_round_trip_is_within_one_quantization_step() {
    // Sweep the full [-1, 1] range
    let samples: Vec<f32> = (0..=2000).map(|i| (i as f32 - 1000.0) / 1000.0).collect();

    let decoded = pcm16_to_float(&float_to_pcm16(&samples), 1);

    assert_eq!(decoded.len(), 1);
    assert_eq!(decoded[0].len(), samples.len());
    for (original, round_tripped) in samples.iter().zip(&decoded[0]) {
        assert!(
            (original - round_tripped).abs() <= 1.0 / 32768.0,
            "sample {} came back as {}",
            original,
            round_tripped
        );
    }
}

#[test]
fn test_pcm16_frame_count_follows_byte_length() {
    let bytes = vec![0u8; 4096 * 2];

    let mono = pcm16_to_float(&bytes, 1);
    assert_eq!(mono[0].len(), 4096);

    let stereo = pcm16_to_float(&bytes, 2);
    assert_eq!(stereo.len(), 2);
    assert_eq!(stereo[0].len(), 2048);
}

#[test]
fn test_chunk_wraps_one_capture_block() {
    let block = vec![0.25f32; 4096];

    let chunk = AudioChunk::from_pcm16(&float_to_pcm16(&block), 16_000);

    assert_eq!(chunk.sample_rate(), 16_000);
    let decoded = pcm16_to_float(&decode_base64(&chunk.data).unwrap(), 1);
    assert_eq!(decoded[0].len(), 4096);
    assert!((decoded[0][0] - 0.25).abs() <= 1.0 / 32768.0);
}
