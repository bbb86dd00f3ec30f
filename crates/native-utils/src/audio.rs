use base64::Engine;
use ringbuf::HeapRb;
use rubato::{FastFixedIn, PolynomialDegree};

/// Sample rate of the realtime channel's `audio/pcm` format.
pub const REALTIME_API_PCM16_SAMPLE_RATE: f64 = 24000.0;

/// Creates a resampler to convert between audio sample rates.
pub fn create_resampler(
    in_sampling_rate: f64,
    out_sampling_rate: f64,
    chunk_size: usize,
) -> anyhow::Result<FastFixedIn<f32>> {
    let resampler = FastFixedIn::<f32>::new(
        out_sampling_rate / in_sampling_rate,
        1.0,
        PolynomialDegree::Cubic,
        chunk_size,
        1,
    )?;
    Ok(resampler)
}

/// Splits a slice of audio samples into fixed-size chunks, zero-padding the last one.
pub fn split_for_chunks(samples: &[f32], chunk_size: usize) -> Vec<Vec<f32>> {
    samples
        .chunks(chunk_size)
        .map(|chunk| {
            let mut chunk = chunk.to_vec();
            chunk.resize(chunk_size, 0.0);
            chunk
        })
        .collect()
}

/// Downmixes interleaved frames to mono by averaging channels.
pub fn downmix(data: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return data.to_vec();
    }
    data.chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Creates a new ring buffer on the heap for shared audio data.
pub fn shared_buffer(size: usize) -> HeapRb<f32> {
    HeapRb::new(size)
}

/// Decodes a base64 string representing PCM16 audio into f32 samples in [-1.0, 1.0].
pub fn decode(base64_fragment: &str) -> Vec<f32> {
    match base64::engine::general_purpose::STANDARD.decode(base64_fragment) {
        Ok(pcm16) => pcm16
            .chunks_exact(2)
            .map(|chunk| {
                let v = i16::from_le_bytes([chunk[0], chunk[1]]);
                (v as f32 / 32768.0).clamp(-1.0, 1.0)
            })
            .collect(),
        Err(e) => {
            tracing::error!("Failed to decode base64 fragment: {}", e);
            Vec::new()
        }
    }
}

/// Encodes f32 samples as little-endian PCM16, base64 encoded.
pub fn encode(pcm32: &[f32]) -> String {
    let pcm16: Vec<u8> = pcm32.to_binary();
    base64::engine::general_purpose::STANDARD.encode(&pcm16)
}

/// A trait for converting audio sample types to a binary representation (Vec<u8>).
pub trait ToBinary {
    fn to_binary(&self) -> Vec<u8>;
}

impl ToBinary for [f32] {
    fn to_binary(&self) -> Vec<u8> {
        self.iter()
            .flat_map(|&sample| {
                let v = (sample * 32768.0).clamp(i16::MIN as f32, i16::MAX as f32) as i16;
                v.to_le_bytes()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_clamps_out_of_range_samples() {
        let encoded = encode(&[2.0, -2.0]);
        let decoded = decode(&encoded);
        assert_eq!(decoded.len(), 2);
        assert!((decoded[0] - (i16::MAX as f32 / 32768.0)).abs() < f32::EPSILON);
        assert_eq!(decoded[1], -1.0);
    }

    #[test]
    fn test_decode_rejects_invalid_base64() {
        assert!(decode("not base64!").is_empty());
    }

    #[test]
    fn test_split_for_chunks_pads_tail() {
        let chunks = split_for_chunks(&[0.1, 0.2, 0.3], 2);
        assert_eq!(chunks, vec![vec![0.1, 0.2], vec![0.3, 0.0]]);
    }

    #[test]
    fn test_downmix_averages_stereo_frames() {
        assert_eq!(downmix(&[0.25, 0.75, -1.0, 1.0], 2), vec![0.5, 0.0]);
        assert_eq!(downmix(&[0.5], 1), vec![0.5]);
    }
}
