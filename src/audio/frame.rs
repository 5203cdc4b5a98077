//! PCM16 audio frames exchanged with the live session.
//!
//! Capture delivers `f32` samples in [-1.0, 1.0]; the wire carries mono
//! 16-bit little-endian PCM, base64 encoded. Playback wants `f32` again.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;

use crate::error::BridgeError;

/// Sample rate of frames sent to the live endpoint.
pub const INPUT_SAMPLE_RATE: u32 = 16000;
/// Sample rate of frames received from the live endpoint.
pub const OUTPUT_SAMPLE_RATE: u32 = 24000;

/// Immutable mono PCM16 LE payload plus its sample rate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    data: Bytes,
    sample_rate: u32,
}

impl AudioFrame {
    pub fn new(data: Bytes, sample_rate: u32) -> Self {
        Self { data, sample_rate }
    }

    /// Scale captured float samples to PCM16 (`sample * 32768`, clamped).
    pub fn from_f32(samples: &[f32], sample_rate: u32) -> Self {
        let mut data = Vec::with_capacity(samples.len() * 2);
        for &s in samples {
            data.extend_from_slice(&f32_to_i16(s).to_le_bytes());
        }
        Self::new(Bytes::from(data), sample_rate)
    }

    /// Decode a base64 payload received from the transport.
    pub fn from_base64(encoded: &str, sample_rate: u32) -> Result<Self, BridgeError> {
        let data = STANDARD
            .decode(encoded.trim())
            .map_err(|e| BridgeError::decode(format!("base64: {}", e)))?;
        if data.len() % 2 != 0 {
            return Err(BridgeError::decode(format!(
                "odd PCM16 payload length {}",
                data.len()
            )));
        }
        Ok(Self::new(Bytes::from(data), sample_rate))
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.data)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn sample_count(&self) -> usize {
        self.data.len() / 2
    }

    /// Playback length in seconds.
    pub fn duration(&self) -> f64 {
        self.sample_count() as f64 / self.sample_rate as f64
    }

    /// MIME tag used for realtime input, e.g. `audio/pcm;rate=16000`.
    pub fn mime_type(&self) -> String {
        format!("audio/pcm;rate={}", self.sample_rate)
    }

    /// Inverse scaling to the playback device's float format (`int16 / 32768`).
    pub fn to_f32(&self) -> Vec<f32> {
        self.data
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]) as f32 / 32768.0)
            .collect()
    }
}

fn f32_to_i16(sample: f32) -> i16 {
    (sample * 32768.0).clamp(i16::MIN as f32, i16::MAX as f32) as i16
}
