//! Wires the ALSA capture and playback devices from configuration.
//!
//! Uses std::thread (NOT tokio tasks) for real-time audio I/O to avoid
//! contention with async network tasks.

use std::sync::Arc;

use super::frame::{INPUT_SAMPLE_RATE, OUTPUT_SAMPLE_RATE};
use super::play::{AlsaPlayback, PlaybackDevice, UnavailablePlayback};
use super::record::{AlsaCapture, CaptureDevice};
use crate::config::Config;

/// Audio system configuration.
#[derive(Debug, Clone)]
pub struct AudioConfig {
    /// ALSA capture device name (e.g. "default", "plughw:0,0")
    pub capture_device: String,
    /// ALSA playback device name
    pub playback_device: String,
    /// Capture sample rate, also the rate of outbound frames
    pub input_sample_rate: u32,
    /// Playback sample rate, also the rate of inbound frames
    pub output_sample_rate: u32,
    /// Samples per capture chunk
    pub chunk_size: usize,
    /// Desired ALSA playback period size (0 = let ALSA decide)
    pub playback_period_size: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            capture_device: "default".to_string(),
            playback_device: "default".to_string(),
            input_sample_rate: INPUT_SAMPLE_RATE,
            output_sample_rate: OUTPUT_SAMPLE_RATE,
            chunk_size: 4096,
            playback_period_size: 1024,
        }
    }
}

impl From<&Config> for AudioConfig {
    fn from(config: &Config) -> Self {
        Self {
            capture_device: config.capture_device.clone(),
            playback_device: config.playback_device.clone(),
            input_sample_rate: config.input_sample_rate,
            output_sample_rate: config.output_sample_rate,
            chunk_size: config.chunk_size,
            playback_period_size: config.playback_period_size,
        }
    }
}

/// The speaker is opened eagerly so its clock runs for the whole process;
/// the microphone is only acquired when a live session starts.
///
/// A speaker that fails to open does not stop the process: it is replaced by
/// [`UnavailablePlayback`] and every voice session start reports the error.
pub struct AudioSystem {
    pub capture: Arc<dyn CaptureDevice>,
    pub playback: Arc<dyn PlaybackDevice>,
}

impl AudioSystem {
    pub fn start(config: AudioConfig) -> Self {
        log::info!(
            "AudioSystem starting: capture: \"{}\" @{}Hz, playback: \"{}\" @{}Hz, chunk: {}",
            config.capture_device,
            config.input_sample_rate,
            config.playback_device,
            config.output_sample_rate,
            config.chunk_size,
        );

        let period = (config.playback_period_size > 0).then_some(config.playback_period_size);
        let playback: Arc<dyn PlaybackDevice> =
            match AlsaPlayback::open(&config.playback_device, config.output_sample_rate, period) {
                Ok(playback) => Arc::new(playback),
                Err(e) => {
                    log::error!("Playback device unavailable, voice disabled: {}", e);
                    Arc::new(UnavailablePlayback::new(e))
                }
            };
        let capture = AlsaCapture::new(
            config.capture_device,
            config.input_sample_rate,
            config.chunk_size,
        );

        Self {
            capture: Arc::new(capture),
            playback,
        }
    }
}
