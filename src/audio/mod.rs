//! audio - Microphone capture, scheduled playback and PCM16 framing
//!
//! Uses ALSA for audio I/O. Capture and playback each run on their own OS
//! thread; the live bridge only sees the `CaptureDevice` / `PlaybackDevice`
//! seams.

mod alsa_device;
mod audio_system;
pub mod frame;
pub mod play;
pub mod record;

pub use audio_system::{AudioConfig, AudioSystem};
pub use frame::{AudioFrame, INPUT_SAMPLE_RATE, OUTPUT_SAMPLE_RATE};
pub use play::{AlsaPlayback, PlaybackBuffer, PlaybackDevice, PlaybackId, UnavailablePlayback};
pub use record::{AlsaCapture, CaptureChunk, CaptureDevice, CaptureStream};
