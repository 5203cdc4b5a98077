//! Microphone capture.
//!
//! The capture device pushes fixed-size mono `f32` chunks into a channel at
//! the pace of the audio hardware. The bridge never pulls.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use tokio::sync::mpsc;

use super::alsa_device;
use crate::error::BridgeError;

/// One capture callback's worth of samples in [-1.0, 1.0].
pub type CaptureChunk = Vec<f32>;

/// Source of microphone audio.
pub trait CaptureDevice: Send + Sync {
    /// Acquire the microphone and start pushing chunks into `chunk_tx`.
    ///
    /// Dropping `chunk_tx` (the stream ending on its own) means the device
    /// failed. A refused device must be reported as
    /// [`BridgeError::PermissionDenied`].
    fn open(&self, chunk_tx: mpsc::Sender<CaptureChunk>)
        -> Result<Box<dyn CaptureStream>, BridgeError>;
}

/// A running capture; `stop` releases the device.
pub trait CaptureStream: Send {
    fn stop(&mut self);
}

/// ALSA microphone producing `chunk_size` samples per chunk.
pub struct AlsaCapture {
    device: String,
    sample_rate: u32,
    chunk_size: usize,
}

impl AlsaCapture {
    pub fn new(device: impl Into<String>, sample_rate: u32, chunk_size: usize) -> Self {
        Self {
            device: device.into(),
            sample_rate,
            chunk_size,
        }
    }
}

impl CaptureDevice for AlsaCapture {
    fn open(
        &self,
        chunk_tx: mpsc::Sender<CaptureChunk>,
    ) -> Result<Box<dyn CaptureStream>, BridgeError> {
        if self.chunk_size == 0 {
            return Err(BridgeError::device("capture chunk size must be greater than 0"));
        }
        // Open on the caller's thread so a refused device fails Start synchronously.
        let (pcm, params) = alsa_device::open_capture(&self.device, self.sample_rate)?;
        let running = Arc::new(AtomicBool::new(true));
        let chunk_size = self.chunk_size;

        let handle = {
            let running = running.clone();
            thread::Builder::new()
                .name("audio-record".into())
                .spawn(move || {
                    if let Err(e) = record_thread(pcm, params, chunk_size, chunk_tx, &running) {
                        log::error!("Recording thread error: {}", e);
                    }
                })
                .map_err(|e| BridgeError::device(format!("spawn capture thread: {}", e)))?
        };

        Ok(Box::new(AlsaCaptureStream {
            running,
            handle: Some(handle),
        }))
    }
}

struct AlsaCaptureStream {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl CaptureStream for AlsaCaptureStream {
    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        // 录音线程最多再阻塞一个 period，detach 即可，PCM 在线程退出时释放
        if self.handle.take().is_some() {
            log::debug!("Capture stop requested");
        }
    }
}

impl Drop for AlsaCaptureStream {
    fn drop(&mut self) {
        self.stop();
    }
}

fn record_thread(
    pcm: alsa::PCM,
    params: alsa_device::AlsaParams,
    chunk_size: usize,
    chunk_tx: mpsc::Sender<CaptureChunk>,
    running: &AtomicBool,
) -> Result<(), BridgeError> {
    let io = pcm
        .io_f32()
        .map_err(|e| alsa_device::map_alsa_error("capture io", e))?;

    let mut read_buf = vec![0f32; params.period_size.max(1)];
    let mut accum_buf: Vec<f32> = Vec::with_capacity(chunk_size * 2);

    log::info!(
        "Recording started: rate={}, period={}, chunk={}",
        params.sample_rate,
        params.period_size,
        chunk_size,
    );

    while running.load(Ordering::Relaxed) {
        match io.readi(&mut read_buf) {
            Ok(frames) => {
                accum_buf.extend_from_slice(&read_buf[..frames]);

                while accum_buf.len() >= chunk_size {
                    let chunk: CaptureChunk = accum_buf.drain(..chunk_size).collect();
                    if !running.load(Ordering::Relaxed) {
                        break;
                    }
                    if chunk_tx.blocking_send(chunk).is_err() {
                        log::debug!("Capture receiver dropped");
                        return Ok(());
                    }
                }
            }
            Err(e) => {
                log::warn!("ALSA capture error: {}, recovering...", e);
                pcm.prepare()
                    .map_err(|e2| alsa_device::map_alsa_error("recover capture", e2))?;
            }
        }
    }

    log::info!("Recording stopped");
    Ok(())
}
