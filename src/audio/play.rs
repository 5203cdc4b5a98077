//! Scheduled playback on a shared output clock.
//!
//! The output clock counts audio frames handed to the device since it was
//! opened. Buffers are placed on that timeline at an absolute start time and
//! mixed in by a dedicated playback thread; silence is written in between so
//! the clock keeps running in real time.

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use tokio::sync::mpsc;

use super::alsa_device;
use crate::error::BridgeError;

pub type PlaybackId = u64;

/// Float samples ready for the output device.
#[derive(Debug, Clone)]
pub struct PlaybackBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl PlaybackBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self { samples, sample_rate }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Length in seconds.
    pub fn duration(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Output device that starts buffers at exact times on its own clock.
pub trait PlaybackDevice: Send + Sync {
    /// Current output clock time in seconds.
    fn now(&self) -> f64;

    /// Whether buffers can be scheduled at all.
    fn check(&self) -> Result<(), BridgeError> {
        Ok(())
    }

    /// Schedule `buffer` to begin at `start_at` seconds, or at the current
    /// clock if that has already passed. Returns the id and the start time
    /// actually used. When it has played to the end its id is sent on
    /// `ended`; halted buffers are never reported.
    fn schedule(
        &self,
        buffer: PlaybackBuffer,
        start_at: f64,
        ended: mpsc::UnboundedSender<PlaybackId>,
    ) -> Result<(PlaybackId, f64), BridgeError>;

    /// Stop a scheduled or playing buffer immediately. Unknown ids are ignored.
    fn halt(&self, id: PlaybackId);
}

struct Voice {
    id: PlaybackId,
    start_frame: u64,
    buffer: PlaybackBuffer,
    ended: mpsc::UnboundedSender<PlaybackId>,
}

impl Voice {
    /// Number of device frames this voice spans.
    fn frames(&self, device_rate: u32) -> u64 {
        (self.buffer.duration() * device_rate as f64).round() as u64
    }

    fn sample_at(&self, frame: u64, device_rate: u32) -> f32 {
        if frame < self.start_frame {
            return 0.0;
        }
        let offset = frame - self.start_frame;
        let idx = if self.buffer.sample_rate == device_rate {
            offset as usize
        } else {
            (offset * self.buffer.sample_rate as u64 / device_rate as u64) as usize
        };
        self.buffer.samples.get(idx).copied().unwrap_or(0.0)
    }
}

struct Timeline {
    device_rate: u32,
    rendered_frames: u64,
    next_id: PlaybackId,
    voices: Vec<Voice>,
    failure: Option<String>,
}

impl Timeline {
    fn new(device_rate: u32) -> Self {
        Self {
            device_rate,
            rendered_frames: 0,
            next_id: 1,
            voices: Vec::new(),
            failure: None,
        }
    }

    fn now(&self) -> f64 {
        self.rendered_frames as f64 / self.device_rate as f64
    }

    fn insert(
        &mut self,
        buffer: PlaybackBuffer,
        start_at: f64,
        ended: mpsc::UnboundedSender<PlaybackId>,
    ) -> Result<(PlaybackId, f64), BridgeError> {
        self.check()?;
        let id = self.next_id;
        self.next_id += 1;
        let requested = (start_at.max(0.0) * self.device_rate as f64).round() as u64;
        let start_frame = requested.max(self.rendered_frames);
        self.voices.push(Voice {
            id,
            start_frame,
            buffer,
            ended,
        });
        Ok((id, start_frame as f64 / self.device_rate as f64))
    }

    fn check(&self) -> Result<(), BridgeError> {
        match &self.failure {
            Some(reason) => Err(BridgeError::device(format!("playback unavailable: {}", reason))),
            None => Ok(()),
        }
    }

    fn remove(&mut self, id: PlaybackId) {
        self.voices.retain(|v| v.id != id);
    }

    /// Mix the next `out.len()` frames and advance the clock. Voices that have
    /// fully played are dropped and reported.
    fn render(&mut self, out: &mut [f32]) {
        let base = self.rendered_frames;
        let rate = self.device_rate;
        for (i, slot) in out.iter_mut().enumerate() {
            let frame = base + i as u64;
            let mixed: f32 = self.voices.iter().map(|v| v.sample_at(frame, rate)).sum();
            *slot = mixed.clamp(-1.0, 1.0);
        }
        self.rendered_frames += out.len() as u64;

        let now = self.rendered_frames;
        self.voices.retain(|v| {
            if v.start_frame + v.frames(rate) <= now {
                let _ = v.ended.send(v.id);
                false
            } else {
                true
            }
        });
    }
}

/// ALSA speaker driven by a mixing thread.
pub struct AlsaPlayback {
    timeline: Arc<Mutex<Timeline>>,
    running: Arc<AtomicBool>,
}

impl AlsaPlayback {
    /// Open the device and start the clock.
    pub fn open(
        device: &str,
        sample_rate: u32,
        period_size: Option<usize>,
    ) -> Result<Self, BridgeError> {
        let (pcm, params) = alsa_device::open_playback(device, sample_rate, period_size)?;
        let timeline = Arc::new(Mutex::new(Timeline::new(params.sample_rate)));
        let running = Arc::new(AtomicBool::new(true));

        {
            let timeline = timeline.clone();
            let running = running.clone();
            thread::Builder::new()
                .name("audio-play".into())
                .spawn(move || {
                    if let Err(e) = play_thread(pcm, params, &timeline, &running) {
                        log::error!("Playback thread error: {}", e);
                        timeline.lock().failure = Some(e.to_string());
                    }
                })
                .map_err(|e| BridgeError::device(format!("spawn playback thread: {}", e)))?;
        }

        Ok(Self { timeline, running })
    }
}

impl PlaybackDevice for AlsaPlayback {
    fn now(&self) -> f64 {
        self.timeline.lock().now()
    }

    fn schedule(
        &self,
        buffer: PlaybackBuffer,
        start_at: f64,
        ended: mpsc::UnboundedSender<PlaybackId>,
    ) -> Result<(PlaybackId, f64), BridgeError> {
        self.timeline.lock().insert(buffer, start_at, ended)
    }

    fn check(&self) -> Result<(), BridgeError> {
        self.timeline.lock().check()
    }

    fn halt(&self, id: PlaybackId) {
        self.timeline.lock().remove(id);
    }
}

impl Drop for AlsaPlayback {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

/// Stand-in for a speaker that could not be opened. Every session start is
/// refused with the original error; nothing else in the process is affected.
pub struct UnavailablePlayback {
    reason: BridgeError,
}

impl UnavailablePlayback {
    pub fn new(reason: BridgeError) -> Self {
        Self { reason }
    }
}

impl PlaybackDevice for UnavailablePlayback {
    fn now(&self) -> f64 {
        0.0
    }

    fn check(&self) -> Result<(), BridgeError> {
        Err(self.reason.clone())
    }

    fn schedule(
        &self,
        _buffer: PlaybackBuffer,
        _start_at: f64,
        _ended: mpsc::UnboundedSender<PlaybackId>,
    ) -> Result<(PlaybackId, f64), BridgeError> {
        Err(self.reason.clone())
    }

    fn halt(&self, _id: PlaybackId) {}
}

fn play_thread(
    pcm: alsa::PCM,
    params: alsa_device::AlsaParams,
    timeline: &Mutex<Timeline>,
    running: &AtomicBool,
) -> Result<(), BridgeError> {
    let io = pcm
        .io_f32()
        .map_err(|e| alsa_device::map_alsa_error("playback io", e))?;
    let mut period = vec![0f32; params.period_size.max(1)];

    log::info!(
        "Playback started: rate={}, period={}",
        params.sample_rate,
        params.period_size,
    );

    while running.load(Ordering::Relaxed) {
        timeline.lock().render(&mut period);

        // Write with retry loop to handle short writes and XRUN recovery.
        let mut frames_written = 0;
        let mut retry_count = 0u32;
        while frames_written < period.len() {
            match io.writei(&period[frames_written..]) {
                Ok(n) => {
                    frames_written += n;
                    retry_count = 0;
                }
                Err(e) => {
                    log::warn!("ALSA XRUN or error: {}, recovering...", e);
                    retry_count += 1;
                    pcm.prepare()
                        .map_err(|e2| alsa_device::map_alsa_error("recover playback", e2))?;

                    // 底层持续跟不上写入速度时，丢弃剩余帧防止死循环
                    if retry_count >= 3 {
                        log::error!(
                            "Max recovery retries ({}) reached. Dropping {} unwritten frames.",
                            retry_count,
                            period.len() - frames_written
                        );
                        break;
                    }
                }
            }
        }
    }

    log::info!("Playback stopped");
    Ok(())
}
