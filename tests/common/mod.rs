//! In-memory stand-ins for the microphone, the speaker and the live session.
#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{Notify, mpsc};

use ihara_assistant::audio::{
    AudioFrame, CaptureChunk, CaptureDevice, CaptureStream, PlaybackBuffer, PlaybackDevice,
    PlaybackId,
};
use ihara_assistant::audio_bridge::{BridgeConfig, BridgeNotice, LiveAudioBridge};
use ihara_assistant::error::BridgeError;
use ihara_assistant::net_link::{
    LiveConnection, LiveConnector, LiveSetup, LiveTransport, SessionEvent,
};

#[derive(Default)]
pub struct FakeCapture {
    pub deny: AtomicBool,
    pub opens: AtomicUsize,
    pub stops: Arc<AtomicUsize>,
    sender: Arc<Mutex<Option<mpsc::Sender<CaptureChunk>>>>,
}

impl FakeCapture {
    /// Deliver one chunk as if the microphone produced it.
    pub fn push(&self, chunk: CaptureChunk) {
        let tx = self.sender.lock().clone().expect("microphone not open");
        tx.try_send(chunk).expect("capture queue full");
    }

    /// Simulate the device disappearing.
    pub fn drop_sender(&self) {
        self.sender.lock().take();
    }
}

struct FakeCaptureStream {
    stops: Arc<AtomicUsize>,
    sender: Arc<Mutex<Option<mpsc::Sender<CaptureChunk>>>>,
    stopped: bool,
}

impl CaptureStream for FakeCaptureStream {
    fn stop(&mut self) {
        if !self.stopped {
            self.stopped = true;
            self.sender.lock().take();
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl CaptureDevice for FakeCapture {
    fn open(
        &self,
        chunk_tx: mpsc::Sender<CaptureChunk>,
    ) -> Result<Box<dyn CaptureStream>, BridgeError> {
        if self.deny.load(Ordering::SeqCst) {
            return Err(BridgeError::PermissionDenied("capture refused".into()));
        }
        self.opens.fetch_add(1, Ordering::SeqCst);
        *self.sender.lock() = Some(chunk_tx);
        Ok(Box::new(FakeCaptureStream {
            stops: self.stops.clone(),
            sender: self.sender.clone(),
            stopped: false,
        }))
    }
}

#[derive(Default)]
pub struct FakePlayback {
    pub now: Mutex<f64>,
    /// Speaker missing: `check` and `schedule` fail.
    pub unavailable: AtomicBool,
    /// Speaker broke mid-session: only `schedule` fails.
    pub fail_schedule: AtomicBool,
    next_id: AtomicU64,
    /// (id, start, duration) in scheduling order.
    pub scheduled: Mutex<Vec<(PlaybackId, f64, f64)>>,
    pub halted: Mutex<Vec<PlaybackId>>,
    ended: Mutex<HashMap<PlaybackId, mpsc::UnboundedSender<PlaybackId>>>,
}

impl FakePlayback {
    pub fn starts(&self) -> Vec<f64> {
        self.scheduled.lock().iter().map(|s| s.1).collect()
    }

    pub fn ids(&self) -> Vec<PlaybackId> {
        self.scheduled.lock().iter().map(|s| s.0).collect()
    }

    /// Report `id` as played to the end.
    pub fn finish(&self, id: PlaybackId) {
        if let Some(tx) = self.ended.lock().remove(&id) {
            let _ = tx.send(id);
        }
    }
}

impl PlaybackDevice for FakePlayback {
    fn now(&self) -> f64 {
        *self.now.lock()
    }

    fn schedule(
        &self,
        buffer: PlaybackBuffer,
        start_at: f64,
        ended: mpsc::UnboundedSender<PlaybackId>,
    ) -> Result<(PlaybackId, f64), BridgeError> {
        self.check()?;
        if self.fail_schedule.load(Ordering::SeqCst) {
            return Err(BridgeError::device("speaker unplugged"));
        }
        let start_at = start_at.max(self.now());
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.scheduled.lock().push((id, start_at, buffer.duration()));
        self.ended.lock().insert(id, ended);
        Ok((id, start_at))
    }

    fn check(&self) -> Result<(), BridgeError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(BridgeError::device("no speaker"));
        }
        Ok(())
    }

    fn halt(&self, id: PlaybackId) {
        self.ended.lock().remove(&id);
        self.halted.lock().push(id);
    }
}

#[derive(Default)]
pub struct FakeTransport {
    pub sent: Mutex<Vec<AudioFrame>>,
    pub closed: AtomicBool,
    /// Number of `send_audio` calls, failed ones included.
    pub attempts: AtomicUsize,
    /// 1-based attempt numbers that fail as if the outbound queue were full.
    pub fail_attempts: Mutex<Vec<usize>>,
}

impl FakeTransport {
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl LiveTransport for FakeTransport {
    fn send_audio(&self, frame: &AudioFrame) -> Result<(), BridgeError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_attempts.lock().contains(&attempt) {
            return Err(BridgeError::transport("outbound queue full"));
        }
        self.sent.lock().push(frame.clone());
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub enum ConnectMode {
    #[default]
    Accept,
    Fail(BridgeError),
    /// Never resolves.
    Hang,
    /// Resolves after the notify fires.
    Gate(Arc<Notify>),
}

#[derive(Default)]
pub struct FakeConnector {
    pub mode: Mutex<ConnectMode>,
    pub transport: Arc<FakeTransport>,
    pub connects: AtomicUsize,
    event_tx: Mutex<Option<mpsc::Sender<SessionEvent>>>,
}

impl FakeConnector {
    /// Deliver one event from the remote end.
    pub async fn emit(&self, event: SessionEvent) {
        let tx = self.event_tx.lock().clone().expect("no open session");
        tx.send(event).await.expect("bridge stopped listening");
    }
}

#[async_trait]
impl LiveConnector for FakeConnector {
    async fn connect(&self, _setup: &LiveSetup) -> Result<LiveConnection, BridgeError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let gate = match &*self.mode.lock() {
            ConnectMode::Accept => None,
            ConnectMode::Fail(e) => return Err(e.clone()),
            ConnectMode::Hang => Some(None),
            ConnectMode::Gate(notify) => Some(Some(notify.clone())),
        };
        match gate {
            None => {}
            Some(None) => std::future::pending::<()>().await,
            Some(Some(notify)) => notify.notified().await,
        }

        let (tx, events) = mpsc::channel(64);
        *self.event_tx.lock() = Some(tx);
        Ok(LiveConnection {
            transport: self.transport.clone(),
            events,
        })
    }
}

pub struct Harness {
    pub capture: Arc<FakeCapture>,
    pub playback: Arc<FakePlayback>,
    pub connector: Arc<FakeConnector>,
    pub bridge: LiveAudioBridge,
    pub notices: mpsc::Receiver<BridgeNotice>,
}

pub fn config() -> BridgeConfig {
    BridgeConfig {
        setup: LiveSetup {
            model: "models/test".into(),
            voice: "Kore".into(),
            instruction: "be brief".into(),
        },
        input_sample_rate: 16000,
        output_sample_rate: 24000,
        connect_timeout: Duration::from_secs(10),
    }
}

pub fn harness() -> Harness {
    let capture = Arc::new(FakeCapture::default());
    let playback = Arc::new(FakePlayback::default());
    let connector = Arc::new(FakeConnector::default());
    let (notice_tx, notices) = mpsc::channel(16);
    let bridge = LiveAudioBridge::new(
        config(),
        capture.clone(),
        playback.clone(),
        connector.clone(),
        notice_tx,
    );
    Harness {
        capture,
        playback,
        connector,
        bridge,
        notices,
    }
}

/// Base64 PCM16 at 24 kHz lasting `ms` milliseconds.
pub fn inbound_audio(ms: usize) -> SessionEvent {
    SessionEvent::Audio(AudioFrame::from_f32(&vec![0.1; 24 * ms], 24000).to_base64())
}

/// Poll `cond` until it holds; panics after about two seconds.
pub async fn eventually(mut cond: impl FnMut() -> bool) {
    for _ in 0..400 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached");
}

pub async fn next_notice(notices: &mut mpsc::Receiver<BridgeNotice>) -> BridgeNotice {
    tokio::time::timeout(Duration::from_secs(2), notices.recv())
        .await
        .expect("no notice delivered")
        .expect("notice channel closed")
}
