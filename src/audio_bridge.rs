//! Live audio bridge: microphone → live session → speaker.
//!
//! One pump task per session is the only place capture chunks, inbound
//! session events and end-of-playback notices are handled, so each source is
//! processed in delivery order and the playback cursor has a single writer.
//! `stop` may run from any task, including the pump itself.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use uuid::Uuid;

use crate::audio::{
    AudioFrame, CaptureChunk, CaptureDevice, CaptureStream, PlaybackBuffer, PlaybackDevice,
    PlaybackId,
};
use crate::config::Config;
use crate::error::BridgeError;
use crate::net_link::{LiveConnector, LiveSetup, LiveTransport, SessionEvent};
use crate::persona;
use crate::schedule::PlaybackSchedule;

// 采集线程在建立连接期间最多积压的块数
const CAPTURE_QUEUE: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    Idle,
    Connecting,
    Listening,
}

/// User-visible outcome of a failure. The bridge is already `Idle` when one
/// of these is delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeNotice {
    StartFailed(BridgeError),
    SessionEnded(BridgeError),
}

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub setup: LiveSetup,
    pub input_sample_rate: u32,
    pub output_sample_rate: u32,
    pub connect_timeout: Duration,
}

impl From<&Config> for BridgeConfig {
    fn from(config: &Config) -> Self {
        Self {
            setup: LiveSetup {
                model: config.live_model.clone(),
                voice: config.live_voice.clone(),
                instruction: persona::SYSTEM_INSTRUCTION.to_string(),
            },
            input_sample_rate: config.input_sample_rate,
            output_sample_rate: config.output_sample_rate,
            connect_timeout: config.connect_timeout(),
        }
    }
}

struct Inner {
    state: BridgeState,
    /// Id of the connecting or running session; `None` when idle.
    session_id: Option<Uuid>,
    capture: Option<Box<dyn CaptureStream>>,
    transport: Option<Arc<dyn LiveTransport>>,
    shutdown: Option<oneshot::Sender<()>>,
    schedule: PlaybackSchedule,
}

struct Shared {
    config: BridgeConfig,
    capture: Arc<dyn CaptureDevice>,
    playback: Arc<dyn PlaybackDevice>,
    connector: Arc<dyn LiveConnector>,
    state_tx: watch::Sender<BridgeState>,
    notice_tx: mpsc::Sender<BridgeNotice>,
    inner: Mutex<Inner>,
}

#[derive(Clone)]
pub struct LiveAudioBridge {
    shared: Arc<Shared>,
}

impl LiveAudioBridge {
    pub fn new(
        config: BridgeConfig,
        capture: Arc<dyn CaptureDevice>,
        playback: Arc<dyn PlaybackDevice>,
        connector: Arc<dyn LiveConnector>,
        notice_tx: mpsc::Sender<BridgeNotice>,
    ) -> Self {
        let (state_tx, _) = watch::channel(BridgeState::Idle);
        Self {
            shared: Arc::new(Shared {
                config,
                capture,
                playback,
                connector,
                state_tx,
                notice_tx,
                inner: Mutex::new(Inner {
                    state: BridgeState::Idle,
                    session_id: None,
                    capture: None,
                    transport: None,
                    shutdown: None,
                    schedule: PlaybackSchedule::new(),
                }),
            }),
        }
    }

    pub fn state(&self) -> BridgeState {
        self.shared.inner.lock().state
    }

    /// Follow state changes (for rendering).
    pub fn subscribe(&self) -> watch::Receiver<BridgeState> {
        self.shared.state_tx.subscribe()
    }

    /// Output clock time at which the next inbound frame would start.
    pub fn next_start_time(&self) -> f64 {
        self.shared.inner.lock().schedule.next_start_time()
    }

    /// Number of scheduled buffers that have not finished playing.
    pub fn active_playback(&self) -> usize {
        self.shared.inner.lock().schedule.active_count()
    }

    /// Acquire the microphone, open a live session and start both paths.
    ///
    /// A no-op unless the bridge is idle. Failures are also reported as a
    /// [`BridgeNotice::StartFailed`] and always leave the bridge idle.
    pub async fn start(&self) -> Result<(), BridgeError> {
        let id = Uuid::new_v4();
        {
            let mut inner = self.shared.inner.lock();
            if inner.state != BridgeState::Idle {
                log::warn!("Start ignored, bridge is {:?}", inner.state);
                return Ok(());
            }
            inner.session_id = Some(id);
            self.set_state(&mut inner, BridgeState::Connecting);
        }
        log::info!("Starting live session {}", id);

        // 0. 扬声器不可用时不占用麦克风
        if let Err(e) = self.shared.playback.check() {
            self.fail(id, e.clone(), BridgeNotice::StartFailed);
            return Err(e);
        }

        // 1. 麦克风
        let (chunk_tx, mut chunk_rx) = mpsc::channel::<CaptureChunk>(CAPTURE_QUEUE);
        let capture = match self.shared.capture.open(chunk_tx) {
            Ok(capture) => capture,
            Err(e) => {
                self.fail(id, e.clone(), BridgeNotice::StartFailed);
                return Err(e);
            }
        };
        {
            let mut inner = self.shared.inner.lock();
            if inner.session_id != Some(id) {
                drop(inner);
                let mut capture = capture;
                capture.stop();
                log::info!("Session {} stopped before the microphone opened", id);
                return Ok(());
            }
            inner.capture = Some(capture);
        }

        // 2. 建立会话
        let timeout = self.shared.config.connect_timeout;
        let connect = self.shared.connector.connect(&self.shared.config.setup);
        let connection = match tokio::time::timeout(timeout, connect).await {
            Ok(Ok(connection)) => connection,
            Ok(Err(e)) => {
                self.fail(id, e.clone(), BridgeNotice::StartFailed);
                return Err(e);
            }
            Err(_) => {
                let e = BridgeError::Timeout(timeout.as_millis() as u64);
                self.fail(id, e.clone(), BridgeNotice::StartFailed);
                return Err(e);
            }
        };

        // 3. 安装会话并启动泵
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        {
            let mut inner = self.shared.inner.lock();
            if inner.session_id != Some(id) {
                drop(inner);
                connection.transport.close();
                log::info!("Session {} stopped while connecting", id);
                return Ok(());
            }
            inner.transport = Some(connection.transport.clone());
            inner.shutdown = Some(shutdown_tx);
            self.set_state(&mut inner, BridgeState::Listening);
        }

        // Audio captured while connecting is stale by now.
        let mut stale = 0usize;
        while chunk_rx.try_recv().is_ok() {
            stale += 1;
        }
        if stale > 0 {
            log::debug!("Discarded {} chunks captured while connecting", stale);
        }

        let pump = Pump {
            id,
            bridge: self.clone(),
            transport: connection.transport,
        };
        tokio::spawn(pump.run(connection.events, chunk_rx, shutdown_rx));
        log::info!("Live session {} listening", id);
        Ok(())
    }

    /// End the session: close the transport, halt all playback, reset the
    /// cursor and release the microphone. Safe to call at any time.
    pub fn stop(&self) {
        if self.teardown(None) {
            log::info!("Live session stopped");
        }
    }

    fn set_state(&self, inner: &mut Inner, state: BridgeState) {
        inner.state = state;
        self.shared.state_tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
    }

    /// Shared cleanup of `stop` and the failure paths. With `expected` set,
    /// only tears down if that session is still the current one.
    ///
    /// Returns whether a connecting or running session was ended.
    fn teardown(&self, expected: Option<Uuid>) -> bool {
        let (was_active, halted, capture, transport, shutdown) = {
            let mut inner = self.shared.inner.lock();
            if expected.is_some() && inner.session_id != expected {
                return false;
            }
            let was_active = inner.state != BridgeState::Idle;
            let halted = inner.schedule.reset();
            inner.session_id = None;
            self.set_state(&mut inner, BridgeState::Idle);
            (
                was_active,
                halted,
                inner.capture.take(),
                inner.transport.take(),
                inner.shutdown.take(),
            )
        };

        for pid in halted {
            self.shared.playback.halt(pid);
        }
        if let Some(mut capture) = capture {
            capture.stop();
        }
        if let Some(transport) = transport {
            transport.close();
        }
        if let Some(shutdown) = shutdown {
            let _ = shutdown.send(());
        }
        was_active
    }

    fn fail(&self, id: Uuid, err: BridgeError, notice: fn(BridgeError) -> BridgeNotice) {
        if !self.teardown(Some(id)) {
            return;
        }
        log::error!("Live session {} ended: {}", id, err);
        if let Err(e) = self.shared.notice_tx.try_send(notice(err)) {
            log::warn!("Failed to deliver notice: {}", e);
        }
    }
}

/// Per-session event loop.
struct Pump {
    id: Uuid,
    bridge: LiveAudioBridge,
    transport: Arc<dyn LiveTransport>,
}

impl Pump {
    async fn run(
        self,
        mut events: mpsc::Receiver<SessionEvent>,
        mut chunks: mpsc::Receiver<CaptureChunk>,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        let (ended_tx, mut ended_rx) = mpsc::unbounded_channel::<PlaybackId>();

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => break,
                chunk = chunks.recv() => match chunk {
                    Some(chunk) => self.handle_capture(&chunk),
                    None => {
                        self.fail(BridgeError::device("capture stream ended"));
                        break;
                    }
                },
                event = events.recv() => {
                    let event = event.unwrap_or(SessionEvent::Closed(None));
                    if let Err(e) = self.handle_session_event(event, &ended_tx) {
                        self.fail(e);
                        break;
                    }
                }
                Some(pid) = ended_rx.recv() => self.handle_ended(pid),
            }
        }
        log::debug!("Pump for session {} exited", self.id);
    }

    fn fail(&self, err: BridgeError) {
        self.bridge.fail(self.id, err, BridgeNotice::SessionEnded);
    }

    /// Outbound: one chunk, one frame, fire-and-forget.
    fn handle_capture(&self, chunk: &[f32]) {
        let rate = self.bridge.shared.config.input_sample_rate;
        let frame = AudioFrame::from_f32(chunk, rate);
        if let Err(e) = self.transport.send_audio(&frame) {
            log::warn!("Dropping outbound frame: {}", e);
        }
    }

    fn handle_session_event(
        &self,
        event: SessionEvent,
        ended_tx: &mpsc::UnboundedSender<PlaybackId>,
    ) -> Result<(), BridgeError> {
        match event {
            SessionEvent::Audio(payload) => match self.handle_inbound(&payload, ended_tx) {
                Err(e) if !e.is_session_fatal() => {
                    log::warn!("Dropping inbound frame: {}", e);
                    Ok(())
                }
                other => other,
            },
            SessionEvent::Interrupted => {
                self.handle_interrupted();
                Ok(())
            }
            SessionEvent::Opened => {
                log::debug!("Session {} opened", self.id);
                Ok(())
            }
            SessionEvent::TurnComplete => {
                log::debug!("Model turn complete");
                Ok(())
            }
            SessionEvent::Closed(reason) => Err(BridgeError::transport(format!(
                "remote closed the session{}",
                reason.map(|r| format!(": {}", r)).unwrap_or_default()
            ))),
            SessionEvent::Error(e) => Err(BridgeError::transport(e)),
        }
    }

    /// Inbound: decode, convert and place right after the current tail.
    fn handle_inbound(
        &self,
        payload: &str,
        ended_tx: &mpsc::UnboundedSender<PlaybackId>,
    ) -> Result<(), BridgeError> {
        let rate = self.bridge.shared.config.output_sample_rate;
        let frame = AudioFrame::from_base64(payload, rate)?;
        let buffer = PlaybackBuffer::new(frame.to_f32(), rate);

        let shared = &self.bridge.shared;
        let mut inner = shared.inner.lock();
        if inner.session_id != Some(self.id) {
            return Ok(());
        }
        let (pid, start_at) =
            inner
                .schedule
                .schedule(shared.playback.as_ref(), buffer, ended_tx.clone())?;
        log::trace!(
            "Scheduled buffer {} at {:.3}s for {:.3}s",
            pid,
            start_at,
            frame.duration()
        );
        Ok(())
    }

    /// The model was talked over: drop what is queued, keep listening.
    fn handle_interrupted(&self) {
        let shared = &self.bridge.shared;
        let halted = {
            let mut inner = shared.inner.lock();
            if inner.session_id != Some(self.id) {
                return;
            }
            inner.schedule.reset()
        };
        log::info!("Model interrupted, halting {} buffers", halted.len());
        for pid in halted {
            shared.playback.halt(pid);
        }
    }

    fn handle_ended(&self, pid: PlaybackId) {
        let mut inner = self.bridge.shared.inner.lock();
        if inner.session_id == Some(self.id) {
            inner.schedule.finished(pid);
        }
    }
}
