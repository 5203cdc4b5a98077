use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::protocol::Message};
use url::Url;

use crate::audio::AudioFrame;
use crate::error::BridgeError;
use crate::protocol::{ClientMessage, ServerMessage};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Events delivered by a live session, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Opened,
    /// Base64 PCM16 @24kHz, not yet decoded.
    Audio(String),
    /// The model's current turn was cut off by user speech.
    Interrupted,
    TurnComplete,
    Closed(Option<String>),
    Error(String),
}

/// Fixed parameters of a live session.
#[derive(Debug, Clone)]
pub struct LiveSetup {
    pub model: String,
    pub voice: String,
    pub instruction: String,
}

/// An established session: the send half plus the event stream.
pub struct LiveConnection {
    pub transport: Arc<dyn LiveTransport>,
    pub events: mpsc::Receiver<SessionEvent>,
}

/// Opens live sessions. Owned by the bridge, not process-wide.
#[async_trait]
pub trait LiveConnector: Send + Sync {
    /// Resolves once the remote end has acknowledged the setup.
    async fn connect(&self, setup: &LiveSetup) -> Result<LiveConnection, BridgeError>;
}

/// Send half of an open session. Both calls return without waiting on the network.
pub trait LiveTransport: Send + Sync {
    /// Queue one frame as realtime input. An error means this frame was dropped.
    fn send_audio(&self, frame: &AudioFrame) -> Result<(), BridgeError>;

    /// Ask the remote end to terminate. Idempotent.
    fn close(&self);
}

// 出站队列长度，满了就丢帧而不是阻塞采集
const OUTBOUND_QUEUE: usize = 64;
const EVENT_QUEUE: usize = 100;

/// Gemini Live over WebSocket.
pub struct GeminiLiveConnector {
    ws_url: String,
    api_key: Option<String>,
}

impl GeminiLiveConnector {
    pub fn new(ws_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
            api_key,
        }
    }

    fn endpoint(&self) -> Result<Url, BridgeError> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| BridgeError::transport("API key not configured"))?;
        Url::parse_with_params(&self.ws_url, &[("key", key)])
            .map_err(|e| BridgeError::transport(format!("invalid live url: {}", e)))
    }
}

#[async_trait]
impl LiveConnector for GeminiLiveConnector {
    async fn connect(&self, setup: &LiveSetup) -> Result<LiveConnection, BridgeError> {
        let url = self.endpoint()?;
        log::info!("Connecting to {}...", self.ws_url);

        let (ws_stream, _) = connect_async(url.as_str())
            .await
            .map_err(|e| BridgeError::transport(format!("WebSocket connect error: {}", e)))?;
        let (mut write, mut read) = ws_stream.split();

        let setup_msg = ClientMessage::setup(&setup.model, &setup.voice, &setup.instruction);
        let setup_json = serde_json::to_string(&setup_msg)
            .map_err(|e| BridgeError::transport(format!("serialize setup: {}", e)))?;
        log::debug!("Sending setup for model {}", setup.model);
        write
            .send(Message::Text(setup_json.into()))
            .await
            .map_err(|e| BridgeError::transport(format!("send setup: {}", e)))?;

        wait_setup_complete(&mut read).await?;
        log::info!("Live session ready");

        let (cmd_tx, cmd_rx) = mpsc::channel(OUTBOUND_QUEUE);
        let (close_tx, close_rx) = oneshot::channel();
        let (event_tx, events) = session_events();

        tokio::spawn(run_link(write, read, cmd_rx, close_rx, event_tx));

        Ok(LiveConnection {
            transport: Arc::new(LiveLink {
                cmd_tx,
                close_tx: Mutex::new(Some(close_tx)),
            }),
            events,
        })
    }
}

/// Event channel of a freshly acknowledged session. `setupComplete` is
/// consumed by the handshake, so `Opened` is queued here instead.
fn session_events() -> (mpsc::Sender<SessionEvent>, mpsc::Receiver<SessionEvent>) {
    let (tx, rx) = mpsc::channel(EVENT_QUEUE);
    let _ = tx.try_send(SessionEvent::Opened);
    (tx, rx)
}

async fn wait_setup_complete(read: &mut WsSource) -> Result<(), BridgeError> {
    loop {
        let text = match read.next().await {
            Some(Ok(Message::Text(text))) => text.to_string(),
            Some(Ok(Message::Binary(data))) => String::from_utf8_lossy(&data).into_owned(),
            Some(Ok(Message::Close(frame))) => {
                return Err(BridgeError::transport(format!(
                    "closed during setup: {}",
                    close_reason(frame.as_ref()).unwrap_or_default()
                )));
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(BridgeError::transport(format!("setup: {}", e))),
            None => return Err(BridgeError::transport("closed during setup")),
        };
        match serde_json::from_str::<ServerMessage>(&text) {
            Ok(msg) if msg.setup_complete.is_some() => return Ok(()),
            Ok(_) => log::debug!("Ignoring pre-setup message"),
            Err(e) => log::warn!("Unparseable setup reply: {}", e),
        }
    }
}

fn close_reason(frame: Option<&tokio_tungstenite::tungstenite::protocol::CloseFrame>) -> Option<String> {
    frame.map(|f| format!("{} {}", u16::from(f.code), f.reason.as_str()))
}

enum LinkCommand {
    Send(String),
}

/// Handle to the spawned link task.
struct LiveLink {
    cmd_tx: mpsc::Sender<LinkCommand>,
    close_tx: Mutex<Option<oneshot::Sender<()>>>,
}

impl LiveTransport for LiveLink {
    fn send_audio(&self, frame: &AudioFrame) -> Result<(), BridgeError> {
        let json = serde_json::to_string(&ClientMessage::realtime_audio(frame))
            .map_err(|e| BridgeError::transport(format!("serialize audio: {}", e)))?;
        self.cmd_tx.try_send(LinkCommand::Send(json)).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => BridgeError::transport("outbound queue full"),
            mpsc::error::TrySendError::Closed(_) => BridgeError::transport("link closed"),
        })
    }

    fn close(&self) {
        if let Some(tx) = self.close_tx.lock().take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for LiveLink {
    fn drop(&mut self) {
        self.close();
    }
}

// 读写主循环：转发服务端消息为事件，发送出站音频，收到关闭信号时主动断开
async fn run_link(
    mut write: WsSink,
    mut read: WsSource,
    mut cmd_rx: mpsc::Receiver<LinkCommand>,
    mut close_rx: oneshot::Receiver<()>,
    event_tx: mpsc::Sender<SessionEvent>,
) {
    loop {
        tokio::select! {
            biased;

            _ = &mut close_rx => {
                log::info!("Closing live session");
                let _ = write.send(Message::Close(None)).await;
                break;
            }
            msg = read.next() => {
                let text = match msg {
                    Some(Ok(Message::Text(text))) => text.to_string(),
                    Some(Ok(Message::Binary(data))) => match String::from_utf8(data.to_vec()) {
                        Ok(text) => text,
                        Err(e) => {
                            log::warn!("Dropping non UTF-8 binary message: {}", e);
                            continue;
                        }
                    },
                    Some(Ok(Message::Close(frame))) => {
                        log::info!("Server closed connection: {:?}", frame);
                        let _ = event_tx.send(SessionEvent::Closed(close_reason(frame.as_ref()))).await;
                        break;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        let _ = event_tx.send(SessionEvent::Error(e.to_string())).await;
                        break;
                    }
                    None => {
                        let _ = event_tx.send(SessionEvent::Closed(None)).await;
                        break;
                    }
                };

                let events = match serde_json::from_str::<ServerMessage>(&text) {
                    Ok(msg) => msg.into_events(),
                    Err(e) => {
                        log::warn!("Dropping unparseable server message: {}", e);
                        continue;
                    }
                };
                for event in events {
                    if event_tx.send(event).await.is_err() {
                        // 桥已经不再监听
                        let _ = write.send(Message::Close(None)).await;
                        return;
                    }
                }
            }
            Some(cmd) = cmd_rx.recv() => {
                match cmd {
                    LinkCommand::Send(text) => {
                        if let Err(e) = write.send(Message::Text(text.into())).await {
                            let _ = event_tx.send(SessionEvent::Error(e.to_string())).await;
                            break;
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_requires_api_key() {
        let connector = GeminiLiveConnector::new("wss://example.com/ws", None);
        assert!(matches!(connector.endpoint(), Err(BridgeError::Transport(_))));
    }

    #[test]
    fn endpoint_carries_key_as_query() {
        let connector = GeminiLiveConnector::new("wss://example.com/ws", Some("k 1".into()));
        let url = connector.endpoint().unwrap();
        assert_eq!(url.as_str(), "wss://example.com/ws?key=k+1");
    }

    #[test]
    fn acknowledged_session_starts_with_opened() {
        let (_tx, mut rx) = session_events();
        assert_eq!(rx.try_recv().unwrap(), SessionEvent::Opened);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn close_is_idempotent_and_send_fails_after_link_exit() {
        let (cmd_tx, cmd_rx) = mpsc::channel(1);
        let (close_tx, mut close_rx) = oneshot::channel();
        let link = LiveLink {
            cmd_tx,
            close_tx: Mutex::new(Some(close_tx)),
        };
        link.close();
        link.close();
        assert!(close_rx.try_recv().is_ok());

        drop(cmd_rx);
        let frame = AudioFrame::from_f32(&[0.0], 16000);
        assert!(link.send_audio(&frame).is_err());
    }
}
