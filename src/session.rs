//! Session transport
//!
//! Owns the persistent duplex connection for one coaching engagement:
//! connect, heartbeat, reconnect with linear backoff, teardown. The
//! WebSocket is split into a shared write half and a spawned reader task;
//! the reader decodes inbound frames and feeds them to the consumer over a
//! channel in strict arrival order. No other component touches the socket:
//! all outbound traffic goes through the `send_*` methods here.
//!
//! Reconnection opens a fresh transport under the same session id; frames
//! in flight on the old connection are discarded, never replayed.

use crate::capture::ControlAction;
use crate::protocol::{decode_frame, encode_frame, ClientFrame, ConnectOptions, ServerFrame};
use base64::engine::general_purpose;
use base64::Engine;
use futures_util::future::BoxFuture;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

/// Write half of the socket, shared between the heartbeat task and the
/// send methods.
type WsSink = Arc<Mutex<SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>>>;
type WsStream = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Not connected")]
    NotConnected,
}

pub type Result<T> = std::result::Result<T, SessionError>;

/// Connection state machine. A failed attempt never halts the session: it
/// feeds the reconnection policy and lands back in `Disconnected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Recording,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Base `ws://` / `wss://` endpoint, without the query string.
    pub url: String,
    /// Caller-supplied opaque session id, stable across reconnects.
    pub session_id: String,
    pub options: ConnectOptions,
    pub heartbeat_interval: Duration,
    pub reconnect_attempts: u32,
    /// Base backoff; attempt `n` waits `n * reconnect_delay`.
    pub reconnect_delay: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8787/session".to_string(),
            session_id: String::new(),
            options: ConnectOptions::default(),
            heartbeat_interval: Duration::from_secs(30),
            reconnect_attempts: 3,
            reconnect_delay: Duration::from_secs(1),
        }
    }
}

impl SessionConfig {
    fn connect_url(&self) -> String {
        format!("{}?{}", self.url, self.options.query_string(&self.session_id))
    }
}

/// Events surfaced to the consumer, in strict arrival order.
#[derive(Debug)]
pub enum SessionEvent {
    Frame(ServerFrame),
    /// The transport dropped. Automatic reconnection is already scheduled
    /// (or exhausted); this is a non-blocking status signal only.
    TransportClosed,
}

struct Shared {
    state: SessionState,
    attempts: u32,
    closed_by_user: bool,
    writer: Option<WsSink>,
    reader_task: Option<JoinHandle<()>>,
    heartbeat_task: Option<JoinHandle<()>>,
    reconnect_task: Option<JoinHandle<()>>,
}

/// One coaching session's transport. Explicitly constructed and torn down;
/// no module-level singletons, so tests can run independent sessions side
/// by side.
pub struct CoachSession {
    config: Arc<SessionConfig>,
    shared: Arc<Mutex<Shared>>,
    event_tx: mpsc::UnboundedSender<SessionEvent>,
    event_rx: mpsc::UnboundedReceiver<SessionEvent>,
}

impl CoachSession {
    pub fn new(config: SessionConfig) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        Self {
            config: Arc::new(config),
            shared: Arc::new(Mutex::new(Shared {
                state: SessionState::Disconnected,
                attempts: 0,
                closed_by_user: false,
                writer: None,
                reader_task: None,
                heartbeat_task: None,
                reconnect_task: None,
            })),
            event_tx,
            event_rx,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.config.session_id
    }

    pub async fn state(&self) -> SessionState {
        self.shared.lock().await.state
    }

    /// Reconnect attempts made in the current disconnect streak. Reset to
    /// zero by a successful (re)connect.
    pub async fn reconnect_attempts(&self) -> u32 {
        self.shared.lock().await.attempts
    }

    /// Open the connection. No-op when already connecting or connected.
    /// A failed first attempt surfaces the error and still schedules the
    /// reconnection policy.
    pub async fn connect(&self) -> Result<()> {
        {
            let mut sh = self.shared.lock().await;
            match sh.state {
                SessionState::Connecting | SessionState::Connected | SessionState::Recording => {
                    debug!("connect() ignored, already {:?}", sh.state);
                    return Ok(());
                }
                SessionState::Disconnected => {
                    sh.closed_by_user = false;
                    sh.attempts = 0;
                    // A retry sleeping out its backoff must not dial a
                    // second connection over this one.
                    if let Some(task) = sh.reconnect_task.take() {
                        task.abort();
                    }
                    sh.state = SessionState::Connecting;
                }
            }
        }

        match Self::open(self.config.clone(), self.shared.clone(), self.event_tx.clone()).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(error = %e, "initial connect failed");
                {
                    let mut sh = self.shared.lock().await;
                    sh.state = SessionState::Disconnected;
                }
                Self::schedule_reconnect(
                    self.config.clone(),
                    self.shared.clone(),
                    self.event_tx.clone(),
                )
                .await;
                Err(e)
            }
        }
    }

    /// Tear the session down. Idempotent: aborts all timers and tasks and
    /// abandons the socket without waiting for a close handshake.
    pub async fn disconnect(&self) {
        let mut sh = self.shared.lock().await;
        sh.closed_by_user = true;
        sh.state = SessionState::Disconnected;
        sh.attempts = 0;
        sh.writer = None;
        for task in [
            sh.reader_task.take(),
            sh.heartbeat_task.take(),
            sh.reconnect_task.take(),
        ]
        .into_iter()
        .flatten()
        {
            task.abort();
        }
        info!("session disconnected");
    }

    /// Next inbound event. `None` only after the session is dropped.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.event_rx.recv().await
    }

    /// Fold a `session_status` value into the connection state machine:
    /// `recording` promotes, any other status while live demotes back to
    /// plain `Connected`.
    pub async fn note_status(&self, status: &str) {
        let mut sh = self.shared.lock().await;
        match sh.state {
            SessionState::Connected | SessionState::Recording => {
                sh.state = if status == "recording" {
                    SessionState::Recording
                } else {
                    SessionState::Connected
                };
            }
            _ => {}
        }
    }

    pub async fn send_control(&self, action: ControlAction) -> Result<()> {
        info!(action = action.as_str(), "forwarding control intent");
        self.send_frame(&ClientFrame::Control { action }).await
    }

    pub async fn send_metric(&self, rule_id: &str, value: f64, t_sec: f64) -> Result<()> {
        self.send_frame(&ClientFrame::Metric {
            rule_id: rule_id.to_string(),
            value,
            t_sec,
        })
        .await
    }

    pub async fn send_audio(&self, audio: &[u8]) -> Result<()> {
        self.send_frame(&ClientFrame::Audio {
            data: general_purpose::STANDARD.encode(audio),
        })
        .await
    }

    pub async fn send_video_frame(&self, frame: &[u8], t_sec: f64) -> Result<()> {
        self.send_frame(&ClientFrame::VideoFrame {
            frame_b64: general_purpose::STANDARD.encode(frame),
            t_sec,
        })
        .await
    }

    pub async fn send_user_feedback(&self, text: &str) -> Result<()> {
        self.send_frame(&ClientFrame::UserFeedback {
            text: text.to_string(),
        })
        .await
    }

    async fn send_frame(&self, frame: &ClientFrame) -> Result<()> {
        let writer = self
            .shared
            .lock()
            .await
            .writer
            .clone()
            .ok_or(SessionError::NotConnected)?;
        let json = encode_frame(frame)?;
        debug!(frame = %json, "sending");
        writer.lock().await.send(Message::text(json)).await?;
        Ok(())
    }

    /// Dial the endpoint and install the reader and heartbeat tasks.
    ///
    /// Boxed: the reader path schedules reconnects, which dial again, so an
    /// unboxed future type here would be infinitely recursive.
    fn open(
        config: Arc<SessionConfig>,
        shared: Arc<Mutex<Shared>>,
        event_tx: mpsc::UnboundedSender<SessionEvent>,
    ) -> BoxFuture<'static, Result<()>> {
        Box::pin(Self::open_inner(config, shared, event_tx))
    }

    async fn open_inner(
        config: Arc<SessionConfig>,
        shared: Arc<Mutex<Shared>>,
        event_tx: mpsc::UnboundedSender<SessionEvent>,
    ) -> Result<()> {
        let url = config.connect_url();
        info!(url = %config.url, session_id = %config.session_id, "connecting");

        let (ws, resp) = connect_async(&url).await?;
        debug!("connection response: {:?}", resp);

        let (sink, stream) = ws.split();
        let sink: WsSink = Arc::new(Mutex::new(sink));

        let reader = tokio::spawn(Self::read_loop(
            stream,
            config.clone(),
            shared.clone(),
            event_tx,
        ));
        let heartbeat = tokio::spawn(Self::heartbeat_loop(
            sink.clone(),
            config.heartbeat_interval,
        ));

        let mut sh = shared.lock().await;
        if sh.closed_by_user {
            // disconnect() raced the dial; honor it.
            reader.abort();
            heartbeat.abort();
            return Err(SessionError::NotConnected);
        }
        sh.writer = Some(sink);
        if let Some(old) = sh.reader_task.replace(reader) {
            old.abort();
        }
        if let Some(old) = sh.heartbeat_task.replace(heartbeat) {
            old.abort();
        }
        sh.state = SessionState::Connected;
        sh.attempts = 0;
        info!("session connected");
        Ok(())
    }

    async fn read_loop(
        mut stream: WsStream,
        config: Arc<SessionConfig>,
        shared: Arc<Mutex<Shared>>,
        event_tx: mpsc::UnboundedSender<SessionEvent>,
    ) {
        while let Some(item) = stream.next().await {
            match item {
                Ok(Message::Text(text)) => Self::handle_raw(&text, &event_tx),
                Ok(Message::Binary(bytes)) => {
                    // Some servers deliver JSON frames as binary.
                    match String::from_utf8(bytes.to_vec()) {
                        Ok(text) => Self::handle_raw(&text, &event_tx),
                        Err(_) => debug!(len = bytes.len(), "ignoring non-UTF-8 binary frame"),
                    }
                }
                Ok(Message::Close(frame)) => {
                    info!("server closed the connection: {:?}", frame);
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "transport error");
                    break;
                }
            }
        }
        Self::on_transport_closed(config, shared, event_tx).await;
    }

    /// Decode one raw frame. A malformed frame is logged and dropped; it
    /// never changes connection state or reaches the consumer.
    fn handle_raw(text: &str, event_tx: &mpsc::UnboundedSender<SessionEvent>) {
        match decode_frame(text) {
            Ok(frame) => {
                let _ = event_tx.send(SessionEvent::Frame(frame));
            }
            Err(e) => {
                warn!(error = %e, raw = text, "dropping malformed frame");
            }
        }
    }

    /// Keep-alive pings. A missed pong is not a failure; the reader's close
    /// event is the only disconnect signal acted upon.
    async fn heartbeat_loop(sink: WsSink, every: Duration) {
        let mut interval = tokio::time::interval(every);
        interval.tick().await; // the first tick fires immediately
        loop {
            interval.tick().await;
            let json = match encode_frame(&ClientFrame::Ping) {
                Ok(json) => json,
                Err(e) => {
                    error!(error = %e, "failed to encode ping");
                    continue;
                }
            };
            if let Err(e) = sink.lock().await.send(Message::text(json)).await {
                debug!(error = %e, "heartbeat send failed");
            } else {
                debug!("heartbeat sent");
            }
        }
    }

    async fn on_transport_closed(
        config: Arc<SessionConfig>,
        shared: Arc<Mutex<Shared>>,
        event_tx: mpsc::UnboundedSender<SessionEvent>,
    ) {
        {
            let mut sh = shared.lock().await;
            sh.writer = None;
            if let Some(task) = sh.heartbeat_task.take() {
                task.abort();
            }
            sh.state = SessionState::Disconnected;
            if sh.closed_by_user {
                return;
            }
        }
        let _ = event_tx.send(SessionEvent::TransportClosed);
        Self::schedule_reconnect(config, shared, event_tx).await;
    }

    async fn schedule_reconnect(
        config: Arc<SessionConfig>,
        shared: Arc<Mutex<Shared>>,
        event_tx: mpsc::UnboundedSender<SessionEvent>,
    ) {
        let task = tokio::spawn(Self::reconnect_loop(
            config,
            shared.clone(),
            event_tx,
        ));
        let mut sh = shared.lock().await;
        if let Some(old) = sh.reconnect_task.replace(task) {
            old.abort();
        }
    }

    /// Linear backoff: attempt `n` waits `n * reconnect_delay`. Exhausting
    /// the budget leaves the session `Disconnected`; only a fresh
    /// `connect()` call tries again.
    async fn reconnect_loop(
        config: Arc<SessionConfig>,
        shared: Arc<Mutex<Shared>>,
        event_tx: mpsc::UnboundedSender<SessionEvent>,
    ) {
        loop {
            let attempt = {
                let mut sh = shared.lock().await;
                if sh.closed_by_user || sh.state != SessionState::Disconnected {
                    return;
                }
                if sh.attempts >= config.reconnect_attempts {
                    info!(
                        attempts = sh.attempts,
                        "reconnect attempts exhausted, staying disconnected"
                    );
                    return;
                }
                sh.attempts += 1;
                sh.attempts
            };

            let delay = config.reconnect_delay * attempt;
            info!(attempt, ?delay, "reconnecting after delay");
            tokio::time::sleep(delay).await;

            {
                let mut sh = shared.lock().await;
                // The caller may have reconnected by hand during the sleep;
                // a live session is never dialed over.
                if sh.closed_by_user || sh.state != SessionState::Disconnected {
                    return;
                }
                sh.state = SessionState::Connecting;
            }

            match Self::open(config.clone(), shared.clone(), event_tx.clone()).await {
                Ok(()) => {
                    info!(attempt, "reconnected");
                    return;
                }
                Err(e) => {
                    warn!(attempt, error = %e, "reconnect attempt failed");
                    let mut sh = shared.lock().await;
                    sh.state = SessionState::Disconnected;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> SessionConfig {
        SessionConfig {
            session_id: "s-test".into(),
            ..Default::default()
        }
    }

    #[test]
    fn connect_url_carries_session_and_options() {
        let config = test_config();
        let url = config.connect_url();
        assert!(url.starts_with("ws://127.0.0.1:8787/session?session_id=s-test&"));
        assert!(url.contains("voice_style=neutral"));
        assert!(url.contains("output_mode=graphic_audio"));
    }

    #[test]
    fn backoff_is_linear_in_the_attempt_number() {
        let config = test_config();
        assert_eq!(config.reconnect_delay * 1, Duration::from_secs(1));
        assert_eq!(config.reconnect_delay * 2, Duration::from_secs(2));
        assert_eq!(config.reconnect_delay * 3, Duration::from_secs(3));
        assert_eq!(config.reconnect_attempts, 3);
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let session = CoachSession::new(test_config());
        session.disconnect().await;
        assert_eq!(session.state().await, SessionState::Disconnected);
        assert_eq!(session.reconnect_attempts().await, 0);
        session.disconnect().await;
        assert_eq!(session.state().await, SessionState::Disconnected);
        assert_eq!(session.reconnect_attempts().await, 0);
    }

    #[tokio::test]
    async fn status_notes_are_ignored_while_disconnected() {
        let session = CoachSession::new(test_config());
        session.note_status("recording").await;
        assert_eq!(session.state().await, SessionState::Disconnected);
    }

    #[tokio::test]
    async fn send_without_connection_is_not_connected() {
        let session = CoachSession::new(test_config());
        let err = session.send_user_feedback("hello").await.unwrap_err();
        assert!(matches!(err, SessionError::NotConnected));
    }
}
