use parking_lot::Mutex;
use std::io::ErrorKind;
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, TryRecvError};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

use tracing::{debug, error, info, warn};
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};

use crate::config::Config;
use crate::engine::scheduler::{Scheduler, TimerHandle};
use crate::error::ChannelError;
use crate::model::world_message::{decode_world_message, OutboundMessage, WorldMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    Closed,
}

/// What a transport reports back about its socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Text(String),
    Error(String),
    Closed,
}

pub type InboundSink = Arc<dyn Fn(Inbound) + Send + Sync>;

/// An open bidirectional message connection.
pub trait Connection: Send + Sync {
    fn send_text(&self, text: &str) -> Result<(), ChannelError>;
    fn is_open(&self) -> bool;
    fn close(&self);
}

/// Opens connections. `open` returns once the connection is usable; inbound
/// traffic and the final close are delivered through `sink`.
pub trait Connector: Send + Sync {
    fn open(&self, url: &str, sink: InboundSink) -> Result<Box<dyn Connection>, ChannelError>;
}

type MessageHandler = Arc<dyn Fn(WorldMessage) + Send + Sync>;

/* =========================
   Channel
   ========================= */

struct ChannelInner {
    /// Bumped on every connect and disconnect; callbacks carrying an older
    /// value belong to a discarded connection.
    generation: u64,
    state: ConnectionState,
    world_id: Option<String>,
    conn: Option<Arc<dyn Connection>>,
    keepalive: Option<TimerHandle>,
}

struct ChannelShared {
    ws_root: String,
    keepalive_interval: Duration,
    connector: Arc<dyn Connector>,
    scheduler: Arc<dyn Scheduler>,
    inner: Mutex<ChannelInner>,
}

/// Live event channel to one simulated world at a time. No automatic
/// reconnection: a dropped connection stays `Closed` until `connect` is
/// called again.
pub struct RealtimeChannel {
    shared: Arc<ChannelShared>,
}

/// Returned by [`RealtimeChannel::connect`]; reports on that one connection.
#[derive(Clone)]
pub struct ConnectionHandle {
    world_id: String,
    generation: u64,
    shared: Weak<ChannelShared>,
}

impl ConnectionHandle {
    pub fn world_id(&self) -> &str {
        &self.world_id
    }

    /// State of this connection. Once superseded or disconnected it reads
    /// `Disconnected`.
    pub fn state(&self) -> ConnectionState {
        let Some(shared) = self.shared.upgrade() else {
            return ConnectionState::Disconnected;
        };
        let inner = shared.inner.lock();
        if inner.generation == self.generation {
            inner.state
        } else {
            ConnectionState::Disconnected
        }
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }
}

impl RealtimeChannel {
    pub fn new(config: &Config, connector: Arc<dyn Connector>, scheduler: Arc<dyn Scheduler>) -> Self {
        Self {
            shared: Arc::new(ChannelShared {
                ws_root: config.ws_root(),
                keepalive_interval: config.keepalive_interval,
                connector,
                scheduler,
                inner: Mutex::new(ChannelInner {
                    generation: 0,
                    state: ConnectionState::Disconnected,
                    world_id: None,
                    conn: None,
                    keepalive: None,
                }),
            }),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.inner.lock().state
    }

    pub fn world_id(&self) -> Option<String> {
        self.shared.inner.lock().world_id.clone()
    }

    /// Close any existing connection, then connect to `world_id`.
    ///
    /// Connection failures are logged and leave the channel `Closed`; the
    /// returned handle reports that state.
    pub fn connect<F>(&self, world_id: &str, on_message: F) -> ConnectionHandle
    where
        F: Fn(WorldMessage) + Send + Sync + 'static,
    {
        self.disconnect();

        let shared = &self.shared;
        let generation = {
            let mut inner = shared.inner.lock();
            inner.generation += 1;
            inner.state = ConnectionState::Connecting;
            inner.world_id = Some(world_id.to_string());
            inner.generation
        };

        let handle = ConnectionHandle {
            world_id: world_id.to_string(),
            generation,
            shared: Arc::downgrade(shared),
        };

        let url = format!("{}/ws/{}", shared.ws_root, world_id);
        info!(%url, world_id, "connecting to world");

        let sink = inbound_sink(Arc::downgrade(shared), generation, Arc::new(on_message));

        let conn: Arc<dyn Connection> = match shared.connector.open(&url, sink) {
            Ok(conn) => Arc::from(conn),
            Err(e) => {
                error!(world_id, error = %e, "failed to connect to world");
                shared.mark_closed(generation);
                return handle;
            }
        };

        {
            let mut inner = shared.inner.lock();
            if inner.generation != generation || inner.state != ConnectionState::Connecting {
                drop(inner);
                debug!(world_id, "connection superseded while opening");
                conn.close();
                return handle;
            }
            inner.state = ConnectionState::Open;
            inner.conn = Some(conn);
        }

        info!(world_id, "connected to world");
        if shared.send_ping(generation) {
            ChannelShared::schedule_keepalive(shared, generation);
        }
        handle
    }

    /// Close the active connection, if any. Safe to call repeatedly.
    pub fn disconnect(&self) {
        let (conn, keepalive, world_id) = {
            let mut inner = self.shared.inner.lock();
            if inner.state == ConnectionState::Disconnected && inner.conn.is_none() {
                return;
            }
            inner.generation += 1;
            inner.state = ConnectionState::Disconnected;
            (inner.conn.take(), inner.keepalive.take(), inner.world_id.take())
        };

        if let Some(timer) = keepalive {
            timer.cancel();
        }
        if let Some(conn) = conn {
            if conn.is_open() {
                conn.close();
            }
        }
        info!(world_id = world_id.as_deref().unwrap_or(""), "disconnected from world");
    }

    pub fn send(&self, message: &OutboundMessage) -> Result<(), ChannelError> {
        let conn = {
            let inner = self.shared.inner.lock();
            match (&inner.state, &inner.conn) {
                (ConnectionState::Open, Some(conn)) => conn.clone(),
                _ => return Err(ChannelError::NotOpen),
            }
        };
        let text = serde_json::to_string(message)?;
        conn.send_text(&text)
    }

    /// Ask the backend to push the current world state. Returns false when
    /// the channel is not open.
    pub fn request_world_state(&self) -> bool {
        match self.send(&OutboundMessage::RequestState) {
            Ok(()) => true,
            Err(e) => {
                debug!(error = %e, "world state not requested");
                false
            }
        }
    }
}

impl Drop for RealtimeChannel {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl ChannelShared {
    fn is_current(&self, generation: u64) -> bool {
        self.inner.lock().generation == generation
    }

    fn mark_closed(&self, generation: u64) {
        let (keepalive, conn) = {
            let mut inner = self.inner.lock();
            if inner.generation != generation || inner.state == ConnectionState::Closed {
                return;
            }
            inner.state = ConnectionState::Closed;
            (inner.keepalive.take(), inner.conn.take())
        };
        if let Some(timer) = keepalive {
            timer.cancel();
        }
        drop(conn);
        info!("world connection closed");
    }

    /// Sends a ping if this generation is still open. Returns whether the
    /// connection is worth pinging again later.
    fn send_ping(&self, generation: u64) -> bool {
        let conn = {
            let inner = self.inner.lock();
            if inner.generation != generation || inner.state != ConnectionState::Open {
                return false;
            }
            match &inner.conn {
                Some(conn) => conn.clone(),
                None => return false,
            }
        };

        if !conn.is_open() {
            self.mark_closed(generation);
            return false;
        }

        match serde_json::to_string(&OutboundMessage::Ping) {
            Ok(text) => match conn.send_text(&text) {
                Ok(()) => debug!("keepalive ping sent"),
                Err(e) => warn!(error = %e, "keepalive ping failed"),
            },
            Err(e) => warn!(error = %e, "cannot encode ping"),
        }
        true
    }

    fn schedule_keepalive(shared: &Arc<ChannelShared>, generation: u64) {
        let weak = Arc::downgrade(shared);
        let timer = shared.scheduler.schedule(
            shared.keepalive_interval,
            Box::new(move || {
                let Some(shared) = weak.upgrade() else {
                    return;
                };
                if shared.send_ping(generation) {
                    ChannelShared::schedule_keepalive(&shared, generation);
                }
            }),
        );

        let mut inner = shared.inner.lock();
        if inner.generation == generation && inner.state == ConnectionState::Open {
            inner.keepalive = Some(timer);
        } else {
            timer.cancel();
        }
    }
}

fn inbound_sink(weak: Weak<ChannelShared>, generation: u64, handler: MessageHandler) -> InboundSink {
    Arc::new(move |event| {
        let Some(shared) = weak.upgrade() else {
            return;
        };
        match event {
            Inbound::Text(text) => {
                if !shared.is_current(generation) {
                    return;
                }
                match decode_world_message(&text) {
                    Ok(message) => {
                        debug!(event_type = message.event_type(), "world message received");
                        handler(message);
                    }
                    Err(e) => warn!(error = %e, "dropping malformed world message"),
                }
            }
            Inbound::Error(reason) => error!(%reason, "world connection error"),
            Inbound::Closed => shared.mark_closed(generation),
        }
    })
}

/* =========================
   tungstenite transport
   ========================= */

enum Outgoing {
    Text(String),
    Close,
}

struct WsConnection {
    tx: mpsc::Sender<Outgoing>,
    open: Arc<AtomicBool>,
}

impl Connection for WsConnection {
    fn send_text(&self, text: &str) -> Result<(), ChannelError> {
        if !self.is_open() {
            return Err(ChannelError::NotOpen);
        }
        self.tx
            .send(Outgoing::Text(text.to_string()))
            .map_err(|_| ChannelError::Send("socket worker has stopped".into()))
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
        let _ = self.tx.send(Outgoing::Close);
    }
}

/// WebSocket connector. Each connection gets a worker thread that owns the
/// socket and alternates between flushing outgoing frames and polling for
/// inbound ones.
pub struct WsConnector {
    poll_interval: Duration,
}

impl WsConnector {
    pub fn new() -> Self {
        Self {
            poll_interval: Duration::from_millis(50),
        }
    }
}

impl Default for WsConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl Connector for WsConnector {
    fn open(&self, url: &str, sink: InboundSink) -> Result<Box<dyn Connection>, ChannelError> {
        let connect_err = |reason: String| ChannelError::Connect {
            url: url.to_string(),
            reason,
        };

        let (socket, _response) =
            tungstenite::connect(url).map_err(|e| connect_err(e.to_string()))?;

        // Reads must time out or queued frames would wait for inbound traffic.
        tcp_stream(&socket)
            .ok_or_else(|| connect_err("unsupported stream type".into()))?
            .set_read_timeout(Some(self.poll_interval))
            .map_err(|e| connect_err(e.to_string()))?;

        let (tx, rx) = mpsc::channel();
        let open = Arc::new(AtomicBool::new(true));
        let worker_open = open.clone();

        thread::Builder::new()
            .name("spelltale-ws".into())
            .spawn(move || run_socket(socket, rx, sink, worker_open))
            .map_err(|e| connect_err(e.to_string()))?;

        Ok(Box::new(WsConnection { tx, open }))
    }
}

/// The TCP socket under a plain or TLS WebSocket stream.
fn tcp_stream(socket: &WebSocket<MaybeTlsStream<TcpStream>>) -> Option<&TcpStream> {
    match socket.get_ref() {
        MaybeTlsStream::Plain(stream) => Some(stream),
        MaybeTlsStream::Rustls(stream) => Some(&stream.sock),
        _ => None,
    }
}

fn run_socket(
    mut socket: WebSocket<MaybeTlsStream<TcpStream>>,
    rx: mpsc::Receiver<Outgoing>,
    sink: InboundSink,
    open: Arc<AtomicBool>,
) {
    'outer: loop {
        loop {
            match rx.try_recv() {
                Ok(Outgoing::Text(text)) => {
                    if let Err(e) = socket.send(Message::Text(text)) {
                        sink(Inbound::Error(e.to_string()));
                        break 'outer;
                    }
                }
                Ok(Outgoing::Close) | Err(TryRecvError::Disconnected) => {
                    let _ = socket.close(None);
                    let _ = socket.flush();
                    break 'outer;
                }
                Err(TryRecvError::Empty) => break,
            }
        }

        match socket.read() {
            Ok(Message::Text(text)) => sink(Inbound::Text(text)),
            Ok(Message::Close(_)) => {
                let _ = socket.flush();
                break;
            }
            Ok(_) => {}
            Err(tungstenite::Error::Io(e))
                if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => break,
            Err(e) => {
                sink(Inbound::Error(e.to_string()));
                break;
            }
        }
    }

    open.store(false, Ordering::SeqCst);
    sink(Inbound::Closed);
}
