//! Common test utilities for marketstream integration tests
//!
//! - `MockTransport`: scripted in-memory transport (failing opens, inbound
//!   frames, dropped sessions, recorded outbound frames)
//! - `MockWsServer`: real WebSocket server on `127.0.0.1:0`
//! - `wait_until`: poll a condition with a deadline

#![allow(dead_code)]

use async_trait::async_trait;
use futures::channel::mpsc;
use futures::StreamExt;
use marketstream::{
    BackoffConfig, Feed, FrameSink, StreamConfig, StreamError, Transport, TransportSession,
    WsMessage,
};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, watch, Notify};

/// Macro for verbose test output (controlled by TEST_VERBOSE env var)
#[macro_export]
macro_rules! verbose_println {
    ($($arg:tt)*) => {
        if std::env::var("TEST_VERBOSE").is_ok() {
            println!($($arg)*);
        }
    };
}

/// Config with millisecond backoff so reconnect tests stay fast
pub fn fast_config() -> StreamConfig {
    StreamConfig {
        initial_attempts: 3,
        backoff: BackoffConfig {
            initial_delay_ms: 10,
            max_delay_ms: 40,
            jitter: 0.0,
        },
        ..StreamConfig::default()
    }
}

/// Poll `condition` every few milliseconds until it holds or `timeout` passes
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

pub fn quote_frame(symbol: &str, bid: f64, ask: f64) -> WsMessage {
    WsMessage::Text(format!(
        r#"[{{"T":"q","S":"{}","bp":{},"ap":{},"t":"2024-03-01T15:30:00Z"}}]"#,
        symbol, bid, ask
    ))
}

pub fn trade_frame(symbol: &str, price: f64) -> WsMessage {
    WsMessage::Text(format!(
        r#"[{{"T":"t","S":"{}","p":{},"t":"2024-03-01T15:30:01Z"}}]"#,
        symbol, price
    ))
}

/// Symbols listed under `quotes` in a subscribe frame
pub fn subscribed_symbols(frame: &str) -> Vec<String> {
    let value: serde_json::Value = serde_json::from_str(frame).unwrap();
    value["quotes"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s.as_str().unwrap().to_string())
        .collect()
}

#[derive(Default)]
struct MockState {
    fail_next: usize,
    fail_all: bool,
    open_delay: Option<Duration>,
    feeds: Vec<Feed>,
    /// (session index, frame), session index is the 1-based successful open
    sent: Vec<(usize, WsMessage)>,
    sessions: usize,
    inbound: Option<mpsc::UnboundedSender<marketstream::Result<WsMessage>>>,
}

/// Scripted in-memory transport
#[derive(Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
    opens: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fail the next `n` opens
    pub fn fail_next_opens(&self, n: usize) {
        self.state.lock().fail_next = n;
    }

    /// Fail every open until switched off
    pub fn set_fail_all(&self, fail: bool) {
        self.state.lock().fail_all = fail;
    }

    pub fn set_open_delay(&self, delay: Duration) {
        self.state.lock().open_delay = Some(delay);
    }

    /// Number of `open()` calls, failed ones included
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Number of sessions that opened successfully
    pub fn session_count(&self) -> usize {
        self.state.lock().sessions
    }

    pub fn feeds(&self) -> Vec<Feed> {
        self.state.lock().feeds.clone()
    }

    /// Text frames sent upstream, tagged with their session index
    pub fn sent_text(&self) -> Vec<(usize, String)> {
        self.state
            .lock()
            .sent
            .iter()
            .filter_map(|(session, frame)| frame.as_text().map(|t| (*session, t.to_string())))
            .collect()
    }

    /// Deliver an inbound frame on the current session
    pub fn push(&self, frame: WsMessage) -> bool {
        match self.state.lock().inbound.as_ref() {
            Some(tx) => tx.unbounded_send(Ok(frame)).is_ok(),
            None => false,
        }
    }

    /// End the current session as if the peer closed it
    pub fn drop_session(&self) {
        self.state.lock().inbound = None;
    }

    /// Fail the current session with a transport error
    pub fn fail_session(&self, reason: &str) {
        if let Some(tx) = self.state.lock().inbound.take() {
            let _ = tx.unbounded_send(Err(StreamError::WebSocket(reason.to_string())));
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(&self, feed: Feed) -> marketstream::Result<TransportSession> {
        self.opens.fetch_add(1, Ordering::SeqCst);

        let delay = self.state.lock().open_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock();
        state.feeds.push(feed);
        if state.fail_all || state.fail_next > 0 {
            state.fail_next = state.fail_next.saturating_sub(1);
            return Err(StreamError::WebSocket("connection refused".into()));
        }

        state.sessions += 1;
        let (tx, rx) = mpsc::unbounded();
        state.inbound = Some(tx);

        let sink = MockSink {
            session: state.sessions,
            state: Arc::clone(&self.state),
        };
        Ok(TransportSession::new(Box::new(sink), rx.boxed()))
    }
}

struct MockSink {
    session: usize,
    state: Arc<Mutex<MockState>>,
}

#[async_trait]
impl FrameSink for MockSink {
    async fn send(&mut self, message: WsMessage) -> marketstream::Result<()> {
        self.state.lock().sent.push((self.session, message));
        Ok(())
    }

    async fn close(&mut self) -> marketstream::Result<()> {
        Ok(())
    }
}

/// A mock WebSocket server that records what clients send and broadcasts
/// scripted frames to every connected client
pub struct MockWsServer {
    pub addr: SocketAddr,
    received: Arc<Mutex<Vec<String>>>,
    paths: Arc<Mutex<Vec<String>>>,
    connections: Arc<AtomicUsize>,
    outbound: broadcast::Sender<String>,
    kick: Arc<watch::Sender<u64>>,
    shutdown: Arc<Notify>,
}

impl MockWsServer {
    /// Create and start a new mock WebSocket server
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = Arc::new(Notify::new());
        let kick = Arc::new(watch::channel(0u64).0);
        let received = Arc::new(Mutex::new(Vec::new()));
        let paths = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(AtomicUsize::new(0));
        let (outbound, _) = broadcast::channel(64);

        let server = Self {
            addr,
            received: Arc::clone(&received),
            paths: Arc::clone(&paths),
            connections: Arc::clone(&connections),
            outbound: outbound.clone(),
            kick: Arc::clone(&kick),
            shutdown: Arc::clone(&shutdown),
        };

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, _)) => {
                                let conn = Connection {
                                    received: Arc::clone(&received),
                                    paths: Arc::clone(&paths),
                                    outbound: outbound.subscribe(),
                                    kick: kick.subscribe(),
                                    shutdown: Arc::clone(&shutdown),
                                };
                                connections.fetch_add(1, Ordering::SeqCst);
                                tokio::spawn(conn.run(stream));
                            }
                            Err(e) => {
                                eprintln!("Accept error: {}", e);
                                break;
                            }
                        }
                    }
                    _ = shutdown.notified() => {
                        break;
                    }
                }
            }
        });

        server
    }

    /// Base URL; the client appends the feed segment
    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Text frames received from clients, in arrival order
    pub fn received(&self) -> Vec<String> {
        self.received.lock().clone()
    }

    /// Request paths of accepted handshakes
    pub fn paths(&self) -> Vec<String> {
        self.paths.lock().clone()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Send a text frame to every connected client
    pub fn broadcast(&self, frame: &str) {
        let _ = self.outbound.send(frame.to_string());
    }

    /// Drop every open client connection; the listener keeps accepting
    pub fn kick_all(&self) {
        self.kick.send_modify(|generation| *generation += 1);
    }

    /// Shutdown the server
    pub fn shutdown(&self) {
        self.shutdown.notify_waiters();
    }
}

impl Drop for MockWsServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct Connection {
    received: Arc<Mutex<Vec<String>>>,
    paths: Arc<Mutex<Vec<String>>>,
    outbound: broadcast::Receiver<String>,
    kick: watch::Receiver<u64>,
    shutdown: Arc<Notify>,
}

impl Connection {
    async fn run(mut self, stream: tokio::net::TcpStream) {
        use futures::SinkExt;
        use tokio_tungstenite::accept_hdr_async;
        use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
        use tokio_tungstenite::tungstenite::Message;

        let paths = Arc::clone(&self.paths);
        let record_path = move |request: &Request, response: Response| {
            paths.lock().push(request.uri().path().to_string());
            Ok::<Response, ErrorResponse>(response)
        };

        let ws_stream = match accept_hdr_async(stream, record_path).await {
            Ok(ws) => ws,
            Err(e) => {
                eprintln!("WebSocket handshake failed: {}", e);
                return;
            }
        };

        let (mut write, mut read) = ws_stream.split();

        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            self.received.lock().push(text);
                        }
                        Some(Ok(msg)) if msg.is_close() => break,
                        Some(Ok(_)) => {}
                        Some(Err(_)) | None => break,
                    }
                }
                frame = self.outbound.recv() => {
                    match frame {
                        Ok(text) => {
                            if write.send(Message::Text(text)).await.is_err() {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(_)) => {}
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
                _ = self.kick.changed() => {
                    let _ = write.close().await;
                    break;
                }
                _ = self.shutdown.notified() => {
                    break;
                }
            }
        }
    }
}
