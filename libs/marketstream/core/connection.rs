//! Connection lifecycle for the upstream market-data stream
//!
//! # Architecture
//!
//! ```text
//! initialize() ──spawn──> driver task (one per run)
//!                            │
//!                            ├─ open(feed) ── fail ──> Error ──backoff──┐
//!                            │      │                                   │
//!                            │      └─ ok ──> Connected ── session loop │
//!                            │                  │  inbound frames ──> handler.on_message
//!                            │                  │  outbound queue ──> sink (session-tagged)
//!                            │                  │  heartbeat / idle watchdog
//!                            │                  └─ lost ──> Reconnecting ──backoff──┐
//!                            └──────────────── Connecting <─────────────────────────┘
//! disconnect() ── cancel watch ──> every await point of the driver
//! ```
//!
//! State transitions are applied under the lifecycle lock and only if the
//! run that produced them is still the active one. Handler callbacks run
//! after the lock is released, gated on the run's `retired` flag, so a
//! callback may block or call back into the manager freely. `disconnect()`
//! retires the run under the lock and returns without waiting for a callback
//! that is already executing; no callback starts after it returns.

use crate::codec::WsMessage;
use crate::config::{HeartbeatConfig, StreamConfig};
use crate::connection_state::{AtomicConnectionState, ConnectionState};
use crate::error::{Result, StreamError};
use crate::heartbeat::{Heartbeat, IdleWatchdog};
use crate::reconnect::ReconnectionStrategy;
use crate::transport::{Feed, Transport, TransportSession};
use futures::StreamExt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, error, info, warn};

/// Identifies one open transport session; never reused
pub type SessionId = u64;

/// Frame queued for a specific session
#[derive(Debug)]
pub struct OutboundFrame {
    pub session: SessionId,
    pub message: WsMessage,
}

/// Cloneable handle for queueing frames onto the driver
///
/// Frames are tagged with the session they were built for. The driver drops
/// frames whose session has already closed.
#[derive(Clone)]
pub struct SessionSender {
    tx: mpsc::UnboundedSender<OutboundFrame>,
}

impl SessionSender {
    #[cfg(test)]
    pub(crate) fn channel() -> (Self, mpsc::UnboundedReceiver<OutboundFrame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn send(&self, session: SessionId, message: WsMessage) -> Result<()> {
        self.tx
            .send(OutboundFrame { session, message })
            .map_err(|e| StreamError::ChannelSend(e.to_string()))
    }
}

/// Receives lifecycle and data events from the driver
///
/// Called synchronously from the driver, one at a time, without any manager
/// lock held. The final `Disconnected` notification comes from the thread
/// that called `disconnect()`.
pub trait ConnectionHandler: Send + Sync + 'static {
    /// A state transition happened
    fn on_state_change(&self, state: ConnectionState);

    /// A session opened; the returned frame is sent before anything else
    fn on_session_open(&self, session: SessionId) -> Option<WsMessage>;

    /// A session ended (lost or shut down)
    fn on_session_closed(&self, session: SessionId);

    /// An inbound frame arrived
    fn on_message(&self, message: WsMessage);
}

/// Outcome of the first connection attempt of a run
#[derive(Debug, Clone)]
enum InitStatus {
    Pending,
    Connected,
    Failed { attempts: usize, reason: String },
}

/// One `initialize()` .. `disconnect()` cycle
struct Run {
    id: u64,
    handler: Arc<dyn ConnectionHandler>,
    retired: Arc<AtomicBool>,
    cancel: watch::Sender<bool>,
    status: watch::Receiver<InitStatus>,
}

#[derive(Default)]
struct Lifecycle {
    next_run: u64,
    run: Option<Run>,
}

struct Shared {
    transport: Arc<dyn Transport>,
    strategy: Box<dyn ReconnectionStrategy>,
    initial_attempts: usize,
    heartbeat: Option<HeartbeatConfig>,
    idle_timeout: Option<Duration>,
    state: AtomicConnectionState,
    /// Never held across a handler call
    lifecycle: parking_lot::Mutex<Lifecycle>,
    /// Held by the active driver for the whole run
    outbound: Mutex<mpsc::UnboundedReceiver<OutboundFrame>>,
    next_session: AtomicU64,
}

/// Handler of a run, detached from the lifecycle lock
struct ActiveRun {
    handler: Arc<dyn ConnectionHandler>,
    retired: Arc<AtomicBool>,
}

impl ActiveRun {
    /// Call into the handler unless the run was retired in the meantime
    fn dispatch<T>(&self, f: impl FnOnce(&Arc<dyn ConnectionHandler>) -> T) -> Option<T> {
        if self.retired.load(Ordering::Acquire) {
            return None;
        }
        Some(f(&self.handler))
    }
}

impl Shared {
    /// Clone the handler of `run_id` if it is still the active run, applying
    /// `state` under the same lock
    fn claim(&self, run_id: u64, state: Option<ConnectionState>) -> Option<ActiveRun> {
        let lifecycle = self.lifecycle.lock();
        let run = lifecycle.run.as_ref().filter(|run| run.id == run_id)?;
        if let Some(state) = state {
            self.state.set(state);
            debug!("Connection state -> {}", state);
        }
        Some(ActiveRun {
            handler: Arc::clone(&run.handler),
            retired: Arc::clone(&run.retired),
        })
    }

    /// Run `f` with the handler, if `run_id` is still the active run
    fn with_active_run<T>(
        &self,
        run_id: u64,
        f: impl FnOnce(&Arc<dyn ConnectionHandler>) -> T,
    ) -> Option<T> {
        self.claim(run_id, None)?.dispatch(f)
    }

    /// Move to `state` and notify, if `run_id` is still the active run
    fn transition(&self, run_id: u64, state: ConnectionState) -> bool {
        self.claim(run_id, Some(state))
            .and_then(|run| run.dispatch(|handler| handler.on_state_change(state)))
            .is_some()
    }
}

/// Owns the transport and drives the connection state machine
pub struct ConnectionManager {
    shared: Arc<Shared>,
    outbound_tx: mpsc::UnboundedSender<OutboundFrame>,
}

impl ConnectionManager {
    /// Create a manager using the exponential backoff from `config`
    pub fn new(transport: Arc<dyn Transport>, config: &StreamConfig) -> Self {
        Self::with_strategy(transport, Box::new(config.backoff.strategy()), config)
    }

    /// Create a manager with a custom reconnection strategy
    pub fn with_strategy(
        transport: Arc<dyn Transport>,
        strategy: Box<dyn ReconnectionStrategy>,
        config: &StreamConfig,
    ) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        let shared = Arc::new(Shared {
            transport,
            strategy,
            initial_attempts: config.initial_attempts.max(1),
            heartbeat: config.heartbeat.clone(),
            idle_timeout: config.idle_timeout(),
            state: AtomicConnectionState::default(),
            lifecycle: parking_lot::Mutex::new(Lifecycle::default()),
            outbound: Mutex::new(outbound_rx),
            next_session: AtomicU64::new(0),
        });

        Self { shared, outbound_tx }
    }

    /// Handle for queueing frames onto open sessions
    pub fn session_sender(&self) -> SessionSender {
        SessionSender {
            tx: self.outbound_tx.clone(),
        }
    }

    #[inline]
    pub fn state(&self) -> ConnectionState {
        self.shared.state.get()
    }

    /// Start a connection run, or join the one already in flight
    ///
    /// Resolves once the run first reaches `Connected`. If the run fails
    /// `initial_attempts` opens before ever connecting, this returns
    /// `InitializationFailed` while the run keeps retrying in the background.
    pub async fn initialize(&self, feed: Feed, handler: Arc<dyn ConnectionHandler>) -> Result<()> {
        let mut status = self.start_or_join(feed, handler);

        loop {
            let current = (*status.borrow_and_update()).clone();
            match current {
                InitStatus::Connected => return Ok(()),
                InitStatus::Failed { attempts, reason } => {
                    return Err(StreamError::InitializationFailed { attempts, reason })
                }
                InitStatus::Pending => {}
            }

            // The driver drops its status sender when the run is cancelled
            if status.changed().await.is_err() {
                return Err(StreamError::Disconnected);
            }
        }
    }

    fn start_or_join(
        &self,
        feed: Feed,
        handler: Arc<dyn ConnectionHandler>,
    ) -> watch::Receiver<InitStatus> {
        let (run_id, cancel_rx, status_tx, status_rx) = {
            let mut lifecycle = self.shared.lifecycle.lock();
            if let Some(run) = lifecycle.run.as_ref() {
                debug!("Joining in-flight connection run {}", run.id);
                return run.status.clone();
            }

            lifecycle.next_run += 1;
            let run_id = lifecycle.next_run;
            let (cancel_tx, cancel_rx) = watch::channel(false);
            let (status_tx, status_rx) = watch::channel(InitStatus::Pending);

            lifecycle.run = Some(Run {
                id: run_id,
                handler: Arc::clone(&handler),
                retired: Arc::new(AtomicBool::new(false)),
                cancel: cancel_tx,
                status: status_rx.clone(),
            });
            (run_id, cancel_rx, status_tx, status_rx)
        };

        info!("Starting market-data stream (feed: {}, run {})", feed, run_id);
        self.shared.transition(run_id, ConnectionState::Connecting);

        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            run_driver(shared, run_id, feed, handler, cancel_rx, status_tx).await;
        });

        status_rx
    }

    /// Close the transport and stop reconnecting
    ///
    /// Safe to call at any time, including from inside a handler callback.
    /// Does not wait for a callback that is already executing.
    pub fn disconnect(&self) {
        let (run, notify) = {
            let mut lifecycle = self.shared.lifecycle.lock();
            let Some(run) = lifecycle.run.take() else {
                debug!("disconnect() without an active run");
                return;
            };
            run.retired.store(true, Ordering::Release);
            let _ = run.cancel.send(true);

            let notify = self.shared.state.get() != ConnectionState::Disconnected;
            self.shared.state.set(ConnectionState::Disconnected);
            (run, notify)
        };

        info!("Disconnecting market-data stream (run {})", run.id);
        if notify {
            run.handler.on_state_change(ConnectionState::Disconnected);
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Completes once the run is cancelled
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow_and_update() {
            return;
        }
        if cancel.changed().await.is_err() {
            return;
        }
    }
}

/// Main driver loop for one run
async fn run_driver(
    shared: Arc<Shared>,
    run_id: u64,
    feed: Feed,
    handler: Arc<dyn ConnectionHandler>,
    mut cancel: watch::Receiver<bool>,
    status: watch::Sender<InitStatus>,
) {
    // A previous run may still be unwinding; wait for it to let go of the queue
    let mut outbound = tokio::select! {
        biased;
        _ = cancelled(&mut cancel) => return,
        guard = shared.outbound.lock() => guard,
    };

    let mut attempt = 0usize;
    let mut failures_before_connect = 0usize;
    let mut connected_once = false;
    let mut first_attempt = true;

    loop {
        if !first_attempt && !shared.transition(run_id, ConnectionState::Connecting) {
            break;
        }
        first_attempt = false;

        let opened = tokio::select! {
            biased;
            _ = cancelled(&mut cancel) => break,
            result = shared.transport.open(feed) => result,
        };

        match opened {
            Ok(mut session) => {
                attempt = 0;
                connected_once = true;
                let session_id = shared.next_session.fetch_add(1, Ordering::Relaxed) + 1;

                let resubscribe = shared
                    .claim(run_id, Some(ConnectionState::Connected))
                    .and_then(|run| {
                        run.dispatch(|handler| {
                            handler.on_state_change(ConnectionState::Connected);
                            handler.on_session_open(session_id)
                        })
                    });
                let Some(resubscribe) = resubscribe else {
                    let _ = session.sink.close().await;
                    break;
                };

                info!("Connected to market-data stream (feed: {}, session {})", feed, session_id);
                status.send_replace(InitStatus::Connected);

                let end = drive_session(
                    &shared,
                    run_id,
                    session_id,
                    session,
                    resubscribe,
                    &mut outbound,
                    &mut cancel,
                )
                .await;
                handler.on_session_closed(session_id);

                match end {
                    SessionEnd::Cancelled => break,
                    SessionEnd::Lost(reason) => {
                        warn!("Market-data session {} lost: {}", session_id, reason);
                        if !shared.transition(run_id, ConnectionState::Reconnecting) {
                            break;
                        }
                    }
                }
            }
            Err(e) => {
                warn!("Failed to open market-data stream (feed: {}): {}", feed, e);
                if !shared.transition(run_id, ConnectionState::Error) {
                    break;
                }

                if !connected_once {
                    failures_before_connect += 1;
                    if failures_before_connect == shared.initial_attempts {
                        error!(
                            "Initial connection failed after {} attempts, retrying in background",
                            failures_before_connect
                        );
                        status.send_replace(InitStatus::Failed {
                            attempts: failures_before_connect,
                            reason: e.to_string(),
                        });
                    }
                }
            }
        }

        let delay = shared.strategy.next_delay(attempt);
        attempt += 1;
        info!("Reconnecting in {:?} (attempt {})", delay, attempt);

        tokio::select! {
            biased;
            _ = cancelled(&mut cancel) => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    debug!("Connection driver for run {} exiting", run_id);
}

enum SessionEnd {
    Cancelled,
    Lost(String),
}

enum SessionEvent {
    Inbound(Option<Result<WsMessage>>),
    Outbound(Option<OutboundFrame>),
    Heartbeat(WsMessage),
    Idle,
    Cancelled,
}

/// Pump one open session until it ends
async fn drive_session(
    shared: &Shared,
    run_id: u64,
    session_id: SessionId,
    session: TransportSession,
    resubscribe: Option<WsMessage>,
    outbound: &mut mpsc::UnboundedReceiver<OutboundFrame>,
    cancel: &mut watch::Receiver<bool>,
) -> SessionEnd {
    let TransportSession { mut sink, mut stream } = session;

    if let Some(frame) = resubscribe {
        debug!("Sending full resubscribe on session {}", session_id);
        if let Err(e) = sink.send(frame).await {
            return SessionEnd::Lost(e.to_string());
        }
    }

    let mut heartbeat = Heartbeat::new(shared.heartbeat.as_ref());
    let mut watchdog = IdleWatchdog::new(shared.idle_timeout);

    loop {
        let event = tokio::select! {
            biased;
            _ = cancelled(cancel) => SessionEvent::Cancelled,
            frame = stream.next() => SessionEvent::Inbound(frame),
            queued = outbound.recv() => SessionEvent::Outbound(queued),
            payload = heartbeat.tick() => SessionEvent::Heartbeat(payload),
            _ = watchdog.expired() => SessionEvent::Idle,
        };

        match event {
            SessionEvent::Inbound(Some(Ok(message))) => {
                watchdog.reset();
                if shared
                    .with_active_run(run_id, |handler| handler.on_message(message))
                    .is_none()
                {
                    let _ = sink.close().await;
                    return SessionEnd::Cancelled;
                }
            }
            SessionEvent::Inbound(Some(Err(e))) => return SessionEnd::Lost(e.to_string()),
            SessionEvent::Inbound(None) => return SessionEnd::Lost("stream ended".into()),
            SessionEvent::Outbound(Some(frame)) => {
                if frame.session != session_id {
                    debug!("Dropping frame queued for closed session {}", frame.session);
                    continue;
                }
                if let Err(e) = sink.send(frame.message).await {
                    return SessionEnd::Lost(e.to_string());
                }
            }
            SessionEvent::Outbound(None) => {
                debug!("Outbound queue closed, shutting session down");
                let _ = sink.close().await;
                return SessionEnd::Cancelled;
            }
            SessionEvent::Heartbeat(payload) => {
                debug!("Heartbeat tick on session {}", session_id);
                if let Err(e) = sink.send(payload).await {
                    return SessionEnd::Lost(format!("failed to send heartbeat: {}", e));
                }
            }
            SessionEvent::Idle => {
                let _ = sink.close().await;
                return SessionEnd::Lost(format!(
                    "no inbound frames for {:?}",
                    shared.idle_timeout.unwrap_or_default()
                ));
            }
            SessionEvent::Cancelled => {
                let _ = sink.close().await;
                return SessionEnd::Cancelled;
            }
        }
    }
}
