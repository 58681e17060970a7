//! Keep-alive timers for an open session
//!
//! Both timers live inside the driver's `select!` loop rather than in their
//! own tasks, so a tick can never race the session it belongs to:
//!
//! ```text
//! select! {
//!     frame     = stream.next()     => ... watchdog.reset()
//!     payload   = heartbeat.tick()  => sink.send(payload)
//!     _         = watchdog.expired() => session is stale, reconnect
//! }
//! ```
//!
//! A disabled timer is a future that never completes.

use crate::codec::WsMessage;
use crate::config::HeartbeatConfig;
use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::debug;

/// Periodic heartbeat frame source
pub struct Heartbeat {
    ticker: Option<(Interval, WsMessage)>,
}

impl Heartbeat {
    /// Start ticking one full interval from now
    pub fn new(config: Option<&HeartbeatConfig>) -> Self {
        let ticker = config.map(|config| {
            let period = config.interval();
            let mut ticker = interval_at(Instant::now() + period, period);
            // If we miss ticks due to slow processing, skip them rather than bursting
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            debug!("Heartbeat started with interval: {:?}", period);
            (ticker, config.message())
        });
        Self { ticker }
    }

    /// Wait for the next tick and return the payload to send
    pub async fn tick(&mut self) -> WsMessage {
        match self.ticker.as_mut() {
            Some((ticker, payload)) => {
                ticker.tick().await;
                payload.clone()
            }
            None => std::future::pending().await,
        }
    }
}

/// Fires when no inbound frame has arrived for the configured duration
pub struct IdleWatchdog {
    timeout: Option<Duration>,
    deadline: Instant,
}

impl IdleWatchdog {
    pub fn new(timeout: Option<Duration>) -> Self {
        let deadline = Instant::now() + timeout.unwrap_or_default();
        Self { timeout, deadline }
    }

    /// Record inbound activity
    pub fn reset(&mut self) {
        if let Some(timeout) = self.timeout {
            self.deadline = Instant::now() + timeout;
        }
    }

    /// Completes once the deadline passes without a reset
    pub async fn expired(&self) {
        match self.timeout {
            Some(_) => tokio::time::sleep_until(self.deadline).await,
            None => std::future::pending().await,
        }
    }
}
