//! Desired symbol set and upstream subscription reconciliation
//!
//! The registry is the only writer of the upstream-subscribed set. Every
//! mutation happens under one lock, so a `subscribe()` racing with a session
//! open either lands in the full resubscribe frame or is sent as a delta on
//! the new session, never both and never neither.

use crate::codec::{QuoteCodec, WsMessage};
use crate::connection::{SessionId, SessionSender};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Canonical form of a ticker symbol: trimmed and uppercase
pub fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}

#[derive(Debug, Default)]
struct RegistryState {
    desired: BTreeSet<String>,
    upstream: BTreeSet<String>,
    session: Option<SessionId>,
}

pub struct SubscriptionRegistry {
    state: Mutex<RegistryState>,
    sender: SessionSender,
    codec: Arc<dyn QuoteCodec>,
}

impl SubscriptionRegistry {
    pub fn new(sender: SessionSender, codec: Arc<dyn QuoteCodec>) -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
            sender,
            codec,
        }
    }

    /// Add symbols to the desired set
    ///
    /// While a session is open, symbols not yet subscribed upstream go out
    /// as one incremental frame. Returns the symbols that were sent, sorted.
    pub fn subscribe<I, S>(&self, symbols: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut state = self.state.lock();

        for symbol in symbols {
            let symbol = normalize_symbol(symbol.as_ref());
            if symbol.is_empty() {
                continue;
            }
            state.desired.insert(symbol);
        }

        let Some(session) = state.session else {
            debug!("No open session, {} symbols queued for next connect", state.desired.len());
            return Vec::new();
        };

        let delta: Vec<String> = state.desired.difference(&state.upstream).cloned().collect();
        if delta.is_empty() {
            return delta;
        }

        let frame = self.codec.encode_subscribe(&delta);
        match self.sender.send(session, frame) {
            Ok(()) => {
                info!("Subscribing to {:?} on session {}", delta, session);
                state.upstream.extend(delta.iter().cloned());
                delta
            }
            Err(e) => {
                warn!("Failed to queue subscribe frame: {}", e);
                Vec::new()
            }
        }
    }

    /// Mark `session` open and build the full resubscribe frame
    ///
    /// Returns `None` when nothing is desired yet.
    pub(crate) fn open_session(&self, session: SessionId) -> Option<WsMessage> {
        let mut state = self.state.lock();
        state.session = Some(session);
        state.upstream = state.desired.clone();

        if state.desired.is_empty() {
            return None;
        }

        let symbols: Vec<String> = state.desired.iter().cloned().collect();
        info!("Resubscribing {} symbols on session {}", symbols.len(), session);
        Some(self.codec.encode_subscribe(&symbols))
    }

    /// Forget upstream state for `session`; a stale id is ignored
    pub(crate) fn close_session(&self, session: SessionId) {
        let mut state = self.state.lock();
        if state.session == Some(session) {
            state.session = None;
            state.upstream.clear();
        }
    }

    /// Desired symbols, sorted
    pub fn desired(&self) -> Vec<String> {
        self.state.lock().desired.iter().cloned().collect()
    }

    /// Symbols subscribed on the current session, sorted
    pub fn upstream(&self) -> Vec<String> {
        self.state.lock().upstream.iter().cloned().collect()
    }
}
