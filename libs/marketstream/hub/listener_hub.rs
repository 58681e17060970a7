//! Listener registry and fan-out
//!
//! # Dispatch
//!
//! ```text
//! update(AAPL) ──> [AAPL listeners in registration order] ──> [global listeners]
//! state change ──> [connection listeners in registration order]
//! ```
//!
//! The registry lock is released before any callback runs: callbacks may add
//! or remove listeners (including themselves) without deadlocking. A listener
//! removed while a dispatch is in progress is skipped for the rest of it.

use crate::cache::PriceSnapshot;
use crate::connection_state::ConnectionState;
use crate::subscription::normalize_symbol;
use parking_lot::RwLock;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, error};

pub type PriceCallback = Arc<dyn Fn(&PriceSnapshot) + Send + Sync>;
pub type ConnectionCallback = Arc<dyn Fn(ConnectionState) + Send + Sync>;

/// Opaque listener identifier, unique per hub
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Debug, Clone, PartialEq, Eq)]
enum Channel {
    Symbol(String),
    Global,
    Connection,
}

struct Entry<C> {
    id: ListenerId,
    active: Arc<AtomicBool>,
    callback: C,
}

impl<C: Clone> Clone for Entry<C> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            active: Arc::clone(&self.active),
            callback: self.callback.clone(),
        }
    }
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    by_symbol: HashMap<String, Vec<Entry<PriceCallback>>>,
    global: Vec<Entry<PriceCallback>>,
    connection: Vec<Entry<ConnectionCallback>>,
}

impl Registry {
    fn next_entry<C>(&mut self, callback: C) -> Entry<C> {
        self.next_id += 1;
        Entry {
            id: ListenerId(self.next_id),
            active: Arc::new(AtomicBool::new(true)),
            callback,
        }
    }

    fn remove(&mut self, channel: &Channel, id: ListenerId) {
        match channel {
            Channel::Symbol(symbol) => {
                if let Some(entries) = self.by_symbol.get_mut(symbol) {
                    entries.retain(|entry| entry.id != id);
                    if entries.is_empty() {
                        self.by_symbol.remove(symbol);
                    }
                }
            }
            Channel::Global => self.global.retain(|entry| entry.id != id),
            Channel::Connection => self.connection.retain(|entry| entry.id != id),
        }
    }
}

/// Removal handle returned by every `add_*_listener` call
///
/// `remove()` may be called any number of times; only the first call has an
/// effect. Dropping the handle leaves the listener registered.
pub struct ListenerHandle {
    id: ListenerId,
    channel: Channel,
    active: Arc<AtomicBool>,
    registry: Weak<RwLock<Registry>>,
}

impl ListenerHandle {
    pub fn id(&self) -> ListenerId {
        self.id
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Unregister the listener
    ///
    /// Returns `true` if this call removed it, `false` if it was already gone.
    pub fn remove(&self) -> bool {
        if !self.active.swap(false, Ordering::AcqRel) {
            return false;
        }
        if let Some(registry) = self.registry.upgrade() {
            registry.write().remove(&self.channel, self.id);
        }
        debug!("Removed listener {:?} ({:?})", self.id, self.channel);
        true
    }
}

impl fmt::Debug for ListenerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerHandle")
            .field("id", &self.id)
            .field("channel", &self.channel)
            .field("active", &self.is_active())
            .finish()
    }
}

/// Publish/subscribe registry for price and connection-state listeners
#[derive(Default)]
pub struct ListenerHub {
    registry: Arc<RwLock<Registry>>,
}

impl ListenerHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Listen to updates for one symbol
    pub fn add_price_listener<F>(&self, symbol: &str, callback: F) -> ListenerHandle
    where
        F: Fn(&PriceSnapshot) + Send + Sync + 'static,
    {
        let symbol = normalize_symbol(symbol);
        let mut registry = self.registry.write();
        let entry = registry.next_entry::<PriceCallback>(Arc::new(callback));
        let handle = self.handle_for(&entry, Channel::Symbol(symbol.clone()));
        registry.by_symbol.entry(symbol).or_default().push(entry);
        handle
    }

    /// Listen to updates for every symbol
    pub fn add_global_price_listener<F>(&self, callback: F) -> ListenerHandle
    where
        F: Fn(&PriceSnapshot) + Send + Sync + 'static,
    {
        let mut registry = self.registry.write();
        let entry = registry.next_entry::<PriceCallback>(Arc::new(callback));
        let handle = self.handle_for(&entry, Channel::Global);
        registry.global.push(entry);
        handle
    }

    /// Listen to connection state transitions
    pub fn add_connection_listener<F>(&self, callback: F) -> ListenerHandle
    where
        F: Fn(ConnectionState) + Send + Sync + 'static,
    {
        let mut registry = self.registry.write();
        let entry = registry.next_entry::<ConnectionCallback>(Arc::new(callback));
        let handle = self.handle_for(&entry, Channel::Connection);
        registry.connection.push(entry);
        handle
    }

    fn handle_for<C>(&self, entry: &Entry<C>, channel: Channel) -> ListenerHandle {
        ListenerHandle {
            id: entry.id,
            channel,
            active: Arc::clone(&entry.active),
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Deliver one applied update to its symbol's listeners, then global ones
    pub(crate) fn dispatch_price(&self, snapshot: &PriceSnapshot) {
        let (by_symbol, global) = {
            let registry = self.registry.read();
            (
                registry.by_symbol.get(&snapshot.symbol).cloned().unwrap_or_default(),
                registry.global.clone(),
            )
        };

        for entry in by_symbol.iter().chain(global.iter()) {
            invoke(entry, "price", |callback| callback(snapshot));
        }
    }

    /// Deliver a connection state transition
    pub(crate) fn dispatch_connection(&self, state: ConnectionState) {
        let listeners = self.registry.read().connection.clone();
        for entry in &listeners {
            invoke(entry, "connection", |callback| callback(state));
        }
    }

    /// Number of listeners registered for `symbol`
    pub fn listener_count(&self, symbol: &str) -> usize {
        self.registry
            .read()
            .by_symbol
            .get(&normalize_symbol(symbol))
            .map_or(0, Vec::len)
    }

    pub fn global_listener_count(&self) -> usize {
        self.registry.read().global.len()
    }

    pub fn connection_listener_count(&self) -> usize {
        self.registry.read().connection.len()
    }
}

fn invoke<C>(entry: &Entry<C>, kind: &str, call: impl FnOnce(&C)) {
    if !entry.active.load(Ordering::Acquire) {
        return;
    }
    if let Err(payload) = catch_unwind(AssertUnwindSafe(|| call(&entry.callback))) {
        error!(
            "{} listener {:?} panicked: {}",
            kind,
            entry.id,
            panic_message(payload.as_ref())
        );
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicUsize;

    fn snapshot(symbol: &str, price: f64) -> PriceSnapshot {
        PriceSnapshot {
            symbol: symbol.to_string(),
            price,
            bid: None,
            ask: None,
            last_trade_price: None,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_symbol_listeners_fire_in_registration_order() {
        let hub = ListenerHub::new();
        let calls = Arc::new(Mutex::new(Vec::new()));

        for name in ["first", "second", "third"] {
            let calls = Arc::clone(&calls);
            hub.add_price_listener("aapl", move |s| calls.lock().push((name, s.price)));
        }
        let other = Arc::new(AtomicUsize::new(0));
        let other_clone = Arc::clone(&other);
        hub.add_price_listener("MSFT", move |_| {
            other_clone.fetch_add(1, Ordering::SeqCst);
        });

        hub.dispatch_price(&snapshot("AAPL", 1.0));

        assert_eq!(
            *calls.lock(),
            vec![("first", 1.0), ("second", 1.0), ("third", 1.0)]
        );
        assert_eq!(other.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_global_listener_sees_every_symbol() {
        let hub = ListenerHub::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        hub.add_global_price_listener(move |s| seen_clone.lock().push(s.symbol.clone()));

        hub.dispatch_price(&snapshot("AAPL", 1.0));
        hub.dispatch_price(&snapshot("MSFT", 2.0));

        assert_eq!(*seen.lock(), vec!["AAPL".to_string(), "MSFT".to_string()]);
    }

    #[test]
    fn test_panicking_listener_does_not_stop_dispatch() {
        let hub = ListenerHub::new();
        let count = Arc::new(AtomicUsize::new(0));

        let before = Arc::clone(&count);
        hub.add_price_listener("AAPL", move |_| {
            before.fetch_add(1, Ordering::SeqCst);
        });
        hub.add_price_listener("AAPL", |_| panic!("listener blew up"));
        let after = Arc::clone(&count);
        hub.add_price_listener("AAPL", move |_| {
            after.fetch_add(1, Ordering::SeqCst);
        });
        let global = Arc::clone(&count);
        hub.add_global_price_listener(move |_| {
            global.fetch_add(1, Ordering::SeqCst);
        });

        hub.dispatch_price(&snapshot("AAPL", 1.0));
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let hub = ListenerHub::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);
        let handle = hub.add_price_listener("AAPL", move |_| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        hub.dispatch_price(&snapshot("AAPL", 1.0));
        assert!(handle.remove());
        assert!(!handle.remove());
        assert!(!handle.is_active());
        hub.dispatch_price(&snapshot("AAPL", 2.0));

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(hub.listener_count("AAPL"), 0);
    }

    #[test]
    fn test_listener_removed_mid_dispatch_is_skipped() {
        let hub = Arc::new(ListenerHub::new());
        let second_calls = Arc::new(AtomicUsize::new(0));
        let second_handle: Arc<Mutex<Option<ListenerHandle>>> = Arc::new(Mutex::new(None));

        let slot = Arc::clone(&second_handle);
        hub.add_price_listener("AAPL", move |_| {
            if let Some(handle) = slot.lock().as_ref() {
                handle.remove();
            }
        });
        let calls = Arc::clone(&second_calls);
        let handle = hub.add_price_listener("AAPL", move |_| {
            calls.fetch_add(1, Ordering::SeqCst);
        });
        *second_handle.lock() = Some(handle);

        hub.dispatch_price(&snapshot("AAPL", 1.0));
        assert_eq!(second_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_connection_listeners() {
        let hub = ListenerHub::new();
        let states = Arc::new(Mutex::new(Vec::new()));
        let states_clone = Arc::clone(&states);
        let handle = hub.add_connection_listener(move |state| states_clone.lock().push(state));

        hub.dispatch_connection(ConnectionState::Connecting);
        hub.dispatch_connection(ConnectionState::Connected);
        handle.remove();
        hub.dispatch_connection(ConnectionState::Disconnected);

        assert_eq!(
            *states.lock(),
            vec![ConnectionState::Connecting, ConnectionState::Connected]
        );
        assert_eq!(hub.connection_listener_count(), 0);
    }

    #[test]
    fn test_handle_outliving_hub_is_harmless() {
        let hub = ListenerHub::new();
        let handle = hub.add_global_price_listener(|_| {});
        drop(hub);
        assert!(handle.remove());
        assert!(!handle.remove());
    }
}
