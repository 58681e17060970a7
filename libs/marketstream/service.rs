//! Service façade
//!
//! `MarketDataService` composes the connection manager, subscription
//! registry, price cache and listener hub. It is the only entry point for
//! consumers; construct one per process and share it behind an `Arc`.

use crate::cache::{PriceCache, PriceHistory, PriceSnapshot};
use crate::codec::{QuoteCodec, WsMessage};
use crate::config::StreamConfig;
use crate::connection::{ConnectionHandler, ConnectionManager, SessionId};
use crate::connection_state::ConnectionState;
use crate::error::Result;
use crate::hub::{ListenerHandle, ListenerHub};
use crate::reconnect::ReconnectionStrategy;
use crate::subscription::SubscriptionRegistry;
use crate::transport::{Feed, Transport};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Options for [`MarketDataService::initialize`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InitializeOptions {
    pub feed: Feed,
}

impl From<Feed> for InitializeOptions {
    fn from(feed: Feed) -> Self {
        Self { feed }
    }
}

/// State the connection driver feeds into
struct StreamCore {
    cache: PriceCache,
    hub: ListenerHub,
    registry: SubscriptionRegistry,
    codec: Arc<dyn QuoteCodec>,
}

impl ConnectionHandler for StreamCore {
    fn on_state_change(&self, state: ConnectionState) {
        self.hub.dispatch_connection(state);
    }

    fn on_session_open(&self, session: SessionId) -> Option<WsMessage> {
        self.registry.open_session(session)
    }

    fn on_session_closed(&self, session: SessionId) {
        self.registry.close_session(session);
    }

    fn on_message(&self, message: WsMessage) {
        let events = match self.codec.decode(&message) {
            Ok(events) => events,
            Err(e) => {
                warn!("Dropping undecodable frame: {}", e);
                return;
            }
        };

        for event in &events {
            let previous = self.cache.get_price(event.symbol());
            let Some(snapshot) = PriceSnapshot::from_event(previous.as_ref(), event) else {
                debug!("Ignoring {} event without a usable price", event.symbol());
                continue;
            };

            self.cache.apply_update(snapshot.clone());
            self.hub.dispatch_price(&snapshot);
        }
    }
}

/// Real-time market-data service
pub struct MarketDataService {
    core: Arc<StreamCore>,
    connection: ConnectionManager,
}

impl MarketDataService {
    /// Create a disconnected service; call [`initialize`](Self::initialize) to connect
    pub fn new(transport: Arc<dyn Transport>, codec: Arc<dyn QuoteCodec>, config: &StreamConfig) -> Self {
        Self::from_connection(ConnectionManager::new(transport, config), codec, config)
    }

    /// Create a service with a custom reconnection strategy
    pub fn with_strategy(
        transport: Arc<dyn Transport>,
        codec: Arc<dyn QuoteCodec>,
        strategy: Box<dyn ReconnectionStrategy>,
        config: &StreamConfig,
    ) -> Self {
        Self::from_connection(
            ConnectionManager::with_strategy(transport, strategy, config),
            codec,
            config,
        )
    }

    fn from_connection(
        connection: ConnectionManager,
        codec: Arc<dyn QuoteCodec>,
        config: &StreamConfig,
    ) -> Self {
        let core = Arc::new(StreamCore {
            cache: PriceCache::new(config.history_length),
            hub: ListenerHub::new(),
            registry: SubscriptionRegistry::new(connection.session_sender(), Arc::clone(&codec)),
            codec,
        });

        Self { core, connection }
    }

    /// Connect to the upstream feed
    ///
    /// Concurrent calls share one connection attempt. See
    /// [`ConnectionManager::initialize`] for the failure semantics.
    pub async fn initialize(&self, options: InitializeOptions) -> Result<()> {
        let handler: Arc<dyn ConnectionHandler> = self.core.clone();
        self.connection.initialize(options.feed, handler).await
    }

    /// Close the connection and stop reconnecting
    pub fn disconnect(&self) {
        self.connection.disconnect();
    }

    /// Add symbols to the desired set; returns the symbols sent upstream now
    pub fn subscribe<I, S>(&self, symbols: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.core.registry.subscribe(symbols)
    }

    pub fn get_price(&self, symbol: &str) -> Option<PriceSnapshot> {
        self.core.cache.get_price(symbol)
    }

    pub fn get_all_prices(&self) -> HashMap<String, PriceSnapshot> {
        self.core.cache.get_all_prices()
    }

    pub fn get_price_history(&self, symbol: &str) -> Option<PriceHistory> {
        self.core.cache.get_price_history(symbol)
    }

    pub fn add_price_listener<F>(&self, symbol: &str, callback: F) -> ListenerHandle
    where
        F: Fn(&PriceSnapshot) + Send + Sync + 'static,
    {
        self.core.hub.add_price_listener(symbol, callback)
    }

    pub fn add_global_price_listener<F>(&self, callback: F) -> ListenerHandle
    where
        F: Fn(&PriceSnapshot) + Send + Sync + 'static,
    {
        self.core.hub.add_global_price_listener(callback)
    }

    pub fn add_connection_listener<F>(&self, callback: F) -> ListenerHandle
    where
        F: Fn(ConnectionState) + Send + Sync + 'static,
    {
        self.core.hub.add_connection_listener(callback)
    }

    #[inline]
    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }
}
