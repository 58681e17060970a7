//! # Marketstream
//!
//! Real-time market-data streaming core for the trading dashboard's live
//! price widgets.
//!
//! ## Features
//!
//! - **One upstream connection**: Multiplexes a changing symbol set over a single session
//! - **Resilient**: Exponential backoff with jitter, full resubscribe after every reconnect
//! - **Cached**: Latest snapshot plus bounded history per symbol
//! - **Fan-out**: Per-symbol, global and connection-state listeners with panic isolation
//!
//! ## Example
//!
//! ```rust,ignore
//! use marketstream::{
//!     AlpacaCodec, Feed, InitializeOptions, MarketDataService, StreamConfig, WebSocketTransport,
//! };
//! use std::sync::Arc;
//!
//! let config = StreamConfig::load("config/stream.yaml")?;
//! let service = Arc::new(MarketDataService::new(
//!     Arc::new(WebSocketTransport::new(&config.url)),
//!     Arc::new(AlpacaCodec::new()),
//!     &config,
//! ));
//!
//! service.add_price_listener("AAPL", |snapshot| println!("{:?}", snapshot));
//! service.subscribe(["aapl", "msft"]);
//! service.initialize(InitializeOptions { feed: Feed::Iex }).await?;
//! ```

pub mod cache;
pub mod core;
pub mod feeds;
pub mod hub;
pub mod service;
pub mod subscription;
pub mod traits;

// Re-export all traits
pub use traits::*;

// Re-export core modules and types
pub use crate::core::{
    config, connection, connection_state, heartbeat,
    config::{BackoffConfig, ConfigError, HeartbeatConfig, StreamConfig},
    connection::{ConnectionHandler, ConnectionManager, SessionId, SessionSender},
    connection_state::{AtomicConnectionState, ConnectionState},
};

pub use cache::{PriceCache, PriceHistory, PriceSnapshot};
pub use feeds::{AlpacaCodec, WebSocketTransport};
pub use hub::{ListenerHandle, ListenerHub};
pub use service::{InitializeOptions, MarketDataService};
pub use subscription::{normalize_symbol, SubscriptionRegistry};
