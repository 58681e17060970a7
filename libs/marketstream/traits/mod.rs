//! # Marketstream Traits
//!
//! Seams between the streaming core and the outside world:
//!
//! - **Transport**: Open upstream sessions for a feed
//! - **QuoteCodec**: Encode subscribe requests, decode inbound frames
//! - **AuthProvider**: Frame sent right after a session opens
//! - **ReconnectionStrategy**: Delay between reconnection attempts

pub mod auth;
pub mod codec;
pub mod error;
pub mod reconnect;
pub mod transport;

// Re-export commonly used types
pub use auth::{AuthProvider, NoAuth, StaticAuth};
pub use codec::{MarketEvent, QuoteCodec, WsMessage};
pub use error::{Result, StreamError};
pub use reconnect::{ExponentialBackoff, FixedDelay, ReconnectionStrategy};
pub use transport::{Feed, FrameSink, FrameStream, Transport, TransportSession};
