use crate::error::Result;
use chrono::{DateTime, Utc};

/// A single WebSocket frame, text or binary
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WsMessage {
    Text(String),
    Binary(Vec<u8>),
}

impl WsMessage {
    /// Get the message as text, if it is text
    pub fn as_text(&self) -> Option<&str> {
        match self {
            WsMessage::Text(s) => Some(s),
            WsMessage::Binary(_) => None,
        }
    }

    /// Get the message as binary, if it is binary
    pub fn as_binary(&self) -> Option<&[u8]> {
        match self {
            WsMessage::Text(_) => None,
            WsMessage::Binary(b) => Some(b),
        }
    }
}

/// A decoded market-data event, keyed by symbol
#[derive(Debug, Clone, PartialEq)]
pub enum MarketEvent {
    /// Top-of-book quote
    Quote {
        symbol: String,
        bid: f64,
        ask: f64,
        timestamp: DateTime<Utc>,
    },
    /// Last trade print
    Trade {
        symbol: String,
        price: f64,
        timestamp: DateTime<Utc>,
    },
}

impl MarketEvent {
    pub fn symbol(&self) -> &str {
        match self {
            MarketEvent::Quote { symbol, .. } | MarketEvent::Trade { symbol, .. } => symbol,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            MarketEvent::Quote { timestamp, .. } | MarketEvent::Trade { timestamp, .. } => *timestamp,
        }
    }
}

/// Wire codec for one upstream market-data protocol
///
/// The codec is the only place that knows the feed's frame layout:
/// the registry asks it for subscribe frames and the service hands it
/// every inbound frame.
pub trait QuoteCodec: Send + Sync + 'static {
    /// Build the add-symbols request for `symbols` (already canonical)
    fn encode_subscribe(&self, symbols: &[String]) -> WsMessage;

    /// Decode one inbound frame into zero or more market events
    ///
    /// Control frames (acks, welcome messages) decode to an empty list.
    /// Malformed frames return `Err(StreamError::Decode)`; the connection
    /// stays up and the frame is dropped.
    fn decode(&self, message: &WsMessage) -> Result<Vec<MarketEvent>>;
}
