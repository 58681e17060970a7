//! JSON codec for the Alpaca stock data stream (`iex` / `sip`)
//!
//! Inbound frames are JSON arrays of tagged objects:
//!
//! ```text
//! [{"T":"success","msg":"connected"}]
//! [{"T":"q","S":"AAPL","bp":189.1,"ap":189.2,"t":"2024-03-01T15:30:00.123Z"}]
//! [{"T":"t","S":"AAPL","p":189.15,"t":"2024-03-01T15:30:00.456Z"}]
//! ```

use crate::codec::{MarketEvent, QuoteCodec, WsMessage};
use crate::error::{Result, StreamError};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
#[serde(tag = "T")]
enum AlpacaMessage {
    #[serde(rename = "q")]
    Quote {
        #[serde(rename = "S")]
        symbol: String,
        #[serde(rename = "bp")]
        bid: f64,
        #[serde(rename = "ap")]
        ask: f64,
        #[serde(rename = "t")]
        timestamp: DateTime<Utc>,
    },
    #[serde(rename = "t")]
    Trade {
        #[serde(rename = "S")]
        symbol: String,
        #[serde(rename = "p")]
        price: f64,
        #[serde(rename = "t")]
        timestamp: DateTime<Utc>,
    },
    #[serde(rename = "success")]
    Success {
        #[serde(default)]
        msg: String,
    },
    #[serde(rename = "error")]
    Error {
        #[serde(default)]
        code: Option<i64>,
        #[serde(default)]
        msg: String,
    },
    /// `subscription` acks, bars, statuses and anything newer
    #[serde(other)]
    Other,
}

/// Codec for Alpaca's v2 stock stream
#[derive(Debug, Clone)]
pub struct AlpacaCodec {
    /// Also subscribe to trades, not just quotes
    trades: bool,
}

impl AlpacaCodec {
    /// Quotes and trades
    pub fn new() -> Self {
        Self { trades: true }
    }

    /// Quotes only
    pub fn quotes_only() -> Self {
        Self { trades: false }
    }

    /// Authentication frame, sent right after the socket opens
    pub fn auth_frame(key: &str, secret: &str) -> WsMessage {
        WsMessage::Text(json!({ "action": "auth", "key": key, "secret": secret }).to_string())
    }

    fn parse(bytes: &[u8]) -> Result<Vec<AlpacaMessage>> {
        let value: serde_json::Value = serde_json::from_slice(bytes)?;
        match value {
            serde_json::Value::Array(_) => Ok(serde_json::from_value(value)?),
            serde_json::Value::Object(_) => Ok(vec![serde_json::from_value(value)?]),
            other => Err(StreamError::Decode(format!("unexpected frame: {}", other))),
        }
    }
}

impl Default for AlpacaCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl QuoteCodec for AlpacaCodec {
    fn encode_subscribe(&self, symbols: &[String]) -> WsMessage {
        let trades: &[String] = if self.trades { symbols } else { &[] };
        WsMessage::Text(
            json!({ "action": "subscribe", "quotes": symbols, "trades": trades }).to_string(),
        )
    }

    fn decode(&self, message: &WsMessage) -> Result<Vec<MarketEvent>> {
        let bytes = match message {
            WsMessage::Text(text) => text.as_bytes(),
            WsMessage::Binary(data) => data.as_slice(),
        };

        let mut events = Vec::new();
        for message in Self::parse(bytes)? {
            match message {
                AlpacaMessage::Quote { symbol, bid, ask, timestamp } => {
                    events.push(MarketEvent::Quote { symbol, bid, ask, timestamp })
                }
                AlpacaMessage::Trade { symbol, price, timestamp } => {
                    events.push(MarketEvent::Trade { symbol, price, timestamp })
                }
                AlpacaMessage::Success { msg } => debug!("Upstream: {}", msg),
                AlpacaMessage::Error { code, msg } => {
                    warn!("Upstream error (code {:?}): {}", code, msg)
                }
                AlpacaMessage::Other => {}
            }
        }
        Ok(events)
    }
}
