//! Upstream transport seam
//!
//! A transport opens one streaming session per connection attempt. Sessions
//! come pre-split into a write half and a read half so the driver can send
//! while it is waiting on the next inbound frame.

use crate::codec::WsMessage;
use crate::error::{Result, StreamError};
use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::pin::Pin;
use std::str::FromStr;

/// Market-data tier requested from the upstream feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Feed {
    /// Single-exchange feed
    #[default]
    Iex,
    /// Consolidated feed across all exchanges
    Sip,
}

impl Feed {
    pub fn as_str(&self) -> &'static str {
        match self {
            Feed::Iex => "iex",
            Feed::Sip => "sip",
        }
    }
}

impl fmt::Display for Feed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Feed {
    type Err = StreamError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "iex" => Ok(Feed::Iex),
            "sip" => Ok(Feed::Sip),
            other => Err(StreamError::Configuration(format!("unknown feed: {}", other))),
        }
    }
}

/// Write half of an open session
#[async_trait]
pub trait FrameSink: Send {
    /// Fire-and-forget send; no acknowledgment is modelled
    async fn send(&mut self, message: WsMessage) -> Result<()>;

    /// Close the session gracefully
    async fn close(&mut self) -> Result<()>;
}

/// Read half of an open session
///
/// `None` means the peer closed the session; `Some(Err(_))` is a transport
/// error. Either ends the session.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<WsMessage>> + Send>>;

/// One open upstream session
pub struct TransportSession {
    pub sink: Box<dyn FrameSink>,
    pub stream: FrameStream,
}

impl TransportSession {
    pub fn new(sink: Box<dyn FrameSink>, stream: FrameStream) -> Self {
        Self { sink, stream }
    }
}

/// Opens sessions against the upstream market-data service
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn open(&self, feed: Feed) -> Result<TransportSession>;
}
