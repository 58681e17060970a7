//! tokio-tungstenite transport
//!
//! Opens `{base_url}/{feed}`, sends the auth frame if a provider is set, and
//! hands the split socket to the driver. Ping/pong is answered by tungstenite
//! itself; control frames never reach the codec.

use crate::auth::AuthProvider;
use crate::codec::WsMessage;
use crate::error::{Result, StreamError};
use crate::transport::{Feed, FrameSink, Transport, TransportSession};
use async_trait::async_trait;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

type WsWrite = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// WebSocket transport for feeds addressed as `{base_url}/{feed}`
pub struct WebSocketTransport {
    base_url: String,
    auth: Option<Arc<dyn AuthProvider>>,
}

impl WebSocketTransport {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            auth: None,
        }
    }

    /// Send the provider's frame right after every open
    pub fn with_auth(mut self, auth: Arc<dyn AuthProvider>) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn url_for(&self, feed: Feed) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), feed)
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn open(&self, feed: Feed) -> Result<TransportSession> {
        let url = self.url_for(feed);
        debug!("Opening WebSocket {}", url);

        let (ws_stream, _) = connect_async(url.as_str())
            .await
            .map_err(|e| StreamError::WebSocket(format!("Failed to connect to {}: {}", url, e)))?;
        info!("WebSocket connected to {}", url);

        let (write, read) = ws_stream.split();
        let mut sink = WsSink { write };

        if let Some(ref auth) = self.auth {
            if let Some(frame) = auth.get_auth_message().await? {
                debug!("Sending auth frame");
                sink.send(frame).await?;
            }
        }

        let stream = read.filter_map(|frame| async move {
            match frame {
                Ok(Message::Close(close)) => Some(Err(StreamError::ConnectionClosed(
                    close.map(|c| c.reason.to_string()).unwrap_or_default(),
                ))),
                Ok(message) => tungstenite_to_ws_message(message).map(Ok),
                Err(e) => Some(Err(StreamError::WebSocket(e.to_string()))),
            }
        });

        Ok(TransportSession::new(Box::new(sink), Box::pin(stream)))
    }
}

struct WsSink {
    write: WsWrite,
}

#[async_trait]
impl FrameSink for WsSink {
    async fn send(&mut self, message: WsMessage) -> Result<()> {
        self.write
            .send(ws_message_to_tungstenite(message))
            .await
            .map_err(|e| StreamError::WebSocket(format!("Failed to send frame: {}", e)))
    }

    async fn close(&mut self) -> Result<()> {
        self.write
            .close()
            .await
            .map_err(|e| StreamError::WebSocket(format!("Failed to close: {}", e)))
    }
}

fn ws_message_to_tungstenite(message: WsMessage) -> Message {
    match message {
        WsMessage::Text(text) => Message::Text(text),
        WsMessage::Binary(data) => Message::Binary(data),
    }
}

fn tungstenite_to_ws_message(message: Message) -> Option<WsMessage> {
    match message {
        Message::Text(text) => Some(WsMessage::Text(text)),
        Message::Binary(data) => Some(WsMessage::Binary(data)),
        Message::Ping(_) | Message::Pong(_) | Message::Close(_) | Message::Frame(_) => None,
    }
}
