//! Concrete transports and codecs

pub mod alpaca;
pub mod websocket;

pub use alpaca::AlpacaCodec;
pub use websocket::WebSocketTransport;
