//! Listener fan-out

pub mod listener_hub;

pub use listener_hub::{ConnectionCallback, ListenerHandle, ListenerHub, ListenerId, PriceCallback};
