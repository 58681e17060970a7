//! # Streaming core
//!
//! Connection lifecycle and the pieces it is built from:
//!
//! - **connection**: `ConnectionManager`, the driver task and its handler seam
//! - **connection_state**: Atomic connection state
//! - **heartbeat**: Keep-alive frames and idle detection for open sessions
//! - **config**: `StreamConfig` loading and validation

pub mod config;
pub mod connection;
pub mod connection_state;
pub mod heartbeat;

// Re-export main types
pub use config::{BackoffConfig, ConfigError, HeartbeatConfig, StreamConfig};
pub use connection::{ConnectionHandler, ConnectionManager, OutboundFrame, SessionId, SessionSender};
pub use connection_state::{AtomicConnectionState, ConnectionState};
pub use heartbeat::{Heartbeat, IdleWatchdog};
