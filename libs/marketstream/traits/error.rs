use thiserror::Error;

/// Main error type for marketstream
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StreamError {
    /// WebSocket transport error
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Connection closed unexpectedly
    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    /// Inbound payload could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// The first connection run exhausted its attempt budget
    #[error("Initialization failed after {attempts} attempts: {reason}")]
    InitializationFailed { attempts: usize, reason: String },

    /// The connection was shut down while the caller was waiting on it
    #[error("Disconnected before the connection was established")]
    Disconnected,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Channel send error
    #[error("Channel send error: {0}")]
    ChannelSend(String),
}

impl From<serde_json::Error> for StreamError {
    fn from(err: serde_json::Error) -> Self {
        StreamError::Decode(err.to_string())
    }
}

/// Result type for marketstream operations
pub type Result<T> = std::result::Result<T, StreamError>;
