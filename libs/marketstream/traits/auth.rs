use crate::error::Result;
use crate::codec::WsMessage;
use async_trait::async_trait;

/// Supplies the frame a transport sends right after the socket opens
///
/// Called on every open, including reconnections. Credential provisioning
/// lives outside this crate; providers only hand over a ready frame.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// * `Ok(Some(message))` - Send this message before anything else
    /// * `Ok(None)` - No authentication required
    async fn get_auth_message(&self) -> Result<Option<WsMessage>>;
}

/// A no-op auth provider that doesn't require authentication
pub struct NoAuth;

#[async_trait]
impl AuthProvider for NoAuth {
    async fn get_auth_message(&self) -> Result<Option<WsMessage>> {
        Ok(None)
    }
}

/// Sends the same pre-built frame on every open
pub struct StaticAuth {
    message: WsMessage,
}

impl StaticAuth {
    pub fn new(message: WsMessage) -> Self {
        Self { message }
    }
}

#[async_trait]
impl AuthProvider for StaticAuth {
    async fn get_auth_message(&self) -> Result<Option<WsMessage>> {
        Ok(Some(self.message.clone()))
    }
}
