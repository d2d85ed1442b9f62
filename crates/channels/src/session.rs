use std::sync::Arc;

use jid::Jid;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::ChannelsError;

/// Channel server address for the current connection.
///
/// Cloned handles share the same slot. Written by discovery and connection
/// events, read at request time.
#[derive(Debug, Clone, Default)]
pub struct ChannelServerSession {
    server: Arc<RwLock<Option<String>>>,
}

impl ChannelServerSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// A session that starts out pointing at `server`, if any.
    pub fn with_server(server: Option<String>) -> Result<Self, ChannelsError> {
        let server = server.as_deref().map(validate).transpose()?;
        Ok(Self {
            server: Arc::new(RwLock::new(server)),
        })
    }

    /// Record the discovered channel server. The address must be a valid JID.
    pub async fn set(&self, address: &str) -> Result<(), ChannelsError> {
        let address = validate(address)?;
        debug!(server = %address, "channel server set");
        *self.server.write().await = Some(address);
        Ok(())
    }

    pub async fn clear(&self) {
        if self.server.write().await.take().is_some() {
            debug!("channel server cleared");
        }
    }

    /// Replace the current server with `configured`, or clear it when `None`.
    pub async fn reset_to(&self, configured: Option<&str>) -> Result<(), ChannelsError> {
        match configured {
            Some(address) => self.set(address).await,
            None => {
                self.clear().await;
                Ok(())
            }
        }
    }

    pub async fn current(&self) -> Option<String> {
        self.server.read().await.clone()
    }
}

/// Checks that `address` parses as a JID. The address itself is kept as given.
fn validate(address: &str) -> Result<String, ChannelsError> {
    Jid::new(address).map_err(|e| ChannelsError::InvalidChannelServer {
        address: address.to_string(),
        reason: e.to_string(),
    })?;
    Ok(address.to_string())
}
