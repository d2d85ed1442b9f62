use buddybridge_core::EventBusError;

#[derive(Debug, thiserror::Error)]
pub enum ChannelsError {
    #[error("failed to subscribe to events: {0}")]
    SubscriptionFailed(String),

    #[error("invalid channel server address {address:?}: {reason}")]
    InvalidChannelServer { address: String, reason: String },

    #[error("failed to publish event: {0}")]
    Publish(#[from] EventBusError),
}
