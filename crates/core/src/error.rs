use thiserror::Error;

/// The universal error type for buddybridge.
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Event bus error: {0}")]
    EventBus(#[from] EventBusError),

    #[error("Telemetry error: {0}")]
    Telemetry(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A specialized Result type for buddybridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum EventBusError {
    #[error("Invalid channel: {0}")]
    InvalidChannel(String),

    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),

    #[error("Channel closed")]
    ChannelClosed,

    #[error("Subscriber lagged: {0} events missed")]
    Lagged(u64),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_bus_error_converts_into_bridge_error() {
        let err: BridgeError = EventBusError::ChannelClosed.into();
        assert!(matches!(err, BridgeError::EventBus(EventBusError::ChannelClosed)));
        assert_eq!(err.to_string(), "Event bus error: Channel closed");
    }

    #[test]
    fn lagged_error_reports_missed_count() {
        assert_eq!(
            EventBusError::Lagged(7).to_string(),
            "Subscriber lagged: 7 events missed"
        );
    }
}
