//! Configuration for the buddycloud bridge.
//!
//! Configuration is a single TOML document. Every section is optional and
//! falls back to its defaults, so an empty file is a valid configuration:
//!
//! ```toml
//! [event_bus]
//! channel_capacity = 1024
//!
//! [xmpp]
//! wire_buffer = 64
//! iq_timeout_seconds = 0
//!
//! [buddycloud]
//! channel_server = "channels.example.com"
//! echo_request_on_missing_callback = false
//!
//! [logging]
//! filter = "info"
//! json = false
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Event bus sizing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventBusConfig {
    /// Capacity of each per-domain broadcast channel
    pub channel_capacity: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
        }
    }
}

/// Stanza wire and IQ tracking configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct XmppConfig {
    /// Buffer size of the outbound and inbound stanza channels
    pub wire_buffer: usize,
    /// Seconds to wait for an IQ response; 0 waits forever
    pub iq_timeout_seconds: u64,
}

impl Default for XmppConfig {
    fn default() -> Self {
        Self {
            wire_buffer: 64,
            iq_timeout_seconds: 0,
        }
    }
}

impl XmppConfig {
    pub fn iq_timeout(&self) -> Option<Duration> {
        (self.iq_timeout_seconds > 0).then(|| Duration::from_secs(self.iq_timeout_seconds))
    }
}

/// Buddycloud channel adapter configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuddycloudConfig {
    /// Channel server used when no discovery result is available.
    /// Discovery results replace it for the lifetime of a connection.
    pub channel_server: Option<String>,
    /// Echo the submitted request in missing-callback notifications
    /// instead of an empty object
    pub echo_request_on_missing_callback: bool,
}

/// Log output configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub filter: String,
    /// Emit JSON lines instead of human readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info,buddybridge_core=debug,buddybridge_xmpp=debug,buddybridge_channels=debug"
                .into(),
            json: false,
        }
    }
}

/// Main configuration struct
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub event_bus: EventBusConfig,
    pub xmpp: XmppConfig,
    pub buddycloud: BuddycloudConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file. A missing file yields defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!(path = %path.display(), "No config file found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&content)?;
        tracing::info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.event_bus.channel_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "event_bus.channel_capacity",
                reason: "must be greater than zero".into(),
            });
        }
        if self.xmpp.wire_buffer == 0 {
            return Err(ConfigError::Invalid {
                field: "xmpp.wire_buffer",
                reason: "must be greater than zero".into(),
            });
        }
        if matches!(&self.buddycloud.channel_server, Some(server) if server.trim().is_empty()) {
            return Err(ConfigError::Invalid {
                field: "buddycloud.channel_server",
                reason: "must not be empty".into(),
            });
        }
        Ok(())
    }
}
