pub mod config;
pub mod error;
pub mod event;
pub mod telemetry;

pub use config::Config;
pub use error::{BridgeError, EventBusError, Result};
