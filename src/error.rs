//! Error types for the monitoring pipeline.

use thiserror::Error;

/// Errors surfaced to callers of the monitoring service.
///
/// Sampling never returns these: sensor failures are absorbed by the filter
/// and alert engine. They only come back from configuration and queries.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// A configuration update was rejected; the previous configuration stays in effect.
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    /// No device with this id is registered.
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// A device with this id is already registered.
    #[error("Device already registered: {0}")]
    DeviceExists(String),

    /// Loading configuration sources failed.
    #[error("Failed to load configuration: {0}")]
    Config(#[from] config::ConfigError),
}

impl MonitorError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        MonitorError::ConfigInvalid(msg.into())
    }

    /// True for the not-found case, which an HTTP layer maps to 404.
    pub fn is_not_found(&self) -> bool {
        matches!(self, MonitorError::DeviceNotFound(_))
    }
}

pub type Result<T, E = MonitorError> = std::result::Result<T, E>;
