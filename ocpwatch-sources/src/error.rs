//! Error types for data sources.

use ocpwatch_types::Reading;
use thiserror::Error;

/// Errors that can occur while reading from a data source.
///
/// These never escape the sources crate as errors: the pipeline sees them as
/// [`Reading::Unavailable`] carrying the error message.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Reading the backing file or device node failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The readings payload could not be parsed.
    #[error("Failed to parse readings: {0}")]
    Parse(String),

    /// The source has no data for this device.
    #[error("Unknown device: {0}")]
    UnknownDevice(String),

    /// The device has no reading for this channel.
    #[error("No reading for channel: {0}")]
    UnknownChannel(String),

    /// The sensor did not answer in time.
    #[error("Read timed out")]
    Timeout,

    /// The sensor reported itself unavailable.
    #[error("Sensor unavailable: {0}")]
    Unavailable(String),
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        SourceError::Parse(err.to_string())
    }
}

impl From<SourceError> for Reading {
    fn from(err: SourceError) -> Self {
        Reading::Unavailable(err.to_string())
    }
}
