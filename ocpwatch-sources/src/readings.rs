//! The readings document shared by file and channel sources.
//!
//! ```json
//! {
//!   "timecard0": {
//!     "available": true,
//!     "channels": {
//!       "clock_offset_ns": 12.5,
//!       "gnss_sync": "SYNC",
//!       "voltage_3v3": null
//!     }
//!   }
//! }
//! ```
//!
//! A `null` channel value means the collector could not read that sensor.

use std::collections::BTreeMap;

use ocpwatch_types::{ChannelValue, Reading};
use serde::{Deserialize, Serialize};

use crate::SourceError;

/// Latest raw readings for every device, keyed by device id.
pub type ReadingsMap = BTreeMap<String, DeviceReadings>;

/// Latest raw readings for one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceReadings {
    #[serde(default = "default_available")]
    pub available: bool,
    #[serde(default)]
    pub channels: BTreeMap<String, Option<ChannelValue>>,
}

fn default_available() -> bool {
    true
}

impl Default for DeviceReadings {
    fn default() -> Self {
        Self {
            available: true,
            channels: BTreeMap::new(),
        }
    }
}

impl DeviceReadings {
    /// The reading for `channel`, or why there is none.
    pub fn reading(&self, channel: &str) -> Reading {
        if !self.available {
            return SourceError::Unavailable("device offline".to_string()).into();
        }
        match self.channels.get(channel) {
            Some(Some(value)) => Reading::Value(value.clone()),
            Some(None) => SourceError::Unavailable(channel.to_string()).into(),
            None => SourceError::UnknownChannel(channel.to_string()).into(),
        }
    }
}

/// Look up `channel` on `device` in a readings map.
pub fn lookup(map: &ReadingsMap, device: &str, channel: &str) -> Reading {
    match map.get(device) {
        Some(readings) => readings.reading(channel),
        None => SourceError::UnknownDevice(device.to_string()).into(),
    }
}

/// Parse a readings document.
pub fn parse_readings(json: &str) -> Result<ReadingsMap, SourceError> {
    Ok(serde_json::from_str(json)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_numbers_text_and_nulls() {
        let map = parse_readings(
            r#"{"tc0": {"channels": {"clock_offset_ns": -3.5, "gnss_sync": "SYNC", "voltage_3v3": null}}}"#,
        )
        .unwrap();

        assert_eq!(lookup(&map, "tc0", "clock_offset_ns"), Reading::number(-3.5));
        assert_eq!(lookup(&map, "tc0", "gnss_sync"), Reading::text("SYNC"));
        assert!(!lookup(&map, "tc0", "voltage_3v3").is_available());
        assert!(!lookup(&map, "tc0", "missing").is_available());
        assert!(!lookup(&map, "tc9", "clock_offset_ns").is_available());
    }

    #[test]
    fn offline_device_reads_nothing() {
        let map = parse_readings(r#"{"tc0": {"available": false, "channels": {"x": 1.0}}}"#).unwrap();
        assert_eq!(
            lookup(&map, "tc0", "x"),
            Reading::unavailable("Sensor unavailable: device offline")
        );
    }
}
