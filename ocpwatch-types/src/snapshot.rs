//! Snapshot - every channel of one device at one poll tick.

use std::collections::BTreeMap;

use crate::{current_timestamp_ms, ChannelValue, FilterReason, HealthReport, SchemaVersion, Subsystem};

/// The filtered result for one channel within a snapshot.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChannelSample {
    /// Filtered value, or `None` if the channel has never produced a good reading.
    pub value: Option<ChannelValue>,
    /// Whether this tick's raw reading was accepted.
    pub accepted: bool,
    pub reason: FilterReason,
    /// Set once the channel has failed `stale_after` consecutive reads.
    #[cfg_attr(feature = "serde", serde(default))]
    pub stale: bool,
    pub subsystem: Subsystem,
}

impl ChannelSample {
    /// A sample whose reading was accepted this tick.
    pub fn accepted(subsystem: Subsystem, value: ChannelValue) -> Self {
        Self {
            value: Some(value),
            accepted: true,
            reason: FilterReason::Ok,
            stale: false,
            subsystem,
        }
    }

    /// A sample whose reading was rejected, carrying the last known-good value.
    pub fn rejected(subsystem: Subsystem, last_good: Option<ChannelValue>, reason: FilterReason) -> Self {
        Self {
            value: last_good,
            accepted: false,
            reason,
            stale: false,
            subsystem,
        }
    }

    /// Mark the sample stale.
    pub fn stale(mut self, stale: bool) -> Self {
        self.stale = stale;
        self
    }
}

/// A point-in-time view of one device.
///
/// Snapshots are built by the sampler once per tick, then handed unchanged
/// to the alert engine, the history store and every subscriber.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Snapshot {
    /// Schema version for forward compatibility.
    pub version: SchemaVersion,

    pub device: String,

    /// Unix timestamp in milliseconds. Strictly increasing per device.
    pub timestamp_ms: u64,

    /// Samples keyed by channel name.
    pub channels: BTreeMap<String, ChannelSample>,

    /// Health derived from this snapshot and the alerts active after it.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub health: Option<HealthReport>,
}

impl Snapshot {
    /// Create a builder for a snapshot of `device`.
    pub fn builder(device: impl Into<String>) -> SnapshotBuilder {
        SnapshotBuilder::new(device)
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn get(&self, channel: &str) -> Option<&ChannelSample> {
        self.channels.get(channel)
    }

    /// Filtered numeric value of a channel.
    pub fn number(&self, channel: &str) -> Option<f64> {
        self.get(channel)?.value.as_ref()?.as_f64()
    }

    /// Filtered textual value of a channel.
    pub fn text(&self, channel: &str) -> Option<&str> {
        self.get(channel)?.value.as_ref()?.as_str()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ChannelSample)> {
        self.channels.iter()
    }

    /// Channels currently marked stale.
    pub fn stale_channels(&self) -> impl Iterator<Item = &str> {
        self.channels
            .iter()
            .filter(|(_, s)| s.stale)
            .map(|(name, _)| name.as_str())
    }

    /// Attach a health report, consuming the snapshot.
    pub fn with_health(mut self, health: HealthReport) -> Self {
        self.health = Some(health);
        self
    }
}

/// Builder for constructing [`Snapshot`] instances.
#[derive(Debug)]
pub struct SnapshotBuilder {
    device: String,
    timestamp_ms: Option<u64>,
    channels: BTreeMap<String, ChannelSample>,
}

impl SnapshotBuilder {
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            timestamp_ms: None,
            channels: BTreeMap::new(),
        }
    }

    /// Set a specific timestamp (milliseconds since Unix epoch).
    pub fn timestamp_ms(mut self, ts: u64) -> Self {
        self.timestamp_ms = Some(ts);
        self
    }

    pub fn sample(mut self, channel: impl Into<String>, sample: ChannelSample) -> Self {
        self.channels.insert(channel.into(), sample);
        self
    }

    /// Shorthand for an accepted numeric sample.
    pub fn number(self, channel: impl Into<String>, subsystem: Subsystem, value: f64) -> Self {
        self.sample(channel, ChannelSample::accepted(subsystem, ChannelValue::Number(value)))
    }

    /// Shorthand for an accepted textual sample.
    pub fn text(self, channel: impl Into<String>, subsystem: Subsystem, value: &str) -> Self {
        self.sample(channel, ChannelSample::accepted(subsystem, value.into()))
    }

    /// Build the snapshot, stamping it with the current time if no timestamp was set.
    pub fn build(self) -> Snapshot {
        Snapshot {
            version: SchemaVersion::current(),
            device: self.device,
            timestamp_ms: self.timestamp_ms.unwrap_or_else(current_timestamp_ms),
            channels: self.channels,
            health: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_builder() {
        let snapshot = Snapshot::builder("timecard0")
            .timestamp_ms(1703160000000)
            .number("clock_offset_ns", Subsystem::Timing, -42.0)
            .text("gnss_sync", Subsystem::Gnss, "SYNC")
            .sample(
                "voltage_3v3",
                ChannelSample::rejected(Subsystem::Power, Some(3.3.into()), FilterReason::Outlier)
                    .stale(true),
            )
            .build();

        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot.timestamp_ms, 1703160000000);
        assert_eq!(snapshot.number("clock_offset_ns"), Some(-42.0));
        assert_eq!(snapshot.text("gnss_sync"), Some("SYNC"));
        assert_eq!(snapshot.stale_channels().collect::<Vec<_>>(), vec!["voltage_3v3"]);
        assert!(snapshot.version.is_compatible());
        assert!(snapshot.health.is_none());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_serde_roundtrip() {
        let snapshot = Snapshot::builder("dev0")
            .timestamp_ms(1703160000000)
            .number("voltage_12v", Subsystem::Power, 12.1)
            .build()
            .with_health(HealthReport::from_components([(Subsystem::Power, 90)]));

        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("\"reason\":\"ok\""));
        let parsed: Snapshot = serde_json::from_str(&json).unwrap();

        assert_eq!(snapshot, parsed);
    }
}
