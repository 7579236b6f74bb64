//! Channel-based data source.
//!
//! Readings are pushed through a tokio watch channel rather than polled from
//! a file. Useful when another task in the same process owns the hardware,
//! and for driving the pipeline deterministically in tests.

use async_trait::async_trait;
use ocpwatch_types::{ChannelValue, Reading};
use tokio::sync::watch;

use crate::readings::{lookup, ReadingsMap};
use crate::DataSource;

/// Sending half of a [`ChannelSource`].
#[derive(Debug, Clone)]
pub struct ReadingsSender {
    tx: watch::Sender<ReadingsMap>,
}

impl ReadingsSender {
    /// Set the raw value of one channel, creating the device if needed.
    pub fn set(&self, device: &str, channel: &str, value: impl Into<ChannelValue>) {
        let value = value.into();
        self.tx.send_modify(|map| {
            map.entry(device.to_string())
                .or_default()
                .channels
                .insert(channel.to_string(), Some(value));
        });
    }

    /// Make one channel read as unavailable.
    pub fn clear(&self, device: &str, channel: &str) {
        self.tx.send_modify(|map| {
            map.entry(device.to_string())
                .or_default()
                .channels
                .insert(channel.to_string(), None);
        });
    }

    /// Mark a whole device as reachable or not.
    pub fn set_available(&self, device: &str, available: bool) {
        self.tx.send_modify(|map| {
            map.entry(device.to_string()).or_default().available = available;
        });
    }

    /// Replace every reading at once.
    pub fn replace(&self, readings: ReadingsMap) {
        self.tx.send_replace(readings);
    }
}

/// A data source that serves whatever was last pushed through its sender.
///
/// # Example
///
/// ```
/// use ocpwatch_sources::ChannelSource;
///
/// let (tx, source) = ChannelSource::create("i2c collector");
/// tx.set("timecard0", "voltage_3v3", 3.31);
/// ```
#[derive(Debug)]
pub struct ChannelSource {
    receiver: watch::Receiver<ReadingsMap>,
    description: String,
}

impl ChannelSource {
    /// Create a new channel source from the receiving end of a watch channel.
    pub fn new(receiver: watch::Receiver<ReadingsMap>, source_description: &str) -> Self {
        let description = format!("channel: {}", source_description);
        Self {
            receiver,
            description,
        }
    }

    /// Create a sender/source pair starting with no readings.
    pub fn create(source_description: &str) -> (ReadingsSender, Self) {
        let (tx, rx) = watch::channel(ReadingsMap::new());
        (ReadingsSender { tx }, Self::new(rx, source_description))
    }
}

#[async_trait]
impl DataSource for ChannelSource {
    async fn read(&self, device: &str, channel: &str) -> Reading {
        lookup(&self.receiver.borrow(), device, channel)
    }

    async fn is_available(&self, device: &str) -> bool {
        self.receiver
            .borrow()
            .get(device)
            .map(|d| d.available)
            .unwrap_or(false)
    }

    fn describe(&self) -> &str {
        &self.description
    }
}
