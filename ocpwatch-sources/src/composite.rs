//! Per-channel routing across several sources.
//!
//! A Time Card's telemetry comes from different places: the PTP clock via
//! the driver, rails via INA219 monitors, temperatures via PCT2075 sensors.
//! A [`CompositeSource`] fixes at construction which source owns which
//! channel, so nothing downstream dispatches on sensor names.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use ocpwatch_types::Reading;

use crate::DataSource;

/// Routes each channel to the source that owns it, falling back to a
/// primary source for unrouted channels.
#[derive(Debug)]
pub struct CompositeSource {
    primary: Arc<dyn DataSource>,
    routes: BTreeMap<String, Arc<dyn DataSource>>,
    description: String,
}

impl CompositeSource {
    /// Create a builder around the primary source.
    pub fn builder(primary: Arc<dyn DataSource>) -> CompositeSourceBuilder {
        CompositeSourceBuilder {
            primary,
            routes: BTreeMap::new(),
        }
    }

    /// The source that serves `channel`.
    pub fn source_for(&self, channel: &str) -> &Arc<dyn DataSource> {
        self.routes.get(channel).unwrap_or(&self.primary)
    }
}

/// Builder for [`CompositeSource`].
#[derive(Debug)]
pub struct CompositeSourceBuilder {
    primary: Arc<dyn DataSource>,
    routes: BTreeMap<String, Arc<dyn DataSource>>,
}

impl CompositeSourceBuilder {
    /// Serve `channel` from `source`.
    pub fn route(mut self, channel: impl Into<String>, source: Arc<dyn DataSource>) -> Self {
        self.routes.insert(channel.into(), source);
        self
    }

    /// Serve every channel in `channels` from `source`.
    pub fn route_all<I, S>(mut self, channels: I, source: Arc<dyn DataSource>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for channel in channels {
            self.routes.insert(channel.into(), source.clone());
        }
        self
    }

    pub fn build(self) -> CompositeSource {
        let description = format!(
            "composite: {} (+{} routed channels)",
            self.primary.describe(),
            self.routes.len()
        );
        CompositeSource {
            primary: self.primary,
            routes: self.routes,
            description,
        }
    }
}

#[async_trait]
impl DataSource for CompositeSource {
    async fn read(&self, device: &str, channel: &str) -> Reading {
        self.source_for(channel).read(device, channel).await
    }

    /// Availability follows the primary source; routed sensors that fail
    /// show up as unavailable channels instead.
    async fn is_available(&self, device: &str) -> bool {
        self.primary.is_available(device).await
    }

    fn describe(&self) -> &str {
        &self.description
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ChannelSource;

    #[tokio::test]
    async fn routes_channels_to_their_sources() {
        let (clock_tx, clock) = ChannelSource::create("driver");
        let (power_tx, power) = ChannelSource::create("ina219");
        clock_tx.set("tc0", "clock_offset_ns", 5.0);
        clock_tx.set("tc0", "voltage_3v3", 9.9);
        power_tx.set("tc0", "voltage_3v3", 3.3);

        let source = CompositeSource::builder(Arc::new(clock))
            .route_all(["voltage_3v3", "voltage_12v"], Arc::new(power))
            .build();

        assert_eq!(source.read("tc0", "clock_offset_ns").await, Reading::number(5.0));
        assert_eq!(source.read("tc0", "voltage_3v3").await, Reading::number(3.3));
        assert!(!source.read("tc0", "voltage_12v").await.is_available());
        assert!(source.is_available("tc0").await);
        assert_eq!(source.describe(), "composite: channel: driver (+2 routed channels)");
    }
}
