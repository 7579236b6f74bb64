//! One polling cycle for one device.

use std::collections::BTreeMap;
use std::time::Duration;

use futures_util::future::join_all;
use ocpwatch_sources::{DataSource, SourceError};
use ocpwatch_types::{current_timestamp_ms, ChannelSample, Device, Reading, Snapshot};

use super::filter::SignalFilter;
use crate::config::MonitorConfig;

/// Reads every channel of a device and runs it through that channel's filter.
///
/// Owns the filter state for the device. A sampler is driven by exactly one
/// task at a time, so filters need no locking of their own.
#[derive(Debug)]
pub struct MetricSampler {
    device: Device,
    filters: BTreeMap<String, SignalFilter>,
    read_timeout: Duration,
    last_timestamp_ms: Option<u64>,
}

impl MetricSampler {
    pub fn new(device: Device, config: &MonitorConfig) -> Self {
        let filters = device
            .channels
            .iter()
            .map(|spec| {
                (
                    spec.name.clone(),
                    SignalFilter::new(spec, config.channel_filter(&spec.name)),
                )
            })
            .collect();
        Self {
            device,
            filters,
            read_timeout: config.read_timeout,
            last_timestamp_ms: None,
        }
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn filter(&self, channel: &str) -> Option<&SignalFilter> {
        self.filters.get(channel)
    }

    /// Timestamp of the last snapshot produced.
    pub fn last_timestamp_ms(&self) -> Option<u64> {
        self.last_timestamp_ms
    }

    /// Pick up new filter settings and read timeout.
    pub fn reconfigure(&mut self, config: &MonitorConfig) {
        self.read_timeout = config.read_timeout;
        for (name, filter) in self.filters.iter_mut() {
            filter.reconfigure(config.channel_filter(name));
        }
    }

    /// Replace the device description. Filters of channels that remain keep
    /// their state; new channels start cold.
    pub fn set_device(&mut self, device: Device, config: &MonitorConfig) {
        let mut filters = std::mem::take(&mut self.filters);
        self.filters = device
            .channels
            .iter()
            .map(|spec| {
                let filter = match filters.remove(&spec.name) {
                    Some(mut existing) => {
                        existing.reconfigure(config.channel_filter(&spec.name));
                        existing
                    }
                    None => SignalFilter::new(spec, config.channel_filter(&spec.name)),
                };
                (spec.name.clone(), filter)
            })
            .collect();
        self.device = device;
    }

    /// Poll the device now.
    pub async fn poll(&mut self, source: &dyn DataSource) -> Snapshot {
        self.poll_at(source, current_timestamp_ms()).await
    }

    /// Poll the device, stamping the snapshot with `now_ms` or, if that is
    /// not after the previous snapshot, one millisecond past it.
    pub async fn poll_at(&mut self, source: &dyn DataSource, now_ms: u64) -> Snapshot {
        let id = self.device.id.as_str();
        let timeout = self.read_timeout;

        let available = tokio::time::timeout(timeout, source.is_available(id))
            .await
            .unwrap_or(false);

        let readings: Vec<Reading> = if available {
            join_all(self.device.channels.iter().map(|spec| async move {
                match tokio::time::timeout(timeout, source.read(id, &spec.name)).await {
                    Ok(reading) => reading,
                    Err(_) => SourceError::Timeout.into(),
                }
            }))
            .await
        } else {
            tracing::debug!(device = %id, source = source.describe(), "device unavailable");
            vec![Reading::unavailable("device unavailable"); self.device.channels.len()]
        };

        let timestamp_ms = match self.last_timestamp_ms {
            Some(last) if now_ms <= last => last + 1,
            _ => now_ms,
        };
        self.last_timestamp_ms = Some(timestamp_ms);

        let mut builder = Snapshot::builder(self.device.id.clone()).timestamp_ms(timestamp_ms);
        for (spec, reading) in self.device.channels.iter().zip(readings) {
            let Some(filter) = self.filters.get_mut(&spec.name) else {
                continue;
            };
            let outcome = filter.filter(reading);
            builder = builder.sample(
                spec.name.clone(),
                ChannelSample {
                    value: outcome.value,
                    accepted: outcome.accepted,
                    reason: outcome.reason,
                    // An unreachable device reports every channel stale at once
                    stale: outcome.stale || !available,
                    subsystem: spec.subsystem,
                },
            );
        }
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ocpwatch_sources::ChannelSource;
    use ocpwatch_types::{ChannelSpec, FilterReason, Subsystem};

    fn device() -> Device {
        Device::builder("dev0")
            .channel(ChannelSpec::numeric("clock_offset_ns", Subsystem::Timing, -1e9, 1e9))
            .channel(ChannelSpec::numeric("voltage_3v3", Subsystem::Power, 2.5, 4.0))
            .channel(ChannelSpec::enumerated("gnss_sync", Subsystem::Gnss, &["SYNC", "LOST"]))
            .build()
    }

    #[derive(Debug)]
    struct HangingSource;

    #[async_trait]
    impl DataSource for HangingSource {
        async fn read(&self, _device: &str, channel: &str) -> Reading {
            if channel == "voltage_3v3" {
                std::future::pending::<()>().await;
            }
            Reading::number(1.0)
        }

        fn describe(&self) -> &str {
            "hanging"
        }
    }

    #[tokio::test]
    async fn builds_snapshot_from_all_channels() {
        let (tx, source) = ChannelSource::create("test");
        tx.set("dev0", "clock_offset_ns", 12.0);
        tx.set("dev0", "voltage_3v3", 3.3);
        tx.set("dev0", "gnss_sync", "SYNC");

        let mut sampler = MetricSampler::new(device(), &MonitorConfig::default());
        let snapshot = sampler.poll_at(&source, 1_000).await;

        assert_eq!(snapshot.device, "dev0");
        assert_eq!(snapshot.timestamp_ms, 1_000);
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot.number("clock_offset_ns"), Some(12.0));
        assert_eq!(snapshot.text("gnss_sync"), Some("SYNC"));
        assert!(snapshot.iter().all(|(_, s)| s.accepted && !s.stale));
    }

    #[tokio::test]
    async fn failing_channel_does_not_abort_poll() {
        let (tx, source) = ChannelSource::create("test");
        tx.set("dev0", "clock_offset_ns", 12.0);
        tx.clear("dev0", "voltage_3v3");

        let mut sampler = MetricSampler::new(device(), &MonitorConfig::default());
        let snapshot = sampler.poll_at(&source, 1_000).await;

        assert!(snapshot.get("clock_offset_ns").unwrap().accepted);
        let rail = snapshot.get("voltage_3v3").unwrap();
        assert!(!rail.accepted);
        assert_eq!(rail.reason, FilterReason::Unavailable);
        // gnss_sync was never pushed at all
        assert_eq!(snapshot.get("gnss_sync").unwrap().reason, FilterReason::Unavailable);
    }

    #[tokio::test]
    async fn timestamps_strictly_increase() {
        let (tx, source) = ChannelSource::create("test");
        tx.set("dev0", "clock_offset_ns", 1.0);
        let mut sampler = MetricSampler::new(device(), &MonitorConfig::default());

        let a = sampler.poll_at(&source, 5_000).await.timestamp_ms;
        let b = sampler.poll_at(&source, 5_000).await.timestamp_ms;
        let c = sampler.poll_at(&source, 4_000).await.timestamp_ms;
        let d = sampler.poll_at(&source, 9_000).await.timestamp_ms;
        assert!(a < b && b < c && c < d);
        assert_eq!(d, 9_000);
    }

    #[tokio::test]
    async fn unavailable_device_still_produces_snapshot() {
        let (tx, source) = ChannelSource::create("test");
        tx.set("dev0", "clock_offset_ns", 1.0);
        tx.set_available("dev0", false);

        let mut sampler = MetricSampler::new(device(), &MonitorConfig::default());
        let snapshot = sampler.poll_at(&source, 1).await;
        assert_eq!(snapshot.len(), 3);
        assert!(snapshot.iter().all(|(_, s)| s.stale && !s.accepted));
    }

    #[tokio::test(start_paused = true)]
    async fn hung_read_times_out() {
        let mut sampler = MetricSampler::new(device(), &MonitorConfig::default());
        let snapshot = sampler.poll_at(&HangingSource, 1).await;

        let rail = snapshot.get("voltage_3v3").unwrap();
        assert_eq!(rail.reason, FilterReason::Unavailable);
        assert!(snapshot.get("clock_offset_ns").unwrap().accepted);
    }

    #[tokio::test]
    async fn set_device_keeps_existing_filters() {
        let (tx, source) = ChannelSource::create("test");
        tx.set("dev0", "clock_offset_ns", 10.0);
        let config = MonitorConfig::default();
        let mut sampler = MetricSampler::new(device(), &config);
        sampler.poll_at(&source, 1).await;

        let mut refreshed = device();
        refreshed.channels.retain(|c| c.name != "gnss_sync");
        refreshed
            .channels
            .push(ChannelSpec::numeric("voltage_12v", Subsystem::Power, 10.0, 15.0));
        sampler.set_device(refreshed, &config);

        assert!(sampler.filter("gnss_sync").is_none());
        assert!(sampler.filter("voltage_12v").is_some());
        assert_eq!(
            sampler.filter("clock_offset_ns").and_then(|f| f.last_good()).and_then(|v| v.as_f64()),
            Some(10.0)
        );
    }
}
