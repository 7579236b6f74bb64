//! The monitoring service: device registry, per-device tasks and shutdown.
//!
//! [`MonitoringService`] is an explicit value. Constructing one starts
//! nothing; each [`add_device`](MonitoringService::add_device) spawns one
//! tokio task that polls that device on the configured interval, and
//! [`shutdown`](MonitoringService::shutdown) stops them all.

mod query;
mod registry;

use std::sync::{Arc, Weak};
use std::time::Duration;

use ocpwatch_sources::DataSource;
use ocpwatch_types::{Device, MonitorEvent, Snapshot};
use tokio::sync::watch;
use tokio::time::{Instant, Interval, MissedTickBehavior};

use crate::config::{LiveConfig, MonitorConfig};
use crate::error::{MonitorError, Result};
use crate::history::HistoryStore;
use crate::hub::{PublishHub, Subscription};
use crate::pipeline::{AlertEngine, HealthScorer, MetricSampler};

pub use query::DeviceStatus;
use registry::{DeviceEntry, DeviceRegistry};

/// State shared by the service handle and every device task.
#[derive(Debug)]
struct Shared {
    config: LiveConfig,
    /// Held while a config update is applied to the stores it sizes.
    config_lock: parking_lot::Mutex<()>,
    registry: DeviceRegistry,
    alerts: AlertEngine,
    history: HistoryStore,
    hub: PublishHub,
}

impl Shared {
    /// One full cycle for one device: sample, evaluate, score, record, publish.
    ///
    /// The caller holds the device's sampler lock for the duration, which is
    /// what keeps per-device delivery in production order.
    async fn run_cycle(&self, entry: &DeviceEntry, sampler: &mut MetricSampler) -> Arc<Snapshot> {
        let config = self.config.current();
        sampler.reconfigure(&config);

        let snapshot = sampler.poll(entry.source.as_ref()).await;
        let transitions = self.alerts.apply(&snapshot, &config.rules);
        let active = self.alerts.active_alerts(&snapshot.device);
        let health = HealthScorer::new(config.health).report(&snapshot, &active);
        let snapshot = Arc::new(snapshot.with_health(health));

        self.history.append_snapshot(snapshot.clone());
        for alert in &transitions.cleared {
            self.history.mark_cleared(alert);
        }
        for alert in &transitions.raised {
            self.history.append_alert(alert.clone());
        }
        *entry.latest.write() = Some(snapshot.clone());

        tracing::trace!(
            device = %snapshot.device,
            timestamp_ms = snapshot.timestamp_ms,
            stale = snapshot.stale_channels().count(),
            "cycle complete"
        );

        self.hub.publish(MonitorEvent::snapshot(snapshot.clone()));
        for alert in transitions.raised {
            self.hub.publish(MonitorEvent::alert(alert));
        }
        snapshot
    }
}

fn ticker(period: Duration) -> Interval {
    let mut ticker = tokio::time::interval_at(Instant::now(), period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

/// Poll loop for one device. Exits when stopped or when the service is gone.
async fn run_device(shared: Weak<Shared>, entry: Arc<DeviceEntry>, mut stop_rx: watch::Receiver<bool>) {
    let Some(mut config_rx) = shared.upgrade().map(|s| s.config.watch()) else {
        return;
    };
    let mut period = config_rx.borrow_and_update().poll_interval;
    let mut interval = ticker(period);
    let id = entry.id();

    tracing::info!(device = %id, interval = ?period, source = entry.source.describe(), "monitoring started");

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let Some(shared) = shared.upgrade() else {
                    break;
                };
                // An on-demand poll is still running; skip rather than queue
                let Ok(mut sampler) = entry.sampler.try_lock() else {
                    tracing::debug!(device = %id, "previous cycle still running, tick skipped");
                    continue;
                };
                if entry.is_stopping() {
                    break;
                }
                shared.run_cycle(&entry, &mut sampler).await;
            }
            changed = config_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let next = config_rx.borrow_and_update().poll_interval;
                if next != period {
                    tracing::info!(device = %id, interval = ?next, "poll interval changed");
                    period = next;
                    interval = ticker(period);
                    interval.reset();
                }
            }
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    break;
                }
            }
        }
    }

    tracing::info!(device = %id, "monitoring stopped");
}

/// Owns every monitored device and the components they feed.
///
/// Cheap to clone; clones share the same state.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use ocpwatch::{MonitorConfig, MonitoringService};
/// use ocpwatch_sources::ChannelSource;
/// use ocpwatch_types::Device;
///
/// # tokio_test::block_on(async {
/// let (readings, source) = ChannelSource::create("example");
/// readings.set("dev0", "clock_offset_ns", 120.0);
///
/// let service = MonitoringService::new(MonitorConfig::default()).unwrap();
/// service.add_device(Device::timecard("dev0"), Arc::new(source)).unwrap();
///
/// let snapshot = service.poll_now("dev0").await.unwrap();
/// assert_eq!(snapshot.number("clock_offset_ns"), Some(120.0));
///
/// service.shutdown().await;
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct MonitoringService {
    shared: Arc<Shared>,
}

impl MonitoringService {
    /// Create a service with no devices. Fails if `config` does not validate.
    pub fn new(config: MonitorConfig) -> Result<Self> {
        config.validate()?;
        let shared = Shared {
            alerts: AlertEngine::new(config.stale_escalation),
            history: HistoryStore::new(config.history.snapshots, config.history.alerts),
            hub: PublishHub::new(config.subscriber_queue),
            registry: DeviceRegistry::default(),
            config: LiveConfig::new(config),
            config_lock: parking_lot::Mutex::new(()),
        };
        Ok(Self {
            shared: Arc::new(shared),
        })
    }

    /// Start monitoring `device`, reading from `source`.
    ///
    /// Must be called within a tokio runtime.
    pub fn add_device(&self, device: Device, source: Arc<dyn DataSource>) -> Result<()> {
        if device.id.trim().is_empty() {
            return Err(MonitorError::invalid("device id must not be empty"));
        }
        let id = device.id.clone();
        let config = self.shared.config.current();
        let sampler = MetricSampler::new(device.clone(), &config);
        let entry = Arc::new(DeviceEntry::new(device, source, sampler));

        self.shared.registry.insert(&id, entry.clone())?;
        self.shared.history.register(&id);

        let handle = tokio::spawn(run_device(
            Arc::downgrade(&self.shared),
            entry.clone(),
            entry.stop_signal(),
        ));
        entry.set_task(handle);
        Ok(())
    }

    /// Add every device listed in the configuration, all reading from `source`.
    pub fn add_configured_devices(&self, source: Arc<dyn DataSource>) -> Result<usize> {
        let devices: Vec<Device> = self
            .shared
            .config
            .current()
            .devices
            .iter()
            .map(|d| d.to_device())
            .collect();
        let count = devices.len();
        for device in devices {
            self.add_device(device, source.clone())?;
        }
        Ok(count)
    }

    /// Run one cycle for `device` immediately, outside its schedule.
    ///
    /// Waits for a scheduled cycle already in progress.
    pub async fn poll_now(&self, device: &str) -> Result<Arc<Snapshot>> {
        let entry = self.shared.registry.get(device)?;
        let mut sampler = entry.sampler.lock().await;
        if entry.is_stopping() {
            return Err(MonitorError::DeviceNotFound(device.to_string()));
        }
        Ok(self.shared.run_cycle(&entry, &mut sampler).await)
    }

    /// Stop monitoring `device`. The in-flight cycle, if any, completes
    /// before the device is deregistered and its history released.
    pub async fn stop_device(&self, device: &str) -> Result<()> {
        let entry = self.shared.registry.get(device)?;
        entry.stop().await;

        let _sampler = entry.sampler.lock().await;
        self.shared.registry.remove(device);
        self.shared.alerts.remove_device(device);
        self.shared.history.remove(device);
        tracing::info!(device = %device, "device removed");
        Ok(())
    }

    /// Stop every device and end all subscriptions.
    pub async fn shutdown(&self) {
        for id in self.shared.registry.ids() {
            if let Err(e) = self.stop_device(&id).await {
                tracing::debug!(device = %id, error = %e, "already removed");
            }
        }
        self.shared.hub.close();
        tracing::info!("monitoring service shut down");
    }

    /// Subscribe to the live event stream.
    pub fn subscribe(&self) -> Subscription {
        self.shared.hub.subscribe()
    }

    pub fn unsubscribe(&self, subscription: &Subscription) -> bool {
        self.shared.hub.unsubscribe(subscription.id())
    }

    pub fn device_count(&self) -> usize {
        self.shared.registry.len()
    }

    pub fn is_monitoring(&self, device: &str) -> bool {
        self.shared.registry.contains(device)
    }
}
