//! Registered devices and their per-device runtime state.

use std::collections::BTreeMap;
use std::sync::Arc;

use ocpwatch_sources::DataSource;
use ocpwatch_types::{Device, Snapshot};
use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::{MonitorError, Result};
use crate::pipeline::MetricSampler;

/// One monitored device.
#[derive(Debug)]
pub(crate) struct DeviceEntry {
    pub(crate) device: RwLock<Device>,
    pub(crate) source: Arc<dyn DataSource>,
    /// Held for a whole cycle, so cycles of one device never interleave.
    pub(crate) sampler: tokio::sync::Mutex<MetricSampler>,
    pub(crate) latest: RwLock<Option<Arc<Snapshot>>>,
    stop_tx: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl DeviceEntry {
    pub(crate) fn new(device: Device, source: Arc<dyn DataSource>, sampler: MetricSampler) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            device: RwLock::new(device),
            source,
            sampler: tokio::sync::Mutex::new(sampler),
            latest: RwLock::new(None),
            stop_tx,
            task: Mutex::new(None),
        }
    }

    pub(crate) fn id(&self) -> String {
        self.device.read().id.clone()
    }

    pub(crate) fn stop_signal(&self) -> watch::Receiver<bool> {
        self.stop_tx.subscribe()
    }

    pub(crate) fn is_stopping(&self) -> bool {
        *self.stop_tx.borrow()
    }

    pub(crate) fn set_task(&self, handle: JoinHandle<()>) {
        *self.task.lock() = Some(handle);
    }

    /// Signal the device task and wait for it to exit. A cycle already in
    /// progress runs to completion first.
    pub(crate) async fn stop(&self) {
        self.stop_tx.send_replace(true);
        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::warn!(device = %self.id(), error = %e, "device task ended abnormally");
            }
        }
    }
}

/// Devices keyed by id.
#[derive(Debug, Default)]
pub(crate) struct DeviceRegistry {
    devices: RwLock<BTreeMap<String, Arc<DeviceEntry>>>,
}

impl DeviceRegistry {
    pub(crate) fn insert(&self, id: &str, entry: Arc<DeviceEntry>) -> Result<()> {
        let mut devices = self.devices.write();
        if devices.contains_key(id) {
            return Err(MonitorError::DeviceExists(id.to_string()));
        }
        devices.insert(id.to_string(), entry);
        Ok(())
    }

    pub(crate) fn get(&self, id: &str) -> Result<Arc<DeviceEntry>> {
        self.devices
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| MonitorError::DeviceNotFound(id.to_string()))
    }

    pub(crate) fn contains(&self, id: &str) -> bool {
        self.devices.read().contains_key(id)
    }

    pub(crate) fn remove(&self, id: &str) -> Option<Arc<DeviceEntry>> {
        self.devices.write().remove(id)
    }

    pub(crate) fn ids(&self) -> Vec<String> {
        self.devices.read().keys().cloned().collect()
    }

    pub(crate) fn entries(&self) -> Vec<Arc<DeviceEntry>> {
        self.devices.read().values().cloned().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.devices.read().len()
    }
}
