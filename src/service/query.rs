//! Read and configuration operations an outer HTTP or CLI layer exposes.

use std::sync::Arc;

use ocpwatch_types::{sort_alerts, Alert, Device, HealthReport, Page, Snapshot};
use serde::Serialize;

use super::MonitoringService;
use crate::config::{ConfigPatch, MonitorConfig};
use crate::error::{MonitorError, Result};

/// Current state of one device.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceStatus {
    pub device: Device,
    /// Most recent snapshot, absent until the first cycle completes.
    pub latest: Option<Arc<Snapshot>>,
    /// Active alerts, critical first then newest.
    pub alerts: Vec<Alert>,
    pub health: Option<HealthReport>,
}

impl MonitoringService {
    /// Every registered device, ordered by id.
    pub fn list_devices(&self) -> Vec<Device> {
        self.shared
            .registry
            .entries()
            .iter()
            .map(|entry| entry.device.read().clone())
            .collect()
    }

    pub fn get_status(&self, device: &str) -> Result<DeviceStatus> {
        let entry = self.shared.registry.get(device)?;
        let latest = entry.latest.read().clone();
        let health = latest.as_ref().and_then(|s| s.health.clone());
        let device_info = entry.device.read().clone();
        Ok(DeviceStatus {
            device: device_info,
            latest,
            alerts: self.shared.alerts.active_alerts(device),
            health,
        })
    }

    /// A page of stored snapshots, oldest first.
    pub fn get_history(&self, device: &str, offset: usize, limit: usize) -> Result<Page<Arc<Snapshot>>> {
        self.shared.history.query_snapshots(device, offset, limit)
    }

    /// A page of archived alerts, oldest first. Cleared alerts carry their
    /// `cleared_at_ms`.
    pub fn get_alert_history(&self, device: &str, offset: usize, limit: usize) -> Result<Page<Alert>> {
        self.shared.history.query_alerts(device, offset, limit)
    }

    /// Drop stored snapshots and archived alerts for a device. Active alerts
    /// and the latest snapshot are unaffected.
    pub fn clear_history(&self, device: &str) -> Result<()> {
        if !self.shared.registry.contains(device) {
            return Err(MonitorError::DeviceNotFound(device.to_string()));
        }
        self.shared.history.clear(device)?;
        tracing::info!(device = %device, "history cleared");
        Ok(())
    }

    /// Active alerts for one device, or for every device when `device` is `None`.
    pub fn get_alerts(&self, device: Option<&str>) -> Result<Vec<Alert>> {
        match device {
            Some(id) => {
                if !self.shared.registry.contains(id) {
                    return Err(MonitorError::DeviceNotFound(id.to_string()));
                }
                Ok(self.shared.alerts.active_alerts(id))
            }
            None => {
                let mut alerts = self.shared.alerts.all_active();
                sort_alerts(&mut alerts);
                Ok(alerts)
            }
        }
    }

    pub fn get_config(&self) -> Arc<MonitorConfig> {
        self.shared.config.current()
    }

    /// Apply a partial configuration update.
    ///
    /// The patch is validated as a whole; on error nothing changes. History
    /// capacities, queue size and stale escalation apply immediately; rules,
    /// filters and the poll interval from the next cycle on.
    pub fn set_config(&self, patch: &ConfigPatch) -> Result<Arc<MonitorConfig>> {
        // Concurrent updates must reach the stores in the order they
        // reached the live config.
        let _guard = self.shared.config_lock.lock();
        let config = self.shared.config.update(patch).map_err(|e| {
            tracing::warn!(error = %e, "configuration update rejected");
            e
        })?;

        self.shared
            .history
            .set_capacity(config.history.snapshots, config.history.alerts);
        self.shared.hub.set_queue_capacity(config.subscriber_queue);
        self.shared.alerts.set_stale_escalation(config.stale_escalation);

        tracing::info!(
            interval = ?config.poll_interval,
            rules = config.rules.len(),
            "configuration updated"
        );
        Ok(config)
    }

    /// Replace a device's capability list after re-discovery.
    pub async fn refresh_capabilities(&self, device: &str, capabilities: Vec<String>) -> Result<Device> {
        let entry = self.shared.registry.get(device)?;
        let mut sampler = entry.sampler.lock().await;
        let updated = {
            let mut current = entry.device.write();
            current.capabilities = capabilities;
            current.clone()
        };
        sampler.set_device(updated.clone(), &self.shared.config.current());
        tracing::info!(device = %device, capabilities = ?updated.capabilities, "capabilities refreshed");
        Ok(updated)
    }
}
