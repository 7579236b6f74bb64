//! Bounded per-device history of snapshots and alerts.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ocpwatch_types::{Alert, Page, Snapshot};
use parking_lot::{Mutex, RwLock};

use crate::error::{MonitorError, Result};

/// Largest page a query may request.
pub const MAX_PAGE_LIMIT: usize = 1000;

#[derive(Debug, Default)]
struct DeviceHistory {
    snapshots: VecDeque<Arc<Snapshot>>,
    alerts: VecDeque<Alert>,
}

fn push_bounded<T>(buf: &mut VecDeque<T>, item: T, capacity: usize) {
    while buf.len() >= capacity.max(1) {
        buf.pop_front();
    }
    buf.push_back(item);
}

fn truncate_front<T>(buf: &mut VecDeque<T>, capacity: usize) {
    while buf.len() > capacity {
        buf.pop_front();
    }
}

fn page<T: Clone>(buf: &VecDeque<T>, offset: usize, limit: usize) -> Page<T> {
    let limit = limit.clamp(1, MAX_PAGE_LIMIT);
    Page {
        items: buf.iter().skip(offset).take(limit).cloned().collect(),
        total: buf.len(),
        offset,
        limit,
    }
}

/// Ring buffers of recent snapshots and alerts, one pair per device.
///
/// When a buffer is full the oldest entry is evicted. Pages are returned in
/// chronological order, oldest first.
#[derive(Debug)]
pub struct HistoryStore {
    devices: RwLock<BTreeMap<String, Arc<Mutex<DeviceHistory>>>>,
    snapshot_capacity: AtomicUsize,
    alert_capacity: AtomicUsize,
}

impl HistoryStore {
    pub fn new(snapshot_capacity: usize, alert_capacity: usize) -> Self {
        Self {
            devices: RwLock::new(BTreeMap::new()),
            snapshot_capacity: AtomicUsize::new(snapshot_capacity),
            alert_capacity: AtomicUsize::new(alert_capacity),
        }
    }

    /// Current `(snapshots, alerts)` capacities.
    pub fn capacities(&self) -> (usize, usize) {
        (
            self.snapshot_capacity.load(Ordering::Relaxed),
            self.alert_capacity.load(Ordering::Relaxed),
        )
    }

    /// Change capacities, truncating every device to its most recent entries.
    pub fn set_capacity(&self, snapshots: usize, alerts: usize) {
        self.snapshot_capacity.store(snapshots, Ordering::Relaxed);
        self.alert_capacity.store(alerts, Ordering::Relaxed);
        let devices: Vec<_> = self.devices.read().values().cloned().collect();
        for history in devices {
            let mut history = history.lock();
            truncate_front(&mut history.snapshots, snapshots);
            truncate_front(&mut history.alerts, alerts);
        }
    }

    fn get_or_create(&self, device: &str) -> Arc<Mutex<DeviceHistory>> {
        // Fast path
        {
            let devices = self.devices.read();
            if let Some(history) = devices.get(device) {
                return history.clone();
            }
        }

        // Slow path
        let mut devices = self.devices.write();
        devices
            .entry(device.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(DeviceHistory::default())))
            .clone()
    }

    fn get(&self, device: &str) -> Result<Arc<Mutex<DeviceHistory>>> {
        self.devices
            .read()
            .get(device)
            .cloned()
            .ok_or_else(|| MonitorError::DeviceNotFound(device.to_string()))
    }

    /// Start tracking a device with empty history.
    pub fn register(&self, device: &str) {
        self.get_or_create(device);
    }

    /// Drop a device and all its history.
    pub fn remove(&self, device: &str) {
        self.devices.write().remove(device);
    }

    pub fn contains(&self, device: &str) -> bool {
        self.devices.read().contains_key(device)
    }

    pub fn append_snapshot(&self, snapshot: Arc<Snapshot>) {
        let capacity = self.snapshot_capacity.load(Ordering::Relaxed);
        let history = self.get_or_create(&snapshot.device);
        push_bounded(&mut history.lock().snapshots, snapshot, capacity);
    }

    pub fn append_alert(&self, alert: Alert) {
        let capacity = self.alert_capacity.load(Ordering::Relaxed);
        let history = self.get_or_create(&alert.device);
        push_bounded(&mut history.lock().alerts, alert, capacity);
    }

    /// Mark the archived copy of `alert` cleared. Returns false if it has
    /// already been evicted.
    pub fn mark_cleared(&self, alert: &Alert) -> bool {
        let Ok(history) = self.get(&alert.device) else {
            return false;
        };
        let mut history = history.lock();
        match history.alerts.iter_mut().rev().find(|a| a.id == alert.id) {
            Some(archived) => {
                archived.active = false;
                archived.cleared_at_ms = alert.cleared_at_ms;
                true
            }
            None => false,
        }
    }

    /// Most recent snapshot for a device.
    pub fn latest(&self, device: &str) -> Option<Arc<Snapshot>> {
        self.devices.read().get(device)?.lock().snapshots.back().cloned()
    }

    pub fn query_snapshots(&self, device: &str, offset: usize, limit: usize) -> Result<Page<Arc<Snapshot>>> {
        let history = self.get(device)?;
        let history = history.lock();
        Ok(page(&history.snapshots, offset, limit))
    }

    pub fn query_alerts(&self, device: &str, offset: usize, limit: usize) -> Result<Page<Alert>> {
        let history = self.get(device)?;
        let history = history.lock();
        Ok(page(&history.alerts, offset, limit))
    }

    /// Empty both buffers for a device.
    pub fn clear(&self, device: &str) -> Result<()> {
        let history = self.get(device)?;
        let mut history = history.lock();
        history.snapshots.clear();
        history.alerts.clear();
        Ok(())
    }
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new(1000, 500)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ocpwatch_types::{Severity, Subsystem};

    fn snapshot(device: &str, ts: u64) -> Arc<Snapshot> {
        Arc::new(
            Snapshot::builder(device)
                .timestamp_ms(ts)
                .number("clock_offset_ns", Subsystem::Timing, ts as f64)
                .build(),
        )
    }

    fn alert(id: u64) -> Alert {
        Alert {
            id,
            device: "dev0".into(),
            rule_id: "clock_offset".into(),
            channel: "clock_offset_ns".into(),
            severity: Severity::Critical,
            message: "offset".into(),
            value: None,
            threshold: Some(10000.0),
            timestamp_ms: id,
            active: true,
            cleared_at_ms: None,
        }
    }

    #[test]
    fn evicts_oldest_beyond_capacity() {
        let store = HistoryStore::new(5, 5);
        for ts in 1..=6 {
            store.append_snapshot(snapshot("dev0", ts));
        }

        let page = store.query_snapshots("dev0", 0, 100).unwrap();
        assert_eq!(page.total, 5);
        let ts: Vec<u64> = page.items.iter().map(|s| s.timestamp_ms).collect();
        assert_eq!(ts, vec![2, 3, 4, 5, 6]);
    }

    #[test]
    fn pages_are_disjoint_and_contiguous() {
        let store = HistoryStore::default();
        for ts in 1..=25 {
            store.append_snapshot(snapshot("dev0", ts));
        }

        let first = store.query_snapshots("dev0", 0, 10).unwrap();
        let second = store.query_snapshots("dev0", 10, 10).unwrap();
        assert_eq!(first.total, 25);
        assert_eq!(second.total, 25);
        assert_eq!(first.items.last().unwrap().timestamp_ms + 1, second.items[0].timestamp_ms);
        assert!(first
            .items
            .iter()
            .all(|a| second.items.iter().all(|b| a.timestamp_ms != b.timestamp_ms)));
        assert!(second.has_more());
    }

    #[test]
    fn limit_is_clamped() {
        let store = HistoryStore::new(2000, 10);
        for ts in 1..=1500 {
            store.append_snapshot(snapshot("dev0", ts));
        }
        assert_eq!(store.query_snapshots("dev0", 0, 5000).unwrap().len(), MAX_PAGE_LIMIT);
        let page = store.query_snapshots("dev0", 0, 0).unwrap();
        assert_eq!(page.limit, 1);
        assert_eq!(page.len(), 1);
        assert!(store.query_snapshots("dev0", 9999, 10).unwrap().is_empty());
    }

    #[test]
    fn shrinking_capacity_keeps_most_recent() {
        let store = HistoryStore::new(10, 10);
        for ts in 1..=10 {
            store.append_snapshot(snapshot("dev0", ts));
        }
        store.set_capacity(3, 10);
        let page = store.query_snapshots("dev0", 0, 10).unwrap();
        let ts: Vec<u64> = page.items.iter().map(|s| s.timestamp_ms).collect();
        assert_eq!(ts, vec![8, 9, 10]);

        store.append_snapshot(snapshot("dev0", 11));
        assert_eq!(store.query_snapshots("dev0", 0, 10).unwrap().total, 3);
    }

    #[test]
    fn unknown_device_is_not_found() {
        let store = HistoryStore::default();
        assert!(matches!(
            store.query_snapshots("ghost", 0, 10),
            Err(MonitorError::DeviceNotFound(_))
        ));
        assert!(store.clear("ghost").unwrap_err().is_not_found());

        store.register("dev0");
        assert_eq!(store.query_alerts("dev0", 0, 10).unwrap().total, 0);
    }

    #[test]
    fn mark_cleared_updates_archive() {
        let store = HistoryStore::default();
        store.append_alert(alert(1));
        let mut cleared = alert(1);
        cleared.clear(42);
        assert!(store.mark_cleared(&cleared));

        let page = store.query_alerts("dev0", 0, 10).unwrap();
        assert!(!page.items[0].active);
        assert_eq!(page.items[0].cleared_at_ms, Some(42));
        assert!(!store.mark_cleared(&alert(99)));
    }

    #[test]
    fn clear_empties_device() {
        let store = HistoryStore::default();
        store.append_snapshot(snapshot("dev0", 1));
        store.append_alert(alert(1));
        store.clear("dev0").unwrap();
        assert_eq!(store.query_snapshots("dev0", 0, 10).unwrap().total, 0);
        assert_eq!(store.query_alerts("dev0", 0, 10).unwrap().total, 0);
        assert!(store.latest("dev0").is_none());
    }
}
