//! Events delivered to subscribers.

use std::sync::Arc;

use crate::{Alert, Snapshot};

/// Kind of a [`MonitorEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum EventKind {
    Snapshot,
    Alert,
}

/// Payload of a [`MonitorEvent`].
///
/// Snapshots are shared between subscribers rather than cloned per queue.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum EventPayload {
    Snapshot(Arc<Snapshot>),
    Alert(Alert),
}

/// One item of the live stream: `{type, device, timestamp_ms, payload}`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MonitorEvent {
    #[cfg_attr(feature = "serde", serde(rename = "type"))]
    pub kind: EventKind,
    pub device: String,
    pub timestamp_ms: u64,
    pub payload: EventPayload,
}

impl MonitorEvent {
    pub fn snapshot(snapshot: Arc<Snapshot>) -> Self {
        Self {
            kind: EventKind::Snapshot,
            device: snapshot.device.clone(),
            timestamp_ms: snapshot.timestamp_ms,
            payload: EventPayload::Snapshot(snapshot),
        }
    }

    /// An alert event, stamped with the time of the transition it reports.
    pub fn alert(alert: Alert) -> Self {
        Self {
            kind: EventKind::Alert,
            device: alert.device.clone(),
            timestamp_ms: alert.cleared_at_ms.unwrap_or(alert.timestamp_ms),
            payload: EventPayload::Alert(alert),
        }
    }

    pub fn as_snapshot(&self) -> Option<&Snapshot> {
        match &self.payload {
            EventPayload::Snapshot(s) => Some(s),
            EventPayload::Alert(_) => None,
        }
    }

    pub fn as_alert(&self) -> Option<&Alert> {
        match &self.payload {
            EventPayload::Alert(a) => Some(a),
            EventPayload::Snapshot(_) => None,
        }
    }
}
