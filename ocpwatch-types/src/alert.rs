//! Alerts raised when a channel breaches a rule.

use std::cmp::Ordering;
use std::fmt;

use crate::ChannelValue;

/// Alert severity. Ordered so that `Critical` is the greatest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }

    /// Returns a short symbol for display.
    pub fn symbol(&self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Warning => "WARN",
            Severity::Critical => "CRIT",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A breach of an alert rule on one device.
///
/// An alert is active from the snapshot that first breached the rule until
/// the first snapshot that no longer does. Re-breaching afterwards produces
/// a fresh alert with a new id.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Alert {
    pub id: u64,
    pub device: String,
    pub rule_id: String,
    pub channel: String,
    pub severity: Severity,
    pub message: String,
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub value: Option<ChannelValue>,
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub threshold: Option<f64>,
    /// Timestamp of the snapshot that raised the alert.
    pub timestamp_ms: u64,
    pub active: bool,
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub cleared_at_ms: Option<u64>,
}

impl Alert {
    /// Mark the alert cleared at `timestamp_ms`.
    pub fn clear(&mut self, timestamp_ms: u64) {
        self.active = false;
        self.cleared_at_ms = Some(timestamp_ms);
    }

    /// Listing order: most severe first, then newest first, then by id.
    pub fn listing_order(a: &Alert, b: &Alert) -> Ordering {
        b.severity
            .cmp(&a.severity)
            .then_with(|| b.timestamp_ms.cmp(&a.timestamp_ms))
            .then_with(|| b.id.cmp(&a.id))
    }
}

/// Sort alerts critical first, ties broken by most recent.
pub fn sort_alerts(alerts: &mut [Alert]) {
    alerts.sort_by(Alert::listing_order);
}
