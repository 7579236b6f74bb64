//! Partial configuration updates.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{duration, MonitorConfig};
use crate::error::{MonitorError, Result};
use crate::pipeline::alerts::AlertRule;
use crate::pipeline::filter::{ChannelOverride, FilterSettings};
use crate::pipeline::health::HealthPenalties;

/// Partial history capacity update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HistoryPatch {
    pub snapshots: Option<usize>,
    pub alerts: Option<usize>,
}

/// A partial update to [`MonitorConfig`]. Absent fields keep their value.
///
/// `channels` entries are merged per channel; `rules` replaces the whole
/// rule list. The device list is not patchable; devices are added and
/// removed through the service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigPatch {
    #[serde(with = "duration::human_opt", skip_serializing_if = "Option::is_none")]
    pub poll_interval: Option<Duration>,
    #[serde(with = "duration::human_opt", skip_serializing_if = "Option::is_none")]
    pub read_timeout: Option<Duration>,
    #[serde(with = "duration::human_opt", skip_serializing_if = "Option::is_none")]
    pub stale_escalation: Option<Duration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history: Option<HistoryPatch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscriber_queue: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<FilterSettings>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channels: Option<BTreeMap<String, ChannelOverride>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rules: Option<Vec<AlertRule>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health: Option<HealthPenalties>,
}

impl ConfigPatch {
    /// Parse a JSON patch. Malformed input (e.g. a negative capacity) is a
    /// validation error like any other.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| MonitorError::invalid(e.to_string()))
    }

    pub fn is_empty(&self) -> bool {
        *self == ConfigPatch::default()
    }

    /// The configuration that results from applying this patch to `base`.
    /// Not validated.
    pub fn apply_to(&self, base: &MonitorConfig) -> MonitorConfig {
        let mut next = base.clone();
        if let Some(d) = self.poll_interval {
            next.poll_interval = d;
        }
        if let Some(d) = self.read_timeout {
            next.read_timeout = d;
        }
        if let Some(d) = self.stale_escalation {
            next.stale_escalation = d;
        }
        if let Some(h) = self.history {
            if let Some(n) = h.snapshots {
                next.history.snapshots = n;
            }
            if let Some(n) = h.alerts {
                next.history.alerts = n;
            }
        }
        if let Some(n) = self.subscriber_queue {
            next.subscriber_queue = n;
        }
        if let Some(f) = self.filter {
            next.filter = f;
        }
        if let Some(channels) = &self.channels {
            for (name, ov) in channels {
                next.channels.insert(name.clone(), ov.clone());
            }
        }
        if let Some(rules) = &self.rules {
            next.rules = rules.clone();
        }
        if let Some(h) = self.health {
            next.health = h;
        }
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_json_patch() {
        let patch = ConfigPatch::from_json(
            r#"{"poll_interval": "500ms", "history": {"snapshots": 10}, "channels": {"voltage_3v3": {"window": 3}}}"#,
        )
        .unwrap();
        assert_eq!(patch.poll_interval, Some(Duration::from_millis(500)));

        let next = patch.apply_to(&MonitorConfig::default());
        assert_eq!(next.poll_interval, Duration::from_millis(500));
        assert_eq!(next.history.snapshots, 10);
        assert_eq!(next.history.alerts, 500);
        assert_eq!(next.channel_filter("voltage_3v3").window, 3);
        // Merged, not replaced
        assert!(next.channels.contains_key("voltage_12v"));
    }

    #[test]
    fn negative_capacity_is_invalid() {
        let err = ConfigPatch::from_json(r#"{"history": {"snapshots": -5}}"#).unwrap_err();
        assert!(matches!(err, MonitorError::ConfigInvalid(_)));
    }

    #[test]
    fn unknown_fields_are_invalid() {
        assert!(ConfigPatch::from_json(r#"{"pol_interval": "1s"}"#).is_err());
    }

    #[test]
    fn empty_patch_changes_nothing() {
        let patch = ConfigPatch::from_json("{}").unwrap();
        assert!(patch.is_empty());
        let base = MonitorConfig::default();
        assert_eq!(patch.apply_to(&base), base);
    }
}
