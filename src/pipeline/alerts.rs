//! Alert rules and the engine that turns snapshots into alert transitions.
//!
//! Alerts are level triggered without hysteresis: a rule's alert is active
//! while the latest snapshot breaches it and cleared by the first snapshot
//! that does not. Only transitions are reported.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ocpwatch_types::{sort_alerts, Alert, ChannelValue, Severity, Snapshot};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

/// Prefix of the rule id used for stale-channel alerts.
pub const CHANNEL_UNAVAILABLE: &str = "channel_unavailable";

/// How a numeric reading is compared against its thresholds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    /// `|value - nominal|` above the threshold. For signed metrics and rail deviation.
    Absolute,
    /// Value above the threshold.
    #[default]
    Above,
    /// Value below the threshold.
    Below,
}

/// What counts as a breach.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    /// Numeric thresholds. Either level may be omitted.
    Threshold {
        #[serde(default)]
        warning: Option<f64>,
        #[serde(default)]
        critical: Option<f64>,
        #[serde(default)]
        comparison: Comparison,
        /// Reference point for `absolute` comparisons.
        #[serde(default)]
        nominal: f64,
    },
    /// Enumerated states, compared case-insensitively.
    Match {
        #[serde(default)]
        warning: Vec<String>,
        #[serde(default)]
        critical: Vec<String>,
    },
}

/// A breach found by [`Condition::check`].
#[derive(Debug, Clone, PartialEq)]
pub struct Breach {
    pub severity: Severity,
    pub threshold: Option<f64>,
}

impl Condition {
    /// Absolute-value thresholds around `nominal`.
    pub fn absolute(warning: f64, critical: f64, nominal: f64) -> Self {
        Condition::Threshold {
            warning: Some(warning),
            critical: Some(critical),
            comparison: Comparison::Absolute,
            nominal,
        }
    }

    pub fn above(warning: f64, critical: f64) -> Self {
        Condition::Threshold {
            warning: Some(warning),
            critical: Some(critical),
            comparison: Comparison::Above,
            nominal: 0.0,
        }
    }

    pub fn below(warning: f64, critical: f64) -> Self {
        Condition::Threshold {
            warning: Some(warning),
            critical: Some(critical),
            comparison: Comparison::Below,
            nominal: 0.0,
        }
    }

    pub fn matching(warning: &[&str], critical: &[&str]) -> Self {
        Condition::Match {
            warning: warning.iter().map(|s| s.to_string()).collect(),
            critical: critical.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// The most severe breach of this condition by `value`, if any.
    pub fn check(&self, value: &ChannelValue) -> Option<Breach> {
        match self {
            Condition::Threshold {
                warning,
                critical,
                comparison,
                nominal,
            } => {
                let v = value.as_f64()?;
                let measured = match comparison {
                    Comparison::Absolute => (v - nominal).abs(),
                    Comparison::Above | Comparison::Below => v,
                };
                let breached = |limit: f64| match comparison {
                    Comparison::Absolute | Comparison::Above => measured > limit,
                    Comparison::Below => measured < limit,
                };
                [(Severity::Critical, critical), (Severity::Warning, warning)]
                    .into_iter()
                    .find_map(|(severity, limit)| {
                        let limit = (*limit)?;
                        breached(limit).then_some(Breach {
                            severity,
                            threshold: Some(limit),
                        })
                    })
            }
            Condition::Match { warning, critical } => {
                let state = value.as_str()?;
                let hit = |set: &[String]| set.iter().any(|s| s.eq_ignore_ascii_case(state));
                if hit(critical) {
                    Some(Breach {
                        severity: Severity::Critical,
                        threshold: None,
                    })
                } else if hit(warning) {
                    Some(Breach {
                        severity: Severity::Warning,
                        threshold: None,
                    })
                } else {
                    None
                }
            }
        }
    }
}

/// A configured alert rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    pub id: String,
    pub channel: String,
    pub condition: Condition,
    /// Human label used in alert messages; defaults to the channel name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl AlertRule {
    pub fn new(id: impl Into<String>, channel: impl Into<String>, condition: Condition) -> Self {
        Self {
            id: id.into(),
            channel: channel.into(),
            condition,
            label: None,
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    fn message(&self, value: &ChannelValue, breach: &Breach) -> String {
        let name = self.label.as_deref().unwrap_or(&self.channel);
        match (&self.condition, breach.threshold) {
            (Condition::Threshold { comparison, nominal, .. }, Some(limit)) => match comparison {
                Comparison::Absolute => format!(
                    "{} {} deviates from {} by more than {} threshold {}",
                    name, value, nominal, breach.severity, limit
                ),
                Comparison::Above => {
                    format!("{} {} above {} threshold {}", name, value, breach.severity, limit)
                }
                Comparison::Below => {
                    format!("{} {} below {} threshold {}", name, value, breach.severity, limit)
                }
            },
            _ => format!("{} is {} ({})", name, value, breach.severity),
        }
    }
}

/// The standard Time Card rule set.
pub fn default_rules() -> Vec<AlertRule> {
    vec![
        AlertRule::new("clock_offset", "clock_offset_ns", Condition::absolute(1_000.0, 10_000.0, 0.0))
            .label("PTP offset"),
        AlertRule::new("clock_drift", "clock_drift_ppb", Condition::absolute(100.0, 1_000.0, 0.0))
            .label("Frequency drift"),
        AlertRule::new("path_delay", "path_delay_ns", Condition::above(5_000.0, 10_000.0))
            .label("PTP path delay"),
        AlertRule::new(
            "gnss_sync",
            "gnss_sync",
            Condition::matching(&["HOLDOVER"], &["LOST", "NO_SIGNAL", "UNLOCKED", "UNKNOWN"]),
        )
        .label("GNSS"),
        AlertRule::new("gnss_satellites", "gnss_satellites", Condition::below(4.0, 1.0))
            .label("GNSS satellites"),
        AlertRule::new(
            "gnss_signal",
            "gnss_signal_db",
            Condition::Threshold {
                warning: Some(20.0),
                critical: None,
                comparison: Comparison::Below,
                nominal: 0.0,
            },
        )
        .label("GNSS signal strength"),
        AlertRule::new("fpga_temp", "fpga_temp_c", Condition::above(70.0, 85.0))
            .label("FPGA temperature"),
        AlertRule::new("osc_temp", "osc_temp_c", Condition::above(60.0, 75.0))
            .label("Oscillator temperature"),
        AlertRule::new("board_temp", "board_temp_c", Condition::above(65.0, 80.0))
            .label("Board temperature"),
        AlertRule::new("ambient_temp", "ambient_temp_c", Condition::above(40.0, 50.0))
            .label("Ambient temperature"),
        AlertRule::new("voltage_3v3", "voltage_3v3", Condition::absolute(0.165, 0.33, 3.3))
            .label("3.3V rail"),
        AlertRule::new("voltage_1v8", "voltage_1v8", Condition::absolute(0.09, 0.18, 1.8))
            .label("1.8V rail"),
        AlertRule::new("voltage_5v", "voltage_5v", Condition::absolute(0.25, 0.5, 5.0))
            .label("5V rail"),
        AlertRule::new("voltage_12v", "voltage_12v", Condition::absolute(0.6, 1.2, 12.0))
            .label("12V rail"),
        AlertRule::new("current_total", "current_total_ma", Condition::above(2_000.0, 2_500.0))
            .label("Total current"),
    ]
}

/// Alerts raised and cleared by one evaluation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlertTransitions {
    pub raised: Vec<Alert>,
    /// Copies of the alerts that stopped being active, with `cleared_at_ms` set.
    pub cleared: Vec<Alert>,
}

impl AlertTransitions {
    pub fn is_empty(&self) -> bool {
        self.raised.is_empty() && self.cleared.is_empty()
    }
}

/// Per-device alert state.
#[derive(Debug, Default)]
struct DeviceAlerts {
    /// Active alerts keyed by rule id.
    active: BTreeMap<String, Alert>,
    /// When each currently-stale channel first went stale.
    stale_since: BTreeMap<String, u64>,
}

/// What the latest snapshot says a rule's alert should be.
struct Wanted {
    rule_id: String,
    channel: String,
    severity: Severity,
    message: String,
    value: Option<ChannelValue>,
    threshold: Option<f64>,
}

/// Evaluates snapshots against alert rules and tracks active alerts per device.
#[derive(Debug)]
pub struct AlertEngine {
    devices: RwLock<BTreeMap<String, Arc<Mutex<DeviceAlerts>>>>,
    next_id: AtomicU64,
    stale_escalation_ms: AtomicU64,
}

impl AlertEngine {
    /// Create an engine. Stale channels escalate to critical after `stale_escalation`.
    pub fn new(stale_escalation: Duration) -> Self {
        Self {
            devices: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
            stale_escalation_ms: AtomicU64::new(stale_escalation.as_millis() as u64),
        }
    }

    pub fn set_stale_escalation(&self, stale_escalation: Duration) {
        self.stale_escalation_ms
            .store(stale_escalation.as_millis() as u64, Ordering::Relaxed);
    }

    fn device(&self, device: &str) -> Arc<Mutex<DeviceAlerts>> {
        // Fast path
        {
            let devices = self.devices.read();
            if let Some(state) = devices.get(device) {
                return state.clone();
            }
        }

        // Slow path
        let mut devices = self.devices.write();
        devices
            .entry(device.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(DeviceAlerts::default())))
            .clone()
    }

    /// Evaluate `snapshot`, returning only newly raised alerts.
    pub fn evaluate(&self, snapshot: &Snapshot, rules: &[AlertRule]) -> Vec<Alert> {
        self.apply(snapshot, rules).raised
    }

    /// Evaluate `snapshot` and return every transition it causes.
    pub fn apply(&self, snapshot: &Snapshot, rules: &[AlertRule]) -> AlertTransitions {
        let state = self.device(&snapshot.device);
        let mut state = state.lock();
        let now = snapshot.timestamp_ms;
        let escalation_ms = self.stale_escalation_ms.load(Ordering::Relaxed);

        let mut wanted: BTreeMap<String, Wanted> = BTreeMap::new();
        // Rules whose alert state is left as is this tick
        let mut frozen: BTreeSet<&str> = BTreeSet::new();

        for rule in rules {
            let sample = match snapshot.get(&rule.channel) {
                Some(sample) if !sample.stale => sample,
                _ => {
                    frozen.insert(&rule.id);
                    continue;
                }
            };
            let Some(value) = &sample.value else {
                continue;
            };
            if let Some(breach) = rule.condition.check(value) {
                wanted.insert(
                    rule.id.clone(),
                    Wanted {
                        rule_id: rule.id.clone(),
                        channel: rule.channel.clone(),
                        severity: breach.severity,
                        message: rule.message(value, &breach),
                        value: Some(value.clone()),
                        threshold: breach.threshold,
                    },
                );
            }
        }

        state
            .stale_since
            .retain(|channel, _| snapshot.get(channel).map(|s| s.stale).unwrap_or(false));
        for channel in snapshot.stale_channels() {
            let since = *state.stale_since.entry(channel.to_string()).or_insert(now);
            let stale_for = now.saturating_sub(since);
            let severity = if stale_for > escalation_ms {
                Severity::Critical
            } else {
                Severity::Warning
            };
            let rule_id = format!("{}:{}", CHANNEL_UNAVAILABLE, channel);
            wanted.insert(
                rule_id.clone(),
                Wanted {
                    rule_id,
                    channel: channel.to_string(),
                    severity,
                    message: format!("{} unavailable for {}s", channel, stale_for / 1000),
                    value: None,
                    threshold: None,
                },
            );
        }

        let mut transitions = AlertTransitions::default();

        let active_ids: Vec<String> = state.active.keys().cloned().collect();
        for rule_id in active_ids {
            let keep = match wanted.get(&rule_id) {
                Some(w) => state.active.get(&rule_id).map(|a| a.severity) == Some(w.severity),
                None => frozen.contains(rule_id.as_str()),
            };
            if keep {
                wanted.remove(&rule_id);
            } else if let Some(mut alert) = state.active.remove(&rule_id) {
                alert.clear(now);
                tracing::info!(
                    device = %alert.device,
                    rule = %alert.rule_id,
                    severity = %alert.severity,
                    "alert cleared"
                );
                transitions.cleared.push(alert);
            }
        }

        for (_, w) in wanted {
            let alert = Alert {
                id: self.next_id.fetch_add(1, Ordering::Relaxed),
                device: snapshot.device.clone(),
                rule_id: w.rule_id,
                channel: w.channel,
                severity: w.severity,
                message: w.message,
                value: w.value,
                threshold: w.threshold,
                timestamp_ms: now,
                active: true,
                cleared_at_ms: None,
            };
            tracing::warn!(
                device = %alert.device,
                rule = %alert.rule_id,
                severity = %alert.severity,
                message = %alert.message,
                "alert raised"
            );
            state.active.insert(alert.rule_id.clone(), alert.clone());
            transitions.raised.push(alert);
        }

        transitions
    }

    /// Active alerts for one device, critical first then newest.
    pub fn active_alerts(&self, device: &str) -> Vec<Alert> {
        let state = match self.devices.read().get(device) {
            Some(state) => state.clone(),
            None => return Vec::new(),
        };
        let mut alerts: Vec<Alert> = state.lock().active.values().cloned().collect();
        sort_alerts(&mut alerts);
        alerts
    }

    /// Active alerts across all devices, critical first then newest.
    pub fn all_active(&self) -> Vec<Alert> {
        let states: Vec<_> = self.devices.read().values().cloned().collect();
        let mut alerts: Vec<Alert> = states
            .iter()
            .flat_map(|s| s.lock().active.values().cloned().collect::<Vec<_>>())
            .collect();
        sort_alerts(&mut alerts);
        alerts
    }

    /// Forget a device's alert state.
    pub fn remove_device(&self, device: &str) {
        self.devices.write().remove(device);
    }
}

impl Default for AlertEngine {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ocpwatch_types::{ChannelSample, FilterReason, Subsystem};

    fn offset_rule() -> Vec<AlertRule> {
        vec![AlertRule::new(
            "clock_offset",
            "clock_offset_ns",
            Condition::absolute(1000.0, 10000.0, 0.0),
        )]
    }

    fn offset_snapshot(ts: u64, offset: f64) -> Snapshot {
        Snapshot::builder("dev0")
            .timestamp_ms(ts)
            .number("clock_offset_ns", Subsystem::Timing, offset)
            .build()
    }

    fn stale_snapshot(ts: u64) -> Snapshot {
        Snapshot::builder("dev0")
            .timestamp_ms(ts)
            .sample(
                "clock_offset_ns",
                ChannelSample::rejected(Subsystem::Timing, Some(5000.0.into()), FilterReason::Unavailable)
                    .stale(true),
            )
            .build()
    }

    #[test]
    fn offset_scenario_raises_once_and_clears() {
        let engine = AlertEngine::default();
        let rules = offset_rule();

        let mut stream = Vec::new();
        for (t, offset) in [(1, 200.0), (2, 200.0), (3, 15000.0)] {
            stream.extend(engine.evaluate(&offset_snapshot(t, offset), &rules));
        }
        assert_eq!(stream.len(), 1);
        assert_eq!(stream[0].severity, Severity::Critical);
        assert_eq!(stream[0].timestamp_ms, 3);
        assert_eq!(stream[0].threshold, Some(10000.0));

        let t4 = engine.apply(&offset_snapshot(4, 200.0), &rules);
        assert!(t4.raised.is_empty());
        assert_eq!(t4.cleared.len(), 1);
        assert_eq!(t4.cleared[0].id, stream[0].id);
        assert_eq!(t4.cleared[0].cleared_at_ms, Some(4));
        assert!(engine.active_alerts("dev0").is_empty());
    }

    #[test]
    fn repeated_breach_is_not_re_emitted() {
        let engine = AlertEngine::default();
        let rules = offset_rule();
        assert_eq!(engine.evaluate(&offset_snapshot(1, 20000.0), &rules).len(), 1);
        assert!(engine.evaluate(&offset_snapshot(2, 25000.0), &rules).is_empty());
        assert_eq!(engine.active_alerts("dev0").len(), 1);
    }

    #[test]
    fn rebreach_after_clear_gets_new_id() {
        let engine = AlertEngine::default();
        let rules = offset_rule();
        let first = engine.evaluate(&offset_snapshot(1, 2000.0), &rules);
        engine.evaluate(&offset_snapshot(2, 0.0), &rules);
        let second = engine.evaluate(&offset_snapshot(3, 2000.0), &rules);

        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
        assert_ne!(first[0].id, second[0].id);
        assert_eq!(second[0].timestamp_ms, 3);
    }

    #[test]
    fn severity_change_is_a_transition() {
        let engine = AlertEngine::default();
        let rules = offset_rule();
        engine.evaluate(&offset_snapshot(1, -2000.0), &rules);

        let t = engine.apply(&offset_snapshot(2, -20000.0), &rules);
        assert_eq!(t.cleared.len(), 1);
        assert_eq!(t.cleared[0].severity, Severity::Warning);
        assert_eq!(t.raised.len(), 1);
        assert_eq!(t.raised[0].severity, Severity::Critical);

        let active = engine.active_alerts("dev0");
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].severity, Severity::Critical);
    }

    #[test]
    fn comparisons() {
        let v = |x: f64| ChannelValue::Number(x);
        let abs = Condition::absolute(0.165, 0.33, 3.3);
        assert_eq!(abs.check(&v(3.3)), None);
        assert_eq!(abs.check(&v(3.1)).map(|b| b.severity), Some(Severity::Warning));
        assert_eq!(abs.check(&v(3.7)).map(|b| b.severity), Some(Severity::Critical));

        let above = Condition::above(70.0, 85.0);
        assert_eq!(above.check(&v(70.0)), None);
        assert_eq!(above.check(&v(71.0)).map(|b| b.severity), Some(Severity::Warning));

        let below = Condition::below(4.0, 1.0);
        assert_eq!(below.check(&v(4.0)), None);
        assert_eq!(below.check(&v(3.0)).map(|b| b.severity), Some(Severity::Warning));
        assert_eq!(below.check(&v(0.0)).map(|b| b.severity), Some(Severity::Critical));

        // Text never breaches a numeric rule
        assert_eq!(above.check(&ChannelValue::Text("hot".into())), None);
    }

    #[test]
    fn gnss_match_rule() {
        let rule = Condition::matching(&["HOLDOVER"], &["LOST"]);
        let t = |s: &str| ChannelValue::Text(s.into());
        assert_eq!(rule.check(&t("SYNC")), None);
        assert_eq!(rule.check(&t("holdover")).map(|b| b.severity), Some(Severity::Warning));
        assert_eq!(rule.check(&t("LOST")).map(|b| b.severity), Some(Severity::Critical));
    }

    #[test]
    fn stale_channel_raises_unavailable_and_escalates() {
        let engine = AlertEngine::new(Duration::from_secs(60));
        let rules = offset_rule();

        // Stale value of 5000 would breach the warning threshold but is exempt
        let raised = engine.evaluate(&stale_snapshot(1_000), &rules);
        assert_eq!(raised.len(), 1);
        assert_eq!(raised[0].rule_id, "channel_unavailable:clock_offset_ns");
        assert_eq!(raised[0].severity, Severity::Warning);

        assert!(engine.evaluate(&stale_snapshot(31_000), &rules).is_empty());

        let t = engine.apply(&stale_snapshot(61_001), &rules);
        assert_eq!(t.cleared.len(), 1);
        assert_eq!(t.raised.len(), 1);
        assert_eq!(t.raised[0].severity, Severity::Critical);

        // Recovery clears it
        let t = engine.apply(&offset_snapshot(66_000, 10.0), &rules);
        assert!(t.raised.is_empty());
        assert_eq!(t.cleared.len(), 1);
        assert!(engine.active_alerts("dev0").is_empty());
    }

    #[test]
    fn stale_channel_keeps_existing_threshold_alert() {
        let engine = AlertEngine::default();
        let rules = offset_rule();
        engine.evaluate(&offset_snapshot(1, 50_000.0), &rules);
        let t = engine.apply(&stale_snapshot(2), &rules);
        assert!(t.cleared.is_empty());
        assert_eq!(engine.active_alerts("dev0").len(), 2);
    }

    #[test]
    fn removed_rule_clears_its_alert() {
        let engine = AlertEngine::default();
        engine.evaluate(&offset_snapshot(1, 50_000.0), &offset_rule());
        let t = engine.apply(&offset_snapshot(2, 50_000.0), &[]);
        assert_eq!(t.cleared.len(), 1);
    }

    #[test]
    fn all_active_spans_devices_critical_first() {
        let engine = AlertEngine::default();
        let rules = offset_rule();
        engine.evaluate(&offset_snapshot(1, 2_000.0), &rules);
        let other = Snapshot::builder("dev1")
            .timestamp_ms(1)
            .number("clock_offset_ns", Subsystem::Timing, 20_000.0)
            .build();
        engine.evaluate(&other, &rules);

        let all = engine.all_active();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].device, "dev1");
        assert_eq!(all[0].severity, Severity::Critical);
        assert!(engine.active_alerts("nope").is_empty());
    }

    #[test]
    fn default_rules_parse_from_json() {
        let json = serde_json::to_string(&default_rules()).unwrap();
        let parsed: Vec<AlertRule> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, default_rules());
    }

    #[test]
    fn default_rules_cover_timecard_catalog() {
        let device = ocpwatch_types::Device::timecard("dev0");
        for rule in default_rules() {
            assert!(device.channel(&rule.channel).is_some(), "{} has no channel", rule.id);
        }

        let snapshot = Snapshot::builder("dev0")
            .timestamp_ms(1)
            .number("path_delay_ns", Subsystem::Timing, 6_000.0)
            .number("ambient_temp_c", Subsystem::Environment, 55.0)
            .number("voltage_1v8", Subsystem::Power, 1.95)
            .number("gnss_signal_db", Subsystem::Gnss, 15.0)
            .build();
        let mut raised: Vec<_> = AlertEngine::default()
            .evaluate(&snapshot, &default_rules())
            .into_iter()
            .map(|a| (a.rule_id, a.severity))
            .collect();
        raised.sort();
        assert_eq!(
            raised,
            vec![
                ("ambient_temp".to_string(), Severity::Critical),
                ("gnss_signal".to_string(), Severity::Warning),
                ("path_delay".to_string(), Severity::Warning),
                ("voltage_1v8".to_string(), Severity::Warning),
            ]
        );

        let healthy = Snapshot::builder("dev0")
            .timestamp_ms(2)
            .number("path_delay_ns", Subsystem::Timing, 2_500.0)
            .number("ambient_temp_c", Subsystem::Environment, 27.0)
            .number("voltage_1v8", Subsystem::Power, 1.75)
            .number("gnss_signal_db", Subsystem::Gnss, 42.0)
            .build();
        assert!(AlertEngine::default().evaluate(&healthy, &default_rules()).is_empty());
    }
}
