//! Monitor configuration.
//!
//! Loaded once from an optional file plus `OCPWATCH_*` environment variables,
//! validated, then held in a [`LiveConfig`] that swaps whole configurations
//! atomically. Every poll cycle reads one consistent `Arc<MonitorConfig>`.
//!
//! ```toml
//! poll_interval = "5s"
//! read_timeout = "1s"
//! stale_escalation = "60s"
//! subscriber_queue = 256
//!
//! [history]
//! snapshots = 1000
//! alerts = 500
//!
//! [channels.voltage_3v3]
//! outlier_threshold = 0.5
//! valid_range = [2.5, 4.0]
//!
//! [[rules]]
//! id = "clock_offset"
//! channel = "clock_offset_ns"
//! condition = { type = "threshold", comparison = "absolute", warning = 1000, critical = 10000 }
//!
//! [[devices]]
//! id = "timecard0"
//! serial = "TC-2024-0001"
//! ```

pub mod duration;
mod patch;

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use config::{Config, Environment, File};
use ocpwatch_types::{ChannelKind, Device};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::error::{MonitorError, Result};
use crate::pipeline::alerts::{default_rules, AlertRule, Comparison, Condition};
use crate::pipeline::filter::{ChannelFilterSettings, ChannelOverride, FilterSettings};
use crate::pipeline::health::HealthPenalties;

pub use patch::{ConfigPatch, HistoryPatch};

/// Environment variable prefix, e.g. `OCPWATCH_POLL_INTERVAL=2s`.
pub const ENV_PREFIX: &str = "OCPWATCH";

/// Retention per device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryCapacity {
    pub snapshots: usize,
    pub alerts: usize,
}

impl Default for HistoryCapacity {
    fn default() -> Self {
        Self {
            snapshots: 1000,
            alerts: 500,
        }
    }
}

/// A device to monitor from startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub id: String,
    #[serde(default)]
    pub serial: Option<String>,
    #[serde(default)]
    pub firmware: Option<String>,
    /// Extra capabilities on top of the Time Card defaults.
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// Channel declarations; the Time Card catalog when omitted.
    #[serde(default)]
    pub channels: Option<Vec<ocpwatch_types::ChannelSpec>>,
}

impl DeviceConfig {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            serial: None,
            firmware: None,
            capabilities: Vec::new(),
            channels: None,
        }
    }

    /// Build the device description this entry declares.
    pub fn to_device(&self) -> Device {
        let mut device = Device::timecard(&self.id);
        device.serial = self.serial.clone();
        device.firmware = self.firmware.clone();
        for capability in &self.capabilities {
            if !device.has_capability(capability) {
                device.capabilities.push(capability.clone());
            }
        }
        if let Some(channels) = &self.channels {
            device.channels = channels.clone();
        }
        device
    }
}

/// Complete monitor configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Time between polls of each device.
    #[serde(with = "duration::human")]
    pub poll_interval: Duration,

    /// Upper bound on a single channel read.
    #[serde(with = "duration::human")]
    pub read_timeout: Duration,

    /// How long a channel may stay stale before its alert turns critical.
    #[serde(with = "duration::human")]
    pub stale_escalation: Duration,

    pub history: HistoryCapacity,

    /// Events buffered per subscriber before the oldest are dropped.
    pub subscriber_queue: usize,

    /// Filter defaults for every channel.
    pub filter: FilterSettings,

    /// Per-channel filter overrides, keyed by channel name.
    pub channels: BTreeMap<String, ChannelOverride>,

    pub rules: Vec<AlertRule>,

    pub health: HealthPenalties,

    pub devices: Vec<DeviceConfig>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            read_timeout: Duration::from_secs(1),
            stale_escalation: Duration::from_secs(60),
            history: HistoryCapacity::default(),
            subscriber_queue: 256,
            filter: FilterSettings::default(),
            channels: default_channel_overrides(),
            rules: default_rules(),
            health: HealthPenalties::default(),
            devices: Vec::new(),
        }
    }
}

/// Outlier thresholds for the Time Card's noisy sensors.
///
/// INA219 rails glitch by whole volts on a bad bus read, so 0.5V from the
/// median is treated as a glitch rather than a real excursion.
fn default_channel_overrides() -> BTreeMap<String, ChannelOverride> {
    let threshold = |t: f64| ChannelOverride {
        outlier_threshold: Some(t),
        ..Default::default()
    };
    [
        ("voltage_1v8", threshold(0.5)),
        ("voltage_3v3", threshold(0.5)),
        ("voltage_5v", threshold(0.5)),
        ("voltage_12v", threshold(0.5)),
        ("current_total_ma", threshold(500.0)),
        ("fpga_temp_c", threshold(10.0)),
        ("osc_temp_c", threshold(10.0)),
        ("board_temp_c", threshold(10.0)),
        ("ambient_temp_c", threshold(10.0)),
    ]
    .into_iter()
    .map(|(name, ov)| (name.to_string(), ov))
    .collect()
}

impl MonitorConfig {
    /// Load from an optional file and the environment, then validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        let config: MonitorConfig = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Filter settings for one channel, overrides applied.
    pub fn channel_filter(&self, channel: &str) -> ChannelFilterSettings {
        self.filter.resolve(self.channels.get(channel))
    }

    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(MonitorError::invalid("poll_interval must be greater than zero"));
        }
        if self.read_timeout.is_zero() {
            return Err(MonitorError::invalid("read_timeout must be greater than zero"));
        }
        if self.history.snapshots == 0 || self.history.alerts == 0 {
            return Err(MonitorError::invalid("history capacities must be at least 1"));
        }
        if self.subscriber_queue == 0 {
            return Err(MonitorError::invalid("subscriber_queue must be at least 1"));
        }

        validate_filter("filter", &self.filter.resolve(None))?;
        for (channel, ov) in &self.channels {
            validate_filter(channel, &self.filter.resolve(Some(ov)))?;
        }

        let mut ids = BTreeSet::new();
        for rule in &self.rules {
            if !ids.insert(rule.id.as_str()) {
                return Err(MonitorError::invalid(format!("duplicate rule id '{}'", rule.id)));
            }
            validate_rule(rule)?;
        }

        let h = &self.health;
        if h.critical > 100 || h.warning > 100 || h.info > 100 {
            return Err(MonitorError::invalid("health penalties must be within 0..=100"));
        }
        if h.critical < h.warning || h.warning < h.info {
            return Err(MonitorError::invalid(
                "health penalties must not decrease with severity",
            ));
        }

        let mut devices = BTreeSet::new();
        for device in &self.devices {
            if device.id.trim().is_empty() {
                return Err(MonitorError::invalid("device id must not be empty"));
            }
            if !devices.insert(device.id.as_str()) {
                return Err(MonitorError::invalid(format!("duplicate device '{}'", device.id)));
            }
            if let Some(channels) = &device.channels {
                for spec in channels {
                    if let ChannelKind::Numeric { min, max } = spec.kind {
                        if !(min < max) {
                            return Err(MonitorError::invalid(format!(
                                "{}.{}: declared range is empty",
                                device.id, spec.name
                            )));
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

fn validate_filter(name: &str, f: &ChannelFilterSettings) -> Result<()> {
    if f.window == 0 {
        return Err(MonitorError::invalid(format!("{}: window must be at least 1", name)));
    }
    if f.stale_after == 0 {
        return Err(MonitorError::invalid(format!("{}: stale_after must be at least 1", name)));
    }
    if let Some(t) = f.outlier_threshold {
        if !(t.is_finite() && t > 0.0) {
            return Err(MonitorError::invalid(format!(
                "{}: outlier_threshold must be a positive number",
                name
            )));
        }
    }
    if let Some((lo, hi)) = f.valid_range {
        if !(lo.is_finite() && hi.is_finite() && lo < hi) {
            return Err(MonitorError::invalid(format!(
                "{}: valid_range must satisfy min < max",
                name
            )));
        }
    }
    Ok(())
}

fn validate_rule(rule: &AlertRule) -> Result<()> {
    let invalid = |what: &str| MonitorError::invalid(format!("rule '{}': {}", rule.id, what));

    if rule.id.is_empty() || rule.channel.is_empty() {
        return Err(invalid("id and channel are required"));
    }
    match &rule.condition {
        Condition::Threshold {
            warning,
            critical,
            comparison,
            nominal,
        } => {
            if warning.is_none() && critical.is_none() {
                return Err(invalid("needs a warning or critical threshold"));
            }
            if !nominal.is_finite() || [warning, critical].iter().any(|t| t.map_or(false, |t| !t.is_finite())) {
                return Err(invalid("thresholds must be finite"));
            }
            if *comparison == Comparison::Absolute
                && [warning, critical].iter().any(|t| t.map_or(false, |t| t < 0.0))
            {
                return Err(invalid("absolute thresholds must not be negative"));
            }
            if let (Some(w), Some(c)) = (warning, critical) {
                let inverted = match comparison {
                    Comparison::Absolute | Comparison::Above => w > c,
                    Comparison::Below => w < c,
                };
                if inverted {
                    return Err(invalid("warning and critical thresholds are inverted"));
                }
            }
        }
        Condition::Match { warning, critical } => {
            if warning.is_empty() && critical.is_empty() {
                return Err(invalid("needs at least one warning or critical state"));
            }
            if warning
                .iter()
                .any(|w| critical.iter().any(|c| c.eq_ignore_ascii_case(w)))
            {
                return Err(invalid("a state cannot be both warning and critical"));
            }
        }
    }
    Ok(())
}

/// The configuration currently in effect, replaced atomically.
///
/// Readers take a cheap `Arc` snapshot; device tasks watch for changes to
/// pick up a new poll interval.
#[derive(Debug)]
pub struct LiveConfig {
    tx: watch::Sender<Arc<MonitorConfig>>,
}

impl LiveConfig {
    /// Wrap a configuration. Callers validate first.
    pub fn new(config: MonitorConfig) -> Self {
        let (tx, _) = watch::channel(Arc::new(config));
        Self { tx }
    }

    pub fn current(&self) -> Arc<MonitorConfig> {
        self.tx.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<Arc<MonitorConfig>> {
        self.tx.subscribe()
    }

    /// Apply `patch` and swap in the result if it validates. On error the
    /// current configuration is left untouched.
    pub fn update(&self, patch: &ConfigPatch) -> Result<Arc<MonitorConfig>> {
        let mut outcome = Err(MonitorError::invalid("configuration not applied"));
        self.tx.send_if_modified(|current| {
            let next = patch.apply_to(current);
            match next.validate() {
                Ok(()) => {
                    let next = Arc::new(next);
                    *current = next.clone();
                    outcome = Ok(next);
                    true
                }
                Err(err) => {
                    outcome = Err(err);
                    false
                }
            }
        });
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = MonitorConfig::default();
        config.validate().unwrap();
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.history.snapshots, 1000);
        assert_eq!(config.history.alerts, 500);
        assert_eq!(config.channel_filter("voltage_12v").outlier_threshold, Some(0.5));
        assert_eq!(config.channel_filter("clock_offset_ns").outlier_threshold, None);
    }

    #[test]
    fn rejects_zero_capacity() {
        let mut config = MonitorConfig::default();
        config.history.snapshots = 0;
        assert!(matches!(config.validate(), Err(MonitorError::ConfigInvalid(_))));
    }

    #[test]
    fn rejects_inverted_thresholds() {
        let mut config = MonitorConfig::default();
        config.rules = vec![AlertRule::new("t", "fpga_temp_c", Condition::above(90.0, 80.0))];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("inverted"));

        config.rules = vec![AlertRule::new("s", "gnss_satellites", Condition::below(1.0, 4.0))];
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_duplicate_rules_and_devices() {
        let mut config = MonitorConfig::default();
        config.rules.push(config.rules[0].clone());
        assert!(config.validate().is_err());

        let mut config = MonitorConfig::default();
        config.devices = vec![DeviceConfig::new("tc0"), DeviceConfig::new("tc0")];
        assert!(config.validate().is_err());
    }

    #[test]
    fn loads_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
poll_interval = "2s"
subscriber_queue = 16

[history]
snapshots = 50

[channels.clock_offset_ns]
window = 1

[[rules]]
id = "clock_offset"
channel = "clock_offset_ns"
condition = {{ type = "threshold", comparison = "absolute", warning = 1000, critical = 10000 }}

[[devices]]
id = "timecard0"
serial = "TC-1"
"#
        )
        .unwrap();

        let config = MonitorConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.poll_interval, Duration::from_secs(2));
        assert_eq!(config.read_timeout, Duration::from_secs(1));
        assert_eq!(config.subscriber_queue, 16);
        assert_eq!(config.history.snapshots, 50);
        assert_eq!(config.history.alerts, 500);
        assert_eq!(config.channel_filter("clock_offset_ns").window, 1);
        assert_eq!(config.rules.len(), 1);
        assert_eq!(
            config.rules[0].condition,
            Condition::absolute(1000.0, 10000.0, 0.0)
        );
        let device = config.devices[0].to_device();
        assert_eq!(device.serial.as_deref(), Some("TC-1"));
        assert_eq!(device.channels.len(), 20);
    }

    #[test]
    fn invalid_file_is_rejected() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "subscriber_queue = 0").unwrap();
        let err = MonitorConfig::load(Some(file.path())).unwrap_err();
        assert!(matches!(err, MonitorError::ConfigInvalid(_)));
    }

    #[test]
    fn live_update_is_atomic() {
        let live = LiveConfig::new(MonitorConfig::default());
        let before = live.current();

        let bad = ConfigPatch {
            subscriber_queue: Some(0),
            poll_interval: Some(Duration::from_secs(1)),
            ..Default::default()
        };
        assert!(live.update(&bad).is_err());
        assert_eq!(*live.current(), *before);

        let good = ConfigPatch {
            poll_interval: Some(Duration::from_secs(1)),
            ..Default::default()
        };
        let after = live.update(&good).unwrap();
        assert_eq!(after.poll_interval, Duration::from_secs(1));
        assert_eq!(live.current().poll_interval, Duration::from_secs(1));
    }
}
