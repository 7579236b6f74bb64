//! Devices and the channels they expose.

use std::fmt;

use crate::ChannelValue;

/// Logical subsystem a channel belongs to. Health is scored per subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Subsystem {
    /// Clock offset, drift and clock source.
    Timing,
    /// GNSS receiver lock state.
    Gnss,
    /// Board, FPGA and oscillator temperatures.
    Environment,
    /// Voltage rails and current draw.
    Power,
    /// Connectors and other board-level configuration.
    Hardware,
}

impl Subsystem {
    pub const ALL: [Subsystem; 5] = [
        Subsystem::Timing,
        Subsystem::Gnss,
        Subsystem::Environment,
        Subsystem::Power,
        Subsystem::Hardware,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Subsystem::Timing => "timing",
            Subsystem::Gnss => "gnss",
            Subsystem::Environment => "environment",
            Subsystem::Power => "power",
            Subsystem::Hardware => "hardware",
        }
    }
}

impl fmt::Display for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What values a channel may legally take.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "snake_case"))]
pub enum ChannelKind {
    /// Numeric channel with an inclusive valid range.
    Numeric { min: f64, max: f64 },
    /// Enumerated channel; values compare case-insensitively.
    Enumerated { allowed: Vec<String> },
}

/// Static description of one metric stream on a device.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChannelSpec {
    pub name: String,
    pub subsystem: Subsystem,
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub unit: Option<String>,
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub kind: ChannelKind,
}

impl ChannelSpec {
    /// A numeric channel valid within `[min, max]`.
    pub fn numeric(name: impl Into<String>, subsystem: Subsystem, min: f64, max: f64) -> Self {
        Self {
            name: name.into(),
            subsystem,
            unit: None,
            kind: ChannelKind::Numeric { min, max },
        }
    }

    /// An enumerated channel accepting only the listed states.
    pub fn enumerated(name: impl Into<String>, subsystem: Subsystem, allowed: &[&str]) -> Self {
        Self {
            name: name.into(),
            subsystem,
            unit: None,
            kind: ChannelKind::Enumerated {
                allowed: allowed.iter().map(|s| s.to_string()).collect(),
            },
        }
    }

    /// Set the display unit.
    pub fn unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self.kind, ChannelKind::Numeric { .. })
    }

    /// The declared `(min, max)` for numeric channels.
    pub fn range(&self) -> Option<(f64, f64)> {
        match self.kind {
            ChannelKind::Numeric { min, max } => Some((min, max)),
            ChannelKind::Enumerated { .. } => None,
        }
    }

    /// True if `value` is of the right kind and inside the declared range or set.
    pub fn admits(&self, value: &ChannelValue) -> bool {
        match (&self.kind, value) {
            (ChannelKind::Numeric { min, max }, ChannelValue::Number(v)) => {
                v.is_finite() && *v >= *min && *v <= *max
            }
            (ChannelKind::Enumerated { allowed }, ChannelValue::Text(s)) => {
                allowed.iter().any(|a| a.eq_ignore_ascii_case(s))
            }
            _ => false,
        }
    }
}

/// A monitored piece of timing hardware.
///
/// Created at discovery and immutable afterwards, except for the
/// capability list which may be refreshed.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Device {
    pub id: String,
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub serial: Option<String>,
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub firmware: Option<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub capabilities: Vec<String>,
    pub channels: Vec<ChannelSpec>,
}

impl Device {
    /// Create a builder for a device with the given id.
    pub fn builder(id: impl Into<String>) -> DeviceBuilder {
        DeviceBuilder::new(id)
    }

    /// A Time Card exposing the standard channel catalog.
    pub fn timecard(id: impl Into<String>) -> Self {
        Self::builder(id)
            .capability("ptp")
            .capability("gnss")
            .capability("sma")
            .capability("thermal")
            .capability("power")
            .channels(timecard_channels())
            .build()
    }

    /// Look up a declared channel by name.
    pub fn channel(&self, name: &str) -> Option<&ChannelSpec> {
        self.channels.iter().find(|c| c.name == name)
    }

    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c == capability)
    }
}

/// Builder for [`Device`].
#[derive(Debug)]
pub struct DeviceBuilder {
    device: Device,
}

impl DeviceBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            device: Device {
                id: id.into(),
                serial: None,
                firmware: None,
                capabilities: Vec::new(),
                channels: Vec::new(),
            },
        }
    }

    pub fn serial(mut self, serial: impl Into<String>) -> Self {
        self.device.serial = Some(serial.into());
        self
    }

    pub fn firmware(mut self, firmware: impl Into<String>) -> Self {
        self.device.firmware = Some(firmware.into());
        self
    }

    pub fn capability(mut self, capability: impl Into<String>) -> Self {
        self.device.capabilities.push(capability.into());
        self
    }

    /// Declare a channel. A later declaration with the same name replaces the earlier one.
    pub fn channel(mut self, spec: ChannelSpec) -> Self {
        self.device.channels.retain(|c| c.name != spec.name);
        self.device.channels.push(spec);
        self
    }

    pub fn channels(self, specs: impl IntoIterator<Item = ChannelSpec>) -> Self {
        specs.into_iter().fold(self, |b, spec| b.channel(spec))
    }

    pub fn build(self) -> Device {
        self.device
    }
}

/// GNSS receiver states reported by the Time Card driver.
pub const GNSS_STATES: &[&str] = &[
    "SYNC", "LOCKED", "HOLDOVER", "LOST", "NO_SIGNAL", "UNLOCKED", "UNKNOWN",
];

/// Clock sources a Time Card can discipline from.
pub const CLOCK_SOURCES: &[&str] = &["GNSS", "MAC", "IRIG-B", "external", "PPS", "internal"];

/// Signals an SMA connector can be configured to carry.
pub const SMA_SIGNALS: &[&str] = &[
    "disable", "10MHz", "PPS", "GNSS", "IRIG", "DCF", "GEN1", "GEN2", "GEN3", "GEN4", "MAC",
];

/// The standard Time Card channel catalog.
///
/// Power rail ranges match the INA219 monitors on the board; anything
/// outside them is a bad read rather than a real rail excursion.
pub fn timecard_channels() -> Vec<ChannelSpec> {
    let mut channels = vec![
        ChannelSpec::numeric("clock_offset_ns", Subsystem::Timing, -1.0e9, 1.0e9).unit("ns"),
        ChannelSpec::numeric("clock_drift_ppb", Subsystem::Timing, -1.0e6, 1.0e6).unit("ppb"),
        ChannelSpec::numeric("path_delay_ns", Subsystem::Timing, 0.0, 1.0e9).unit("ns"),
        ChannelSpec::enumerated("clock_source", Subsystem::Timing, CLOCK_SOURCES),
        ChannelSpec::enumerated("gnss_sync", Subsystem::Gnss, GNSS_STATES),
        ChannelSpec::numeric("gnss_satellites", Subsystem::Gnss, 0.0, 64.0),
        ChannelSpec::numeric("gnss_signal_db", Subsystem::Gnss, 0.0, 100.0).unit("dB"),
        ChannelSpec::numeric("fpga_temp_c", Subsystem::Environment, -40.0, 125.0).unit("°C"),
        ChannelSpec::numeric("osc_temp_c", Subsystem::Environment, -40.0, 125.0).unit("°C"),
        ChannelSpec::numeric("board_temp_c", Subsystem::Environment, -40.0, 125.0).unit("°C"),
        ChannelSpec::numeric("ambient_temp_c", Subsystem::Environment, -40.0, 125.0).unit("°C"),
        ChannelSpec::numeric("voltage_1v8", Subsystem::Power, 1.0, 2.5).unit("V"),
        ChannelSpec::numeric("voltage_3v3", Subsystem::Power, 2.5, 4.0).unit("V"),
        ChannelSpec::numeric("voltage_5v", Subsystem::Power, 4.0, 6.0).unit("V"),
        ChannelSpec::numeric("voltage_12v", Subsystem::Power, 10.0, 15.0).unit("V"),
        ChannelSpec::numeric("current_total_ma", Subsystem::Power, 0.0, 5000.0).unit("mA"),
    ];
    for n in 1..=4 {
        channels.push(ChannelSpec::enumerated(
            format!("sma{}", n),
            Subsystem::Hardware,
            SMA_SIGNALS,
        ));
    }
    channels
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_admits_inclusive_range() {
        let spec = ChannelSpec::numeric("voltage_3v3", Subsystem::Power, 2.5, 4.0);
        assert!(spec.admits(&ChannelValue::Number(2.5)));
        assert!(spec.admits(&ChannelValue::Number(4.0)));
        assert!(!spec.admits(&ChannelValue::Number(4.01)));
        assert!(!spec.admits(&ChannelValue::Number(f64::NAN)));
        assert!(!spec.admits(&ChannelValue::Text("3.3".into())));
    }

    #[test]
    fn enumerated_admits_case_insensitively() {
        let spec = ChannelSpec::enumerated("gnss_sync", Subsystem::Gnss, GNSS_STATES);
        assert!(spec.admits(&ChannelValue::Text("sync".into())));
        assert!(!spec.admits(&ChannelValue::Text("BOGUS".into())));
        assert!(!spec.admits(&ChannelValue::Number(1.0)));
    }

    #[test]
    fn timecard_catalog() {
        let device = Device::timecard("timecard0");
        assert_eq!(device.channels.len(), 20);
        assert_eq!(
            device.channel("voltage_12v").and_then(|c| c.range()),
            Some((10.0, 15.0))
        );
        assert_eq!(
            device.channel("voltage_1v8").and_then(|c| c.range()),
            Some((1.0, 2.5))
        );
        assert_eq!(device.channel("path_delay_ns").map(|c| c.subsystem), Some(Subsystem::Timing));
        assert_eq!(device.channel("gnss_signal_db").map(|c| c.subsystem), Some(Subsystem::Gnss));
        assert_eq!(
            device.channel("ambient_temp_c").map(|c| c.subsystem),
            Some(Subsystem::Environment)
        );
        assert_eq!(device.channel("sma3").map(|c| c.subsystem), Some(Subsystem::Hardware));
        assert!(device.has_capability("gnss"));
    }

    #[test]
    fn builder_replaces_duplicate_channel() {
        let device = Device::builder("dev0")
            .serial("TC-0001")
            .channel(ChannelSpec::numeric("x", Subsystem::Timing, 0.0, 1.0))
            .channel(ChannelSpec::numeric("x", Subsystem::Timing, 0.0, 2.0))
            .build();
        assert_eq!(device.channels.len(), 1);
        assert_eq!(device.channel("x").and_then(|c| c.range()), Some((0.0, 2.0)));
        assert_eq!(device.serial.as_deref(), Some("TC-0001"));
    }
}
