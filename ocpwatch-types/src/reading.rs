//! Raw sensor readings and the values carried through the pipeline.

use std::fmt;

/// A single channel value: a number or a textual state.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum ChannelValue {
    /// Numeric measurement (nanoseconds, volts, degrees...).
    Number(f64),
    /// Enumerated state such as a GNSS lock status or an SMA mode.
    Text(String),
}

impl ChannelValue {
    /// The numeric value, if this is a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ChannelValue::Number(v) => Some(*v),
            ChannelValue::Text(_) => None,
        }
    }

    /// The textual state, if this is text.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ChannelValue::Number(_) => None,
            ChannelValue::Text(s) => Some(s),
        }
    }
}

impl From<f64> for ChannelValue {
    fn from(value: f64) -> Self {
        ChannelValue::Number(value)
    }
}

impl From<&str> for ChannelValue {
    fn from(value: &str) -> Self {
        ChannelValue::Text(value.to_string())
    }
}

impl From<String> for ChannelValue {
    fn from(value: String) -> Self {
        ChannelValue::Text(value)
    }
}

impl fmt::Display for ChannelValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelValue::Number(v) => write!(f, "{}", v),
            ChannelValue::Text(s) => f.write_str(s),
        }
    }
}

/// One raw read of a channel, as produced by a data source.
///
/// Failures are values: a sensor that cannot be read yields
/// [`Reading::Unavailable`] with a human readable reason.
#[derive(Debug, Clone, PartialEq)]
pub enum Reading {
    /// A value was read.
    Value(ChannelValue),
    /// The channel could not be read.
    Unavailable(String),
}

impl Reading {
    /// Numeric reading.
    pub fn number(value: f64) -> Self {
        Reading::Value(ChannelValue::Number(value))
    }

    /// Textual reading.
    pub fn text(value: impl Into<String>) -> Self {
        Reading::Value(ChannelValue::Text(value.into()))
    }

    /// Unavailable reading with a reason.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Reading::Unavailable(reason.into())
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Reading::Value(_))
    }
}

/// Why a filter produced the value it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum FilterReason {
    /// Accepted and smoothed.
    Ok,
    /// Accepted without outlier checks while the window fills.
    WarmingUp,
    /// The source could not provide a reading.
    Unavailable,
    /// Outside the channel's declared range or value set.
    OutOfRange,
    /// Too far from the median of recent accepted values.
    Outlier,
}

impl FilterReason {
    /// Short label used in logs and messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterReason::Ok => "ok",
            FilterReason::WarmingUp => "warming_up",
            FilterReason::Unavailable => "unavailable",
            FilterReason::OutOfRange => "out_of_range",
            FilterReason::Outlier => "outlier",
        }
    }

    /// True for the reasons that count as an accepted reading.
    pub fn is_accepted(&self) -> bool {
        matches!(self, FilterReason::Ok | FilterReason::WarmingUp)
    }
}

impl fmt::Display for FilterReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
