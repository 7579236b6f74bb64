//! Per-channel validation and smoothing of raw readings.
//!
//! Numeric channels go through a two-stage filter: readings outside the
//! declared range are rejected outright, readings too far from the median of
//! recent accepted values are rejected as outliers, and the reported value is
//! the mean of the accepted window. Enumerated channels only check
//! membership.

use std::collections::VecDeque;

use ocpwatch_types::{ChannelKind, ChannelSpec, ChannelValue, FilterReason, Reading};
use serde::{Deserialize, Serialize};

/// Below this many accepted values, readings are passed through unsmoothed.
const WARMUP_LEN: usize = 3;

/// Default filter parameters applied to every channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSettings {
    /// Sliding window length.
    pub window: usize,
    /// Maximum distance from the window median; `None` disables outlier rejection.
    pub outlier_threshold: Option<f64>,
    /// Consecutive rejects after which the channel is stale.
    pub stale_after: u32,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            window: 5,
            outlier_threshold: None,
            stale_after: 5,
        }
    }
}

impl FilterSettings {
    /// Apply a per-channel override on top of these defaults.
    pub fn resolve(&self, ov: Option<&ChannelOverride>) -> ChannelFilterSettings {
        let ov = ov.cloned().unwrap_or_default();
        ChannelFilterSettings {
            window: ov.window.unwrap_or(self.window),
            outlier_threshold: ov.outlier_threshold.or(self.outlier_threshold),
            stale_after: ov.stale_after.unwrap_or(self.stale_after),
            valid_range: ov.valid_range.map(|[lo, hi]| (lo, hi)),
        }
    }
}

/// Per-channel filter overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChannelOverride {
    pub window: Option<usize>,
    pub outlier_threshold: Option<f64>,
    /// Replaces the channel's declared `[min, max]`.
    pub valid_range: Option<[f64; 2]>,
    pub stale_after: Option<u32>,
}

/// Filter parameters resolved for one channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelFilterSettings {
    pub window: usize,
    pub outlier_threshold: Option<f64>,
    pub stale_after: u32,
    pub valid_range: Option<(f64, f64)>,
}

impl Default for ChannelFilterSettings {
    fn default() -> Self {
        FilterSettings::default().resolve(None)
    }
}

/// Result of filtering one reading.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterOutcome {
    /// The value to report: the smoothed value, the raw value while warming
    /// up, or the last known-good value on rejection.
    pub value: Option<ChannelValue>,
    pub accepted: bool,
    pub reason: FilterReason,
    pub stale: bool,
}

/// Filter state for a single channel.
#[derive(Debug, Clone)]
pub struct SignalFilter {
    spec: ChannelSpec,
    declared: ChannelKind,
    settings: ChannelFilterSettings,
    window: VecDeque<f64>,
    last_good: Option<ChannelValue>,
    failures: u32,
}

impl SignalFilter {
    pub fn new(spec: &ChannelSpec, settings: ChannelFilterSettings) -> Self {
        let mut filter = Self {
            spec: spec.clone(),
            declared: spec.kind.clone(),
            settings,
            window: VecDeque::with_capacity(settings.window),
            last_good: None,
            failures: 0,
        };
        filter.apply_range_override();
        filter
    }

    pub fn channel(&self) -> &str {
        &self.spec.name
    }

    pub fn settings(&self) -> &ChannelFilterSettings {
        &self.settings
    }

    /// The last value this filter accepted or derived.
    pub fn last_good(&self) -> Option<&ChannelValue> {
        self.last_good.as_ref()
    }

    /// Consecutive rejected readings.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn is_stale(&self) -> bool {
        self.failures >= self.settings.stale_after
    }

    /// Swap in new settings. A shorter window keeps its most recent values.
    pub fn reconfigure(&mut self, settings: ChannelFilterSettings) {
        if settings == self.settings {
            return;
        }
        self.settings = settings;
        while self.window.len() > settings.window.max(1) {
            self.window.pop_front();
        }
        self.apply_range_override();
        self.drop_out_of_range();
    }

    /// Forget values a narrowed range no longer admits, so neither the
    /// window mean nor the known-good value can leave the range.
    fn drop_out_of_range(&mut self) {
        let Some((min, max)) = self.spec.range() else {
            return;
        };
        let before = self.window.len();
        self.window.retain(|v| (min..=max).contains(v));
        let last_ok = self.last_good.as_ref().map_or(true, |v| self.spec.admits(v));
        if self.window.len() != before || !last_ok {
            self.last_good = if self.window.is_empty() {
                None
            } else {
                let mean = self.window.iter().sum::<f64>() / self.window.len() as f64;
                Some(ChannelValue::Number(mean))
            };
        }
    }

    /// Run one raw reading through the filter.
    pub fn filter(&mut self, reading: Reading) -> FilterOutcome {
        let value = match reading {
            Reading::Value(value) => value,
            Reading::Unavailable(reason) => {
                tracing::debug!(channel = %self.spec.name, %reason, "reading unavailable");
                return self.reject(FilterReason::Unavailable);
            }
        };

        if !self.spec.admits(&value) {
            tracing::debug!(channel = %self.spec.name, %value, "reading out of range");
            return self.reject(FilterReason::OutOfRange);
        }

        match value {
            ChannelValue::Number(raw) => self.filter_number(raw),
            ChannelValue::Text(state) => {
                self.failures = 0;
                let value = ChannelValue::Text(state);
                self.last_good = Some(value.clone());
                self.accept(value, FilterReason::Ok)
            }
        }
    }

    fn filter_number(&mut self, raw: f64) -> FilterOutcome {
        if self.window.len() < WARMUP_LEN {
            self.push(raw);
            self.failures = 0;
            let value = ChannelValue::Number(raw);
            self.last_good = Some(value.clone());
            return self.accept(value, FilterReason::WarmingUp);
        }

        if let Some(threshold) = self.settings.outlier_threshold {
            let median = median(&self.window);
            if (raw - median).abs() > threshold {
                tracing::debug!(
                    channel = %self.spec.name,
                    raw,
                    median,
                    threshold,
                    "outlier rejected"
                );
                return self.reject(FilterReason::Outlier);
            }
        }

        self.push(raw);
        self.failures = 0;
        let mean = self.window.iter().sum::<f64>() / self.window.len() as f64;
        let value = ChannelValue::Number(mean);
        self.last_good = Some(value.clone());
        self.accept(value, FilterReason::Ok)
    }

    fn push(&mut self, raw: f64) {
        let capacity = self.settings.window.max(1);
        while self.window.len() >= capacity {
            self.window.pop_front();
        }
        self.window.push_back(raw);
    }

    fn accept(&self, value: ChannelValue, reason: FilterReason) -> FilterOutcome {
        FilterOutcome {
            value: Some(value),
            accepted: true,
            reason,
            stale: false,
        }
    }

    fn reject(&mut self, reason: FilterReason) -> FilterOutcome {
        self.failures = self.failures.saturating_add(1);
        FilterOutcome {
            value: self.last_good.clone(),
            accepted: false,
            reason,
            stale: self.is_stale(),
        }
    }

    fn apply_range_override(&mut self) {
        self.spec.kind = match (self.settings.valid_range, &self.declared) {
            (Some((min, max)), ChannelKind::Numeric { .. }) => ChannelKind::Numeric { min, max },
            (_, declared) => declared.clone(),
        };
    }
}

/// Median of a non-empty window.
fn median(window: &VecDeque<f64>) -> f64 {
    let mut sorted: Vec<f64> = window.iter().copied().collect();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}
