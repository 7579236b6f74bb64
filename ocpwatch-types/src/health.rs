//! Health report attached to snapshots.

use std::collections::BTreeMap;

use crate::Subsystem;

/// Health of a device on a 0–100 scale, overall and per subsystem.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HealthReport {
    /// Rounded mean of the component scores, 100 when there are none.
    pub overall: u8,
    pub components: BTreeMap<Subsystem, u8>,
}

impl HealthReport {
    /// Build a report from per-subsystem scores, deriving the overall score.
    pub fn from_components(components: impl IntoIterator<Item = (Subsystem, u8)>) -> Self {
        let components: BTreeMap<Subsystem, u8> = components
            .into_iter()
            .map(|(s, score)| (s, score.min(100)))
            .collect();
        let overall = if components.is_empty() {
            100
        } else {
            let sum: u32 = components.values().map(|&v| v as u32).sum();
            ((sum as f64 / components.len() as f64).round()) as u8
        };
        Self { overall, components }
    }

    pub fn component(&self, subsystem: Subsystem) -> Option<u8> {
        self.components.get(&subsystem).copied()
    }
}

impl Default for HealthReport {
    fn default() -> Self {
        Self::from_components([])
    }
}
