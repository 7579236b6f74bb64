//! Health scoring.

use std::collections::BTreeMap;

use ocpwatch_types::{Alert, HealthReport, Severity, Snapshot, Subsystem};
use serde::{Deserialize, Serialize};

/// Points deducted from a subsystem's score per active alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthPenalties {
    pub critical: u8,
    pub warning: u8,
    pub info: u8,
}

impl Default for HealthPenalties {
    fn default() -> Self {
        Self {
            critical: 30,
            warning: 10,
            info: 0,
        }
    }
}

impl HealthPenalties {
    pub fn for_severity(&self, severity: Severity) -> u8 {
        match severity {
            Severity::Critical => self.critical,
            Severity::Warning => self.warning,
            Severity::Info => self.info,
        }
    }
}

/// Scores a snapshot from the alerts active against it.
///
/// Every subsystem with at least one channel in the snapshot starts at 100
/// and loses the configured penalty for each active alert on one of its
/// channels. Pure: the same inputs always give the same report.
#[derive(Debug, Clone, Copy, Default)]
pub struct HealthScorer {
    penalties: HealthPenalties,
}

impl HealthScorer {
    pub fn new(penalties: HealthPenalties) -> Self {
        Self { penalties }
    }

    /// Overall score in `[0, 100]`.
    pub fn score(&self, snapshot: &Snapshot, active: &[Alert]) -> u8 {
        self.report(snapshot, active).overall
    }

    /// Per-subsystem and overall scores.
    pub fn report(&self, snapshot: &Snapshot, active: &[Alert]) -> HealthReport {
        let mut deductions: BTreeMap<Subsystem, u32> = snapshot
            .channels
            .values()
            .map(|sample| (sample.subsystem, 0))
            .collect();

        for alert in active.iter().filter(|a| a.active && a.device == snapshot.device) {
            // Alerts on channels this snapshot does not carry are not attributed
            let Some(sample) = snapshot.get(&alert.channel) else {
                continue;
            };
            if let Some(total) = deductions.get_mut(&sample.subsystem) {
                *total += self.penalties.for_severity(alert.severity) as u32;
            }
        }

        HealthReport::from_components(
            deductions
                .into_iter()
                .map(|(subsystem, deducted)| (subsystem, 100u32.saturating_sub(deducted) as u8)),
        )
    }
}
