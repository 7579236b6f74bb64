//! The per-device processing pipeline.
//!
//! A tick flows through the stages in order:
//!
//! ```text
//! DataSource ──▶ MetricSampler ──▶ AlertEngine ──▶ HealthScorer ──▶ Snapshot
//!                (SignalFilter                     (score from
//!                 per channel)                      active alerts)
//! ```

pub mod alerts;
pub mod filter;
pub mod health;
pub mod sampler;

pub use alerts::{default_rules, AlertEngine, AlertRule, AlertTransitions, Comparison, Condition};
pub use filter::{ChannelFilterSettings, ChannelOverride, FilterOutcome, FilterSettings, SignalFilter};
pub use health::{HealthPenalties, HealthScorer};
pub use sampler::MetricSampler;
