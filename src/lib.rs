//! # ocpwatch
//!
//! A monitoring pipeline for OCP Time Card timing hardware.
//!
//! This crate turns noisy, sometimes-unavailable sensor readings (clock
//! offset and drift, GNSS lock, SMA ports, power rails, temperatures) into a
//! stream of validated snapshots, deduplicated alerts and bounded history,
//! delivered to any number of subscribers without stalling collection.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        MonitoringService                         │
//! │                                                                  │
//! │  per device task                                                 │
//! │  ┌──────────┐   ┌──────────┐   ┌──────────┐   ┌─────────────┐    │
//! │  │ sampler  │──▶│  alerts  │──▶│  health  │──▶│   history   │    │
//! │  │ (filter) │   │ (engine) │   │ (scorer) │   │ (ring bufs) │    │
//! │  └────┬─────┘   └──────────┘   └──────────┘   └──────┬──────┘    │
//! │       │                                              ▼           │
//! │       ▼                                        ┌───────────┐     │
//! │  ┌──────────┐                                  │    hub    │──▶ subscribers
//! │  │  source  │◀── FileSource | ChannelSource    └───────────┘     │
//! │  │ (input)  │    | CompositeSource                               │
//! │  └──────────┘                                                    │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! - **[`pipeline`]**: per-channel [`SignalFilter`], the per-device
//!   [`MetricSampler`], the [`AlertEngine`] and the [`HealthScorer`]
//! - **[`history`]**: bounded per-device retention with pagination
//! - **[`hub`]**: non-blocking fan-out with per-subscriber bounded queues
//! - **[`service`]**: device registry, per-device tasks and the query surface
//! - **[`config`]**: file and environment configuration, hot-reloadable
//!   through [`ConfigPatch`]
//!
//! Sensor access lives behind the [`DataSource`] trait from
//! `ocpwatch-sources`; the data model is in `ocpwatch-types`.
//!
//! ## Usage
//!
//! ### As a CLI tool
//!
//! ```bash
//! # Monitor readings written to a JSON file by an external collector
//! ocpwatch --readings readings.json --interval 2s
//!
//! # With a configuration file
//! ocpwatch --config ocpwatch.toml
//! ```
//!
//! ### As a library
//!
//! ```
//! use std::sync::Arc;
//! use ocpwatch::{ChannelSource, ConfigPatch, MonitorConfig, MonitoringService};
//! use ocpwatch_types::Device;
//!
//! # tokio_test::block_on(async {
//! let (readings, source) = ChannelSource::create("collector");
//! readings.set("dev0", "gnss_sync", "HOLDOVER");
//!
//! let service = MonitoringService::new(MonitorConfig::default()).unwrap();
//! service.add_device(Device::timecard("dev0"), Arc::new(source)).unwrap();
//! let mut events = service.subscribe();
//!
//! service.poll_now("dev0").await.unwrap();
//! let alerts = service.get_alerts(Some("dev0")).unwrap();
//! assert!(alerts.iter().any(|a| a.rule_id == "gnss_sync"));
//!
//! // Hot reload
//! let patch = ConfigPatch::from_json(r#"{"poll_interval": "1s"}"#).unwrap();
//! service.set_config(&patch).unwrap();
//!
//! service.shutdown().await;
//! while let Some(event) = events.recv().await {
//!     println!("{:?} for {}", event.kind, event.device);
//! }
//! # });
//! ```

pub mod config;
pub mod error;
pub mod history;
pub mod hub;
pub mod pipeline;
pub mod service;

pub use config::{ConfigPatch, DeviceConfig, LiveConfig, MonitorConfig};
pub use error::{MonitorError, Result};
pub use history::HistoryStore;
pub use hub::{PublishHub, Subscription};
pub use pipeline::{
    AlertEngine, AlertRule, Condition, FilterSettings, HealthPenalties, HealthScorer, MetricSampler,
    SignalFilter,
};
pub use service::{DeviceStatus, MonitoringService};

pub use ocpwatch_sources::{ChannelSource, CompositeSource, DataSource, FileSource};
pub use ocpwatch_types as types;
