//! # ocpwatch-types
//!
//! Core types for monitoring timing hardware such as the OCP Time Card. This
//! crate defines the data model shared by every layer of ocpwatch: the device
//! registry, raw readings coming off sensors, validated snapshots, alerts and
//! the events streamed to subscribers.
//!
//! ## Design Goals
//!
//! - **No required dependencies**: the model works without a serialization framework
//! - **Optional serialization**: enable the `serde` feature for JSON and friends
//! - **Tagged readings**: a sensor failure is a value (`Reading::Unavailable`), never a panic
//! - **Versioned schema**: snapshots carry a version for forward compatibility
//! - **Ergonomic builders**: fluent API for devices and snapshots
//!
//! ## Example
//!
//! ```rust
//! use ocpwatch_types::{ChannelSample, FilterReason, Snapshot, Subsystem};
//!
//! let snapshot = Snapshot::builder("timecard0")
//!     .timestamp_ms(1_700_000_000_000)
//!     .sample("clock_offset_ns", ChannelSample::accepted(Subsystem::Timing, 12.0.into()))
//!     .sample(
//!         "voltage_3v3",
//!         ChannelSample::rejected(Subsystem::Power, None, FilterReason::Unavailable),
//!     )
//!     .build();
//!
//! assert_eq!(snapshot.len(), 2);
//! assert_eq!(snapshot.number("clock_offset_ns"), Some(12.0));
//! ```
//!
//! ## Schema Version
//!
//! The current schema version is **1**.

mod alert;
mod device;
mod event;
mod health;
mod page;
mod reading;
mod snapshot;
mod version;

pub use alert::*;
pub use device::*;
pub use event::*;
pub use health::*;
pub use page::*;
pub use reading::*;
pub use snapshot::*;
pub use version::*;

/// Current schema version.
///
/// Increment this when making breaking changes to the snapshot format.
pub const SCHEMA_VERSION: u32 = 1;

/// Milliseconds since the Unix epoch according to the system clock.
pub fn current_timestamp_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
