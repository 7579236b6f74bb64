//! # ocpwatch-sources
//!
//! Data sources that feed raw sensor readings into the ocpwatch pipeline.
//!
//! Every sensor behind a Time Card (the PTP clock, the GNSS receiver, the
//! INA219 power monitors, the PCT2075 thermal sensors) is reached through one
//! capability: the [`DataSource`] trait. A source answers one question per
//! call, "what does `channel` on `device` read right now?", and reports
//! failures as [`Reading::Unavailable`] instead of errors.
//!
//! ## Sources
//!
//! - [`FileSource`] - reads a JSON readings file maintained by an external collector
//! - [`ChannelSource`] - readings pushed through a tokio watch channel
//! - [`CompositeSource`] - routes individual channels to dedicated sources
//! - `SimulatedSource` (`simulation` feature) - seeded synthetic telemetry for
//!   demos and tests; never a production default
//!
//! ## Quick Start
//!
//! ```rust
//! use ocpwatch_sources::{ChannelSource, DataSource};
//! use ocpwatch_types::Reading;
//!
//! # tokio_test::block_on(async {
//! let (tx, source) = ChannelSource::create("bench rig");
//! tx.set("timecard0", "clock_offset_ns", 12.5);
//!
//! assert_eq!(source.read("timecard0", "clock_offset_ns").await, Reading::number(12.5));
//! # });
//! ```

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use ocpwatch_types::Reading;

pub mod channel;
pub mod composite;
pub mod error;
pub mod file;
pub mod readings;

#[cfg(feature = "simulation")]
pub mod simulated;

pub use channel::{ChannelSource, ReadingsSender};
pub use composite::{CompositeSource, CompositeSourceBuilder};
pub use error::SourceError;
pub use file::FileSource;
pub use readings::{DeviceReadings, ReadingsMap};

#[cfg(feature = "simulation")]
pub use simulated::{SimulatedSource, SimulationConfig};

/// Trait for anything that can read raw channel values from a device.
///
/// Implementations must never panic on a bad sensor; a failed read is a
/// [`Reading::Unavailable`]. Reads may be slow: callers bound them with a
/// timeout.
#[async_trait]
pub trait DataSource: Send + Sync + Debug {
    /// Read one channel of one device.
    async fn read(&self, device: &str, channel: &str) -> Reading;

    /// Whether the device answers at all. When false the caller treats
    /// every channel as unavailable without reading them.
    async fn is_available(&self, _device: &str) -> bool {
        true
    }

    /// Returns a description of this source for display.
    fn describe(&self) -> &str;
}

#[async_trait]
impl<T: DataSource + ?Sized> DataSource for Arc<T> {
    async fn read(&self, device: &str, channel: &str) -> Reading {
        (**self).read(device, channel).await
    }

    async fn is_available(&self, device: &str) -> bool {
        (**self).is_available(device).await
    }

    fn describe(&self) -> &str {
        (**self).describe()
    }
}
