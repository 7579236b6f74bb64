//! File-based data source.
//!
//! Reads raw readings from a JSON file that an external collector (an
//! I2C/sysfs poller, a vendor daemon) keeps up to date.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use async_trait::async_trait;
use ocpwatch_types::Reading;
use parking_lot::Mutex;

use crate::readings::{lookup, parse_readings, ReadingsMap};
use crate::{DataSource, SourceError};

/// A file not rewritten for this long means the collector has stopped.
const DEFAULT_MAX_AGE: Duration = Duration::from_secs(30);

/// Reads closer together than this share one metadata check.
const CHECK_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Default)]
struct Cache {
    last_modified: Option<SystemTime>,
    checked_at: Option<Instant>,
    readings: Option<Arc<ReadingsMap>>,
    last_error: Option<String>,
    loads: u64,
}

/// A data source backed by a readings file.
///
/// The source tracks the file's modification time and only re-parses it
/// when the file has been updated. If the file disappears or becomes
/// unparseable, the last good contents keep being served and the failure
/// is available through [`FileSource::error`]. Once the last good contents
/// are older than the maximum age, every read reports the sensor
/// unavailable until the collector writes the file again.
///
/// Concurrent reads queue behind one reload, so a full device cycle costs
/// one `stat` and at most one parse.
#[derive(Debug)]
pub struct FileSource {
    path: PathBuf,
    description: String,
    max_age: Option<Duration>,
    cache: Mutex<Cache>,
    reload: tokio::sync::Mutex<()>,
}

impl FileSource {
    /// Create a new file source for the given path.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let description = format!("file: {}", path.display());
        Self {
            path,
            description,
            max_age: Some(DEFAULT_MAX_AGE),
            cache: Mutex::new(Cache::default()),
            reload: tokio::sync::Mutex::new(()),
        }
    }

    /// Treat the file as dead once it has not changed for `max_age`.
    /// `None` serves the last contents indefinitely.
    pub fn with_max_age(mut self, max_age: Option<Duration>) -> Self {
        self.max_age = max_age;
        self
    }

    /// Returns the path being read.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn max_age(&self) -> Option<Duration> {
        self.max_age
    }

    /// The most recent read or parse failure, if the last attempt failed.
    pub fn error(&self) -> Option<String> {
        self.cache.lock().last_error.clone()
    }

    /// Current readings, re-reading the file if it changed.
    async fn readings(&self) -> Result<Arc<ReadingsMap>, SourceError> {
        let _reload = self.reload.lock().await;
        let readings = self.refresh().await?;
        self.check_age()?;
        Ok(readings)
    }

    async fn refresh(&self) -> Result<Arc<ReadingsMap>, SourceError> {
        {
            let cache = self.cache.lock();
            if let (Some(checked), Some(readings)) = (cache.checked_at, &cache.readings) {
                if checked.elapsed() < CHECK_INTERVAL {
                    return Ok(readings.clone());
                }
            }
        }

        let modified = tokio::fs::metadata(&self.path)
            .await
            .and_then(|m| m.modified())
            .ok();

        let cached = {
            let mut cache = self.cache.lock();
            cache.checked_at = Some(Instant::now());
            let changed = match (&cache.last_modified, &modified) {
                (None, _) => true,
                (Some(_), None) => false,
                (Some(last), Some(current)) => current > last,
            };
            if changed {
                None
            } else {
                cache.readings.clone()
            }
        };
        if let Some(readings) = cached {
            return Ok(readings);
        }

        match self.load().await {
            Ok(readings) => {
                let readings = Arc::new(readings);
                let mut cache = self.cache.lock();
                cache.last_modified = modified;
                cache.readings = Some(readings.clone());
                cache.last_error = None;
                cache.loads += 1;
                Ok(readings)
            }
            Err(err) => {
                tracing::debug!(path = %self.path.display(), error = %err, "failed to load readings");
                let mut cache = self.cache.lock();
                cache.last_error = Some(err.to_string());
                cache.readings.clone().ok_or(err)
            }
        }
    }

    /// Fails if the contents being served were written longer ago than `max_age`.
    fn check_age(&self) -> Result<(), SourceError> {
        let Some(max_age) = self.max_age else {
            return Ok(());
        };
        let Some(modified) = self.cache.lock().last_modified else {
            return Ok(());
        };
        let age = SystemTime::now().duration_since(modified).unwrap_or_default();
        if age > max_age {
            tracing::debug!(path = %self.path.display(), ?age, "readings file stale");
            return Err(SourceError::Unavailable("readings file stale".to_string()));
        }
        Ok(())
    }

    async fn load(&self) -> Result<ReadingsMap, SourceError> {
        let content = tokio::fs::read_to_string(&self.path).await?;
        parse_readings(&content)
    }
}

#[async_trait]
impl DataSource for FileSource {
    async fn read(&self, device: &str, channel: &str) -> Reading {
        match self.readings().await {
            Ok(readings) => lookup(&readings, device, channel),
            Err(err) => err.into(),
        }
    }

    async fn is_available(&self, device: &str) -> bool {
        match self.readings().await {
            Ok(readings) => readings.get(device).map(|d| d.available).unwrap_or(false),
            Err(_) => false,
        }
    }

    fn describe(&self) -> &str {
        &self.description
    }
}
