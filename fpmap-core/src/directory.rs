//! Live series directory
//!
//! The directory maps a fingerprint to the series currently held in memory
//! under it. The mapper only ever reads it through [`SeriesDirectory`].

use crate::{Fingerprint, Metric};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Read access to the live series index
pub trait SeriesDirectory: Send + Sync {
    /// Metric of the live series at `fp`, if any
    fn get(&self, fp: Fingerprint) -> Option<Metric>;
}

impl<T: SeriesDirectory + ?Sized> SeriesDirectory for Arc<T> {
    fn get(&self, fp: Fingerprint) -> Option<Metric> {
        (**self).get(fp)
    }
}

/// A series held in memory
#[derive(Debug, Clone, PartialEq)]
pub struct MemorySeries {
    /// Label set of the series
    pub metric: Metric,
    /// Timestamp of the first sample, nanoseconds
    pub first_time: i64,
    /// Timestamp of the last sample, nanoseconds
    pub last_time: i64,
}

impl MemorySeries {
    /// Create a series with no samples yet
    pub fn new(metric: Metric) -> Self {
        Self {
            metric,
            first_time: i64::MAX,
            last_time: i64::MIN,
        }
    }

    /// Extend the sample time range
    pub fn observe(&mut self, timestamp: i64) {
        self.first_time = self.first_time.min(timestamp);
        self.last_time = self.last_time.max(timestamp);
    }
}

/// In-memory fingerprint to series map
#[derive(Debug, Default)]
pub struct SeriesMap {
    series: RwLock<HashMap<Fingerprint, MemorySeries>>,
}

impl SeriesMap {
    /// Create an empty series map
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the series at `fp`
    pub fn put(&self, fp: Fingerprint, series: MemorySeries) -> Option<MemorySeries> {
        self.series.write().insert(fp, series)
    }

    /// Get a copy of the series at `fp`
    pub fn get_series(&self, fp: Fingerprint) -> Option<MemorySeries> {
        self.series.read().get(&fp).cloned()
    }

    /// Remove the series at `fp`
    pub fn del(&self, fp: Fingerprint) -> Option<MemorySeries> {
        self.series.write().remove(&fp)
    }

    /// Number of live series
    pub fn len(&self) -> usize {
        self.series.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.read().is_empty()
    }

    /// All live fingerprints, sorted
    pub fn fingerprints(&self) -> Vec<Fingerprint> {
        let mut fps: Vec<_> = self.series.read().keys().copied().collect();
        fps.sort();
        fps
    }
}

impl SeriesDirectory for SeriesMap {
    fn get(&self, fp: Fingerprint) -> Option<Metric> {
        self.series.read().get(&fp).map(|s| s.metric.clone())
    }
}
