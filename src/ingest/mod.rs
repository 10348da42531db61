//! Usage ingestion and continuity
//!
//! Turns named series of per-interval readings into cumulative statistics.
//! Each accepted series is anchored on the last stored total before its
//! window, so repeated imports of overlapping windows stay continuous.

pub mod classify;
pub mod engine;
pub mod value;

use serde_json::Value;

pub use classify::{StatisticKind, classify};
pub use engine::{IngestPolicy, IngestReport, SkipReason, SkippedSeries, StatisticBatch, ingest};
pub use value::{ReadingValue, Stamp};

/// One reading: interval start and energy used in it
#[derive(Debug, Clone, PartialEq)]
pub struct UsagePoint {
    pub timestamp: Stamp,
    pub value: ReadingValue,
}

impl UsagePoint {
    pub fn new(timestamp: Stamp, value: ReadingValue) -> Self {
        Self { timestamp, value }
    }

    /// Decode a `{"timestamp": .., "value": ..}` object
    ///
    /// An explicit `null` value reads as null. A point missing either key
    /// is invalid and gets dropped by the engine.
    pub fn from_json(point: &Value) -> Self {
        let timestamp = match point.get("timestamp") {
            Some(ts) => Stamp::from_json(ts),
            None => Stamp::Invalid(point.to_string()),
        };
        let value = match point.get("value") {
            Some(v) => ReadingValue::from_json(v),
            None => ReadingValue::Unparsable(point.to_string()),
        };
        Self { timestamp, value }
    }
}

/// A named series of readings, in upstream order
#[derive(Debug, Clone, PartialEq)]
pub struct UsageSeries {
    pub name: String,
    pub points: Vec<UsagePoint>,
}

impl UsageSeries {
    pub fn new(name: impl Into<String>, points: Vec<UsagePoint>) -> Self {
        Self {
            name: name.into(),
            points,
        }
    }

    /// Whether any reading is strictly positive
    pub fn has_signal(&self) -> bool {
        self.points.iter().any(|p| p.value.is_signal())
    }
}

/// Named series in the order the upstream payload listed them
///
/// Names are unique; inserting a known name replaces that series in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeriesSet {
    series: Vec<UsageSeries>,
}

impl SeriesSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, series: UsageSeries) {
        match self.series.iter_mut().find(|s| s.name == series.name) {
            Some(slot) => *slot = series,
            None => self.series.push(series),
        }
    }

    pub fn get(&self, name: &str) -> Option<&UsageSeries> {
        self.series.iter().find(|s| s.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, UsageSeries> {
        self.series.iter()
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

impl FromIterator<UsageSeries> for SeriesSet {
    fn from_iter<I: IntoIterator<Item = UsageSeries>>(iter: I) -> Self {
        let mut set = Self::new();
        for series in iter {
            set.insert(series);
        }
        set
    }
}

impl<'a> IntoIterator for &'a SeriesSet {
    type Item = &'a UsageSeries;
    type IntoIter = std::slice::Iter<'a, UsageSeries>;

    fn into_iter(self) -> Self::IntoIter {
        self.series.iter()
    }
}
