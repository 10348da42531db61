//! Long-term statistics store
//!
//! The importer writes cumulative hourly records through the
//! [`StatisticsStore`] trait. [`HomeAssistantStatistics`] talks to the
//! recorder over the websocket API; [`MemoryStatisticsStore`] backs tests
//! and dry runs.

pub mod home_assistant;
pub mod memory;

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

pub use home_assistant::HomeAssistantStatistics;
pub use memory::MemoryStatisticsStore;

/// Source tag of every statistic this crate writes
pub const STATISTIC_SOURCE: &str = "psegli";

/// Unit of every statistic this crate writes
pub const ENERGY_UNIT: &str = "kWh";

/// One hourly cumulative total
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CumulativeRecord {
    pub start: DateTime<Utc>,
    pub sum: f64,
}

/// Descriptor sent alongside the records of one statistic id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticMetadata {
    pub statistic_id: String,
    pub source: String,
    pub name: String,
    pub unit_of_measurement: String,
    pub has_mean: bool,
    pub has_sum: bool,
}

impl StatisticMetadata {
    /// Metadata of an external energy counter fed by the named usage series
    pub fn energy(statistic_id: &str, series_name: &str) -> Self {
        Self {
            statistic_id: statistic_id.to_string(),
            source: STATISTIC_SOURCE.to_string(),
            name: format!("PSEG {}", series_name),
            unit_of_measurement: ENERGY_UNIT.to_string(),
            has_mean: false,
            has_sum: true,
        }
    }
}

/// Backing store for cumulative statistics
#[async_trait]
pub trait StatisticsStore: Send + Sync {
    /// Latest stored sum with `start` strictly before `before`, searched within `lookback`
    async fn last_sum_before(
        &self,
        statistic_id: &str,
        before: DateTime<Utc>,
        lookback: Duration,
    ) -> Result<Option<f64>>;

    /// Insert or overwrite records for one statistic id
    async fn import(
        &self,
        metadata: &StatisticMetadata,
        records: &[CumulativeRecord],
    ) -> Result<()>;

    /// Stored records with `start >= since`, oldest first
    async fn records_since(
        &self,
        statistic_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<CumulativeRecord>>;
}

/// Pick the newest record strictly before `before`
pub(crate) fn latest_before(
    records: impl IntoIterator<Item = CumulativeRecord>,
    before: DateTime<Utc>,
) -> Option<CumulativeRecord> {
    records
        .into_iter()
        .filter(|r| r.start < before)
        .max_by_key(|r| r.start)
}
