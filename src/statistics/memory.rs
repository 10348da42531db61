use super::{CumulativeRecord, StatisticMetadata, StatisticsStore, latest_before};
use crate::error::{PsegError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// In-process statistics store
///
/// Records are keyed by start time, so re-importing a window overwrites it
/// the same way the recorder does.
#[derive(Debug, Default)]
pub struct MemoryStatisticsStore {
    series: RwLock<HashMap<String, BTreeMap<DateTime<Utc>, f64>>>,
    metadata: RwLock<HashMap<String, StatisticMetadata>>,
    fail_queries: AtomicBool,
    queries: AtomicUsize,
}

impl MemoryStatisticsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every anchor lookup fail
    pub fn fail_queries(&self, fail: bool) {
        self.fail_queries.store(fail, Ordering::SeqCst);
    }

    /// Number of anchor lookups served so far
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    /// Seed a stored record
    pub async fn insert(&self, statistic_id: &str, record: CumulativeRecord) {
        self.series
            .write()
            .await
            .entry(statistic_id.to_string())
            .or_default()
            .insert(record.start, record.sum);
    }

    /// All records of one statistic id, oldest first
    pub async fn records(&self, statistic_id: &str) -> Vec<CumulativeRecord> {
        self.series
            .read()
            .await
            .get(statistic_id)
            .map(|m| {
                m.iter()
                    .map(|(start, sum)| CumulativeRecord {
                        start: *start,
                        sum: *sum,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub async fn metadata(&self, statistic_id: &str) -> Option<StatisticMetadata> {
        self.metadata.read().await.get(statistic_id).cloned()
    }
}

#[async_trait]
impl StatisticsStore for MemoryStatisticsStore {
    async fn last_sum_before(
        &self,
        statistic_id: &str,
        before: DateTime<Utc>,
        lookback: Duration,
    ) -> Result<Option<f64>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(PsegError::storage_query(format!(
                "query for {} rejected",
                statistic_id
            )));
        }
        let since = before - lookback;
        let series = self.series.read().await;
        let Some(map) = series.get(statistic_id) else {
            return Ok(None);
        };
        let window = map.range(since..before).map(|(start, sum)| CumulativeRecord {
            start: *start,
            sum: *sum,
        });
        Ok(latest_before(window, before).map(|r| r.sum))
    }

    async fn import(
        &self,
        metadata: &StatisticMetadata,
        records: &[CumulativeRecord],
    ) -> Result<()> {
        self.metadata
            .write()
            .await
            .insert(metadata.statistic_id.clone(), metadata.clone());
        let mut series = self.series.write().await;
        let map = series.entry(metadata.statistic_id.clone()).or_default();
        for r in records {
            map.insert(r.start, r.sum);
        }
        Ok(())
    }

    async fn records_since(
        &self,
        statistic_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<CumulativeRecord>> {
        Ok(self
            .records(statistic_id)
            .await
            .into_iter()
            .filter(|r| r.start >= since)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, hour, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn lookup_respects_lookback_window() {
        let store = MemoryStatisticsStore::new();
        store
            .insert("s", CumulativeRecord { start: at(1, 0), sum: 5.0 })
            .await;
        store
            .insert("s", CumulativeRecord { start: at(9, 0), sum: 9.0 })
            .await;

        let found = store
            .last_sum_before("s", at(10, 0), Duration::days(7))
            .await
            .unwrap();
        assert_eq!(found, Some(9.0));

        // the only earlier record is outside the window
        let found = store
            .last_sum_before("s", at(9, 0), Duration::days(7))
            .await
            .unwrap();
        assert_eq!(found, None);
        assert_eq!(store.query_count(), 2);
    }

    #[tokio::test]
    async fn import_overwrites_same_start() {
        let store = MemoryStatisticsStore::new();
        let meta = StatisticMetadata::energy("s", "Meter #1");
        store
            .import(&meta, &[CumulativeRecord { start: at(1, 0), sum: 1.0 }])
            .await
            .unwrap();
        store
            .import(&meta, &[CumulativeRecord { start: at(1, 0), sum: 2.0 }])
            .await
            .unwrap();
        let records = store.records("s").await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].sum, 2.0);
        assert_eq!(store.metadata("s").await, Some(meta));
    }

    #[tokio::test]
    async fn failing_queries_report_storage_query() {
        let store = MemoryStatisticsStore::new();
        store.fail_queries(true);
        let err = store
            .last_sum_before("s", at(2, 0), Duration::days(7))
            .await
            .unwrap_err();
        assert!(matches!(err, PsegError::StorageQuery { .. }));
    }
}
