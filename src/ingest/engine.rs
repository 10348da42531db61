//! Cumulative series construction

use super::classify::{StatisticKind, classify};
use super::value::ReadingValue;
use super::{SeriesSet, UsagePoint, UsageSeries};
use crate::config::StatisticsConfig;
use crate::error::{PsegError, Result};
use crate::logging::{StructuredLogger, get_logger};
use crate::statistics::{CumulativeRecord, StatisticMetadata, StatisticsStore};
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use std::collections::BTreeSet;

/// Validation and anchoring parameters
#[derive(Debug, Clone)]
pub struct IngestPolicy {
    /// How far back the continuity anchor is searched
    pub lookback: Duration,
    /// Readings above this are glitches
    pub implausible_threshold: f64,
    /// Value substituted for glitches
    pub glitch_cap: f64,
    /// Zone of timestamps without an offset
    pub timezone: Tz,
}

impl Default for IngestPolicy {
    fn default() -> Self {
        Self {
            lookback: Duration::days(7),
            implausible_threshold: 1000.0,
            glitch_cap: 100.0,
            timezone: chrono_tz::America::New_York,
        }
    }
}

impl IngestPolicy {
    pub fn from_config(config: &StatisticsConfig) -> Result<Self> {
        let timezone = config.timezone.parse::<Tz>().map_err(|_| {
            PsegError::validation("statistics.timezone".to_string(), config.timezone.clone())
        })?;
        Ok(Self {
            lookback: Duration::days(config.lookback_days),
            implausible_threshold: config.implausible_threshold_kwh,
            glitch_cap: config.glitch_cap_kwh,
            timezone,
        })
    }

    /// Clamp a reading into its accepted range
    pub fn sanitize(&self, value: f64) -> f64 {
        if value < 0.0 {
            0.0
        } else if value > self.implausible_threshold {
            self.glitch_cap
        } else {
            value
        }
    }
}

/// Records for one statistic id, ready for import
#[derive(Debug, Clone, PartialEq)]
pub struct StatisticBatch {
    pub kind: StatisticKind,
    pub series_name: String,
    pub metadata: StatisticMetadata,
    pub anchor: f64,
    pub records: Vec<CumulativeRecord>,
    /// Points dropped for a bad timestamp or value
    pub malformed_points: usize,
}

impl StatisticBatch {
    pub fn statistic_id(&self) -> &str {
        &self.metadata.statistic_id
    }

    pub fn final_sum(&self) -> Option<f64> {
        self.records.last().map(|r| r.sum)
    }
}

/// Why a series produced no batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Name matched no classification rule
    Unclassified,
    /// No strictly positive reading
    NoSignal,
    /// First timestamp could not be resolved
    BadFirstTimestamp,
    /// Another series in the same run already feeds this statistic id
    DuplicateStatistic(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedSeries {
    pub name: String,
    pub reason: SkipReason,
}

/// Outcome of one ingestion pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestReport {
    pub batches: Vec<StatisticBatch>,
    pub skipped: Vec<SkippedSeries>,
    /// Anchor lookups that failed and fell back to zero
    pub degraded_anchors: usize,
}

impl IngestReport {
    pub fn record_count(&self) -> usize {
        self.batches.iter().map(|b| b.records.len()).sum()
    }

    /// Flattened `(statistic_id, record)` pairs in emission order
    pub fn records(&self) -> Vec<(String, CumulativeRecord)> {
        self.batches
            .iter()
            .flat_map(|b| {
                b.records
                    .iter()
                    .map(move |r| (b.metadata.statistic_id.clone(), *r))
            })
            .collect()
    }
}

/// Build cumulative batches for every accepted series
///
/// Series are handled one at a time in upstream order. The first series that
/// maps to a statistic id claims it for this run.
pub async fn ingest(
    series_set: &SeriesSet,
    store: &dyn StatisticsStore,
    policy: &IngestPolicy,
) -> IngestReport {
    let logger = get_logger("ingest").for_run();
    let mut report = IngestReport::default();
    let mut claimed: BTreeSet<StatisticKind> = BTreeSet::new();

    for series in series_set {
        let name = &series.name;
        let skip = |reason: SkipReason| SkippedSeries {
            name: name.clone(),
            reason,
        };

        let Some(kind) = classify(name) else {
            logger.debug(&format!("Skipping unrecognized series: {}", name));
            report.skipped.push(skip(SkipReason::Unclassified));
            continue;
        };

        if !series.has_signal() {
            logger.info(&format!("Skipping {}: no non-zero readings", name));
            report.skipped.push(skip(SkipReason::NoSignal));
            continue;
        }

        if claimed.contains(&kind) {
            logger.warn(&format!(
                "Skipping {}: {} already fed by another series",
                name, kind
            ));
            report
                .skipped
                .push(skip(SkipReason::DuplicateStatistic(kind.statistic_id().to_string())));
            continue;
        }

        let Some(first) = series
            .points
            .first()
            .and_then(|p| p.timestamp.to_utc(policy.timezone))
        else {
            logger.warn(&format!("No valid first timestamp for {}, skipping", name));
            report.skipped.push(skip(SkipReason::BadFirstTimestamp));
            continue;
        };

        let anchor = match store
            .last_sum_before(kind.statistic_id(), first, policy.lookback)
            .await
        {
            Ok(found) => found.unwrap_or(0.0),
            Err(e) => {
                logger.warn(&format!(
                    "Anchor lookup for {} failed, starting from 0: {}",
                    kind, e
                ));
                report.degraded_anchors += 1;
                0.0
            }
        };

        let batch = accumulate(kind, series, anchor, policy, &logger);
        logger.info(&format!(
            "{} -> {}: {} records, anchor {:.3}, final {:.3}",
            name,
            kind,
            batch.records.len(),
            anchor,
            batch.final_sum().unwrap_or(anchor)
        ));
        claimed.insert(kind);
        report.batches.push(batch);
    }

    report
}

/// Walk the points of one series, carrying the running total from `anchor`
pub fn accumulate(
    kind: StatisticKind,
    series: &UsageSeries,
    anchor: f64,
    policy: &IngestPolicy,
    logger: &StructuredLogger,
) -> StatisticBatch {
    let mut running = anchor;
    let mut records = Vec::with_capacity(series.points.len());
    let mut malformed = 0usize;

    for (index, point) in series.points.iter().enumerate() {
        match step(index, point, policy) {
            Ok((start, delta)) => {
                running += delta;
                records.push(CumulativeRecord {
                    start,
                    sum: running,
                });
            }
            Err(e) => {
                malformed += 1;
                logger.warn(&format!("{}: {}", series.name, e));
            }
        }
    }

    StatisticBatch {
        kind,
        series_name: series.name.clone(),
        metadata: StatisticMetadata::energy(kind.statistic_id(), &series.name),
        anchor,
        records,
        malformed_points: malformed,
    }
}

fn step(index: usize, point: &UsagePoint, policy: &IngestPolicy) -> Result<(DateTime<Utc>, f64)> {
    let start = point
        .timestamp
        .to_utc(policy.timezone)
        .ok_or_else(|| PsegError::malformed(index, format!("bad timestamp {:?}", point.timestamp)))?;
    let delta = match &point.value {
        ReadingValue::Number(v) => policy.sanitize(*v),
        ReadingValue::Null => 0.0,
        ReadingValue::Unparsable(raw) => {
            return Err(PsegError::malformed(index, format!("bad value {:?}", raw)));
        }
    };
    Ok((start, delta))
}
