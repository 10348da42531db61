use chrono::{Duration, TimeZone, Utc};
use psegli::ingest::{
    IngestPolicy, ReadingValue, SeriesSet, SkipReason, Stamp, UsagePoint, UsageSeries, ingest,
};
use psegli::logging::get_logger;
use psegli::statistics::{CumulativeRecord, MemoryStatisticsStore, StatisticsStore};
use psegli::utility::decode_chart_payload;

fn hourly(name: &str, start: &str, values: Vec<ReadingValue>) -> UsageSeries {
    let base = chrono::NaiveDateTime::parse_from_str(start, "%Y-%m-%d %H:%M:%S").unwrap();
    let points = values
        .into_iter()
        .enumerate()
        .map(|(i, v)| UsagePoint::new(Stamp::Local(base + Duration::hours(i as i64)), v))
        .collect();
    UsageSeries::new(name, points)
}

fn map(series: Vec<UsageSeries>) -> SeriesSet {
    series.into_iter().collect()
}

fn n(v: f64) -> ReadingValue {
    ReadingValue::Number(v)
}

#[tokio::test]
async fn end_to_end_continues_from_stored_anchor() {
    let store = MemoryStatisticsStore::new();
    // 2024-01-15 00:00 New York is 05:00 UTC; anchor one hour earlier
    store
        .insert(
            "psegli:energy_usage",
            CumulativeRecord {
                start: Utc.with_ymd_and_hms(2024, 1, 15, 4, 0, 0).unwrap(),
                sum: 10.0,
            },
        )
        .await;

    let series = hourly(
        "Meter #1234",
        "2024-01-15 00:00:00",
        vec![n(2.0), n(3.0), ReadingValue::Null],
    );
    let report = ingest(&map(vec![series]), &store, &IngestPolicy::default()).await;

    assert_eq!(report.batches.len(), 1);
    let batch = &report.batches[0];
    assert_eq!(batch.statistic_id(), "psegli:energy_usage");
    assert_eq!(batch.anchor, 10.0);
    let sums: Vec<f64> = batch.records.iter().map(|r| r.sum).collect();
    assert_eq!(sums, vec![12.0, 15.0, 15.0]);
    assert_eq!(
        batch.records[0].start,
        Utc.with_ymd_and_hms(2024, 1, 15, 5, 0, 0).unwrap()
    );
}

#[tokio::test]
async fn reingesting_same_window_is_idempotent() {
    let store = MemoryStatisticsStore::new();
    let policy = IngestPolicy::default();
    let series = map(vec![hourly(
        "On-Peak Usage",
        "2024-02-01 10:00:00",
        vec![n(1.5), n(0.5), n(2.0)],
    )]);

    let first = ingest(&series, &store, &policy).await;
    for b in &first.batches {
        store.import(&b.metadata, &b.records).await.unwrap();
    }
    let second = ingest(&series, &store, &policy).await;
    for b in &second.batches {
        store.import(&b.metadata, &b.records).await.unwrap();
    }

    assert_eq!(first.records(), second.records());
    let stored = store.records("psegli:on_peak_usage").await;
    assert_eq!(stored.len(), 3);
    assert_eq!(stored.last().map(|r| r.sum), Some(4.0));
}

#[tokio::test]
async fn sums_never_decrease_and_glitches_are_clamped() {
    let store = MemoryStatisticsStore::new();
    let series = map(vec![hourly(
        "Off-Peak Usage",
        "2024-03-01 00:00:00",
        vec![n(1.0), n(-5.0), n(5000.0), n(0.25)],
    )]);
    let report = ingest(&series, &store, &IngestPolicy::default()).await;

    let sums: Vec<f64> = report.batches[0].records.iter().map(|r| r.sum).collect();
    assert_eq!(sums, vec![1.0, 1.0, 101.0, 101.25]);
    assert!(sums.windows(2).all(|w| w[1] >= w[0]));
}

#[tokio::test]
async fn unrecognized_and_silent_series_are_skipped() {
    let store = MemoryStatisticsStore::new();
    let series = map(vec![
        hourly("Irrelevant Sensor", "2024-01-01 00:00:00", vec![n(3.0)]),
        hourly(
            "Residential Service",
            "2024-01-01 00:00:00",
            vec![n(0.0), ReadingValue::Null, n(0.0)],
        ),
    ]);
    let report = ingest(&series, &store, &IngestPolicy::default()).await;

    assert!(report.batches.is_empty());
    assert_eq!(report.record_count(), 0);
    let reasons: Vec<(&str, &SkipReason)> = report
        .skipped
        .iter()
        .map(|s| (s.name.as_str(), &s.reason))
        .collect();
    assert!(reasons.contains(&("Irrelevant Sensor", &SkipReason::Unclassified)));
    assert!(reasons.contains(&("Residential Service", &SkipReason::NoSignal)));
    // no anchor lookups for skipped series
    assert_eq!(store.query_count(), 0);
}

#[tokio::test]
async fn failed_anchor_lookup_degrades_to_zero() {
    let store = MemoryStatisticsStore::new();
    store
        .insert(
            "psegli:energy_usage",
            CumulativeRecord {
                start: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
                sum: 99.0,
            },
        )
        .await;
    store.fail_queries(true);

    let series = map(vec![hourly("Meter #1", "2024-01-01 12:00:00", vec![n(1.0)])]);
    let report = ingest(&series, &store, &IngestPolicy::default()).await;

    assert_eq!(report.degraded_anchors, 1);
    assert_eq!(report.batches[0].anchor, 0.0);
    assert_eq!(report.batches[0].records[0].sum, 1.0);
}

#[tokio::test]
async fn bad_first_timestamp_skips_the_series() {
    let store = MemoryStatisticsStore::new();
    let series = UsageSeries::new(
        "Meter #1",
        vec![
            UsagePoint::new(Stamp::from_text("??"), n(1.0)),
            UsagePoint::new(Stamp::from_text("2024-01-01 01:00:00"), n(1.0)),
        ],
    );
    let report = ingest(&map(vec![series]), &store, &IngestPolicy::default()).await;
    assert!(report.batches.is_empty());
    assert_eq!(report.skipped[0].reason, SkipReason::BadFirstTimestamp);
}

#[tokio::test]
async fn second_series_for_same_statistic_is_skipped() {
    let store = MemoryStatisticsStore::new();
    let series = map(vec![
        hourly("Meter #1", "2024-01-01 00:00:00", vec![n(1.0)]),
        hourly("Residential Service", "2024-01-01 00:00:00", vec![n(2.0)]),
    ]);
    let report = ingest(&series, &store, &IngestPolicy::default()).await;

    assert_eq!(report.batches.len(), 1);
    assert_eq!(report.batches[0].series_name, "Meter #1");
    assert_eq!(
        report.skipped[0].reason,
        SkipReason::DuplicateStatistic("psegli:energy_usage".to_string())
    );
}

#[tokio::test]
async fn first_listed_series_claims_the_statistic() {
    let store = MemoryStatisticsStore::new();
    let series = map(vec![
        hourly("Residential Service", "2024-01-01 00:00:00", vec![n(2.0)]),
        hourly("Meter #1", "2024-01-01 00:00:00", vec![n(1.0)]),
    ]);
    let report = ingest(&series, &store, &IngestPolicy::default()).await;

    assert_eq!(report.batches.len(), 1);
    assert_eq!(report.batches[0].series_name, "Residential Service");
    assert_eq!(report.skipped[0].name, "Meter #1");
}

#[tokio::test]
async fn point_without_value_is_dropped_not_zeroed() {
    let body: serde_json::Value = serde_json::from_str(
        r#"{"chart_data": {"Meter #1": {"valid_points": [
            {"timestamp": "2024-01-01 00:00:00", "value": 1.0},
            {"timestamp": "2024-01-01 01:00:00"},
            {"timestamp": "2024-01-01 02:00:00", "value": null},
            {"timestamp": "2024-01-01 03:00:00", "value": 2.0}
        ]}}}"#,
    )
    .unwrap();
    let series = decode_chart_payload(&body, &get_logger("test")).unwrap();
    let store = MemoryStatisticsStore::new();
    let report = ingest(&series, &store, &IngestPolicy::default()).await;

    let batch = &report.batches[0];
    assert_eq!(batch.malformed_points, 1);
    let sums: Vec<f64> = batch.records.iter().map(|r| r.sum).collect();
    assert_eq!(sums, vec![1.0, 1.0, 3.0]);
    // the hour with no value key leaves a gap
    let hours: Vec<_> = batch.records.iter().map(|r| r.start).collect();
    assert_eq!(hours[1] - hours[0], Duration::hours(2));
}
