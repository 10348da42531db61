//! Usage payload decoding
//!
//! The chart endpoint answers either with a `chart_data` object keyed by
//! series name (`{"valid_points": [{"timestamp", "value"}]}`) or with a
//! chart-style `series` list of `{name, data: [[x, y], ...]}`. Both decode
//! into the same series set, kept in payload order.

use crate::error::{PsegError, Result};
use crate::ingest::{ReadingValue, SeriesSet, Stamp, UsagePoint, UsageSeries};
use crate::logging::StructuredLogger;
use serde_json::Value;

/// Decode a chart response into named series
pub fn decode_chart_payload(body: &Value, logger: &StructuredLogger) -> Result<SeriesSet> {
    if let Some(chart) = body.get("chart_data").and_then(Value::as_object) {
        let mut out = SeriesSet::new();
        for (name, data) in chart {
            match decode_valid_points(data.get("valid_points").unwrap_or(&Value::Null)) {
                Some(points) => {
                    out.insert(UsageSeries::new(name.clone(), points));
                }
                None => logger.warn(&format!("valid_points of {} is not a list", name)),
            }
        }
        return Ok(out);
    }

    if let Some(series) = body.get("series").and_then(Value::as_array) {
        let mut out = SeriesSet::new();
        for entry in series {
            let Some(name) = entry.get("name").and_then(Value::as_str) else {
                logger.warn("chart series without a name");
                continue;
            };
            let points = entry
                .get("data")
                .and_then(Value::as_array)
                .map(|data| data.iter().map(decode_chart_pair).collect())
                .unwrap_or_default();
            out.insert(UsageSeries::new(name, points));
        }
        return Ok(out);
    }

    Err(PsegError::api("No chart data found in response"))
}

/// `valid_points` may itself be a JSON-encoded string holding the list
fn decode_valid_points(raw: &Value) -> Option<Vec<UsagePoint>> {
    let owned;
    let list = match raw {
        Value::Array(items) => items,
        Value::String(s) => {
            owned = serde_json::from_str::<Value>(s).ok()?;
            owned.as_array()?
        }
        _ => return None,
    };
    Some(list.iter().map(UsagePoint::from_json).collect())
}

/// `[x, y]` or `{"x": .., "y": ..}`
fn decode_chart_pair(item: &Value) -> UsagePoint {
    match item {
        Value::Array(pair) if pair.len() >= 2 => UsagePoint::new(
            Stamp::from_json(&pair[0]),
            ReadingValue::from_json(&pair[1]),
        ),
        Value::Object(_) => UsagePoint::new(
            Stamp::from_json(item.get("x").unwrap_or(&Value::Null)),
            ReadingValue::from_json(item.get("y").unwrap_or(&Value::Null)),
        ),
        other => UsagePoint::new(
            Stamp::Invalid(other.to_string()),
            ReadingValue::Unparsable(other.to_string()),
        ),
    }
}
