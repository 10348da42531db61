//! Boundary parsing of raw readings
//!
//! Values and timestamps arrive as loosely typed JSON. They are classified
//! once here so the engine only deals with closed enums.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde_json::Value;

/// A reading as delivered upstream
#[derive(Debug, Clone, PartialEq)]
pub enum ReadingValue {
    Number(f64),
    Null,
    Unparsable(String),
}

impl ReadingValue {
    /// Classify a JSON value; numeric strings are accepted
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => ReadingValue::Null,
            Value::Number(n) => match n.as_f64() {
                Some(v) if v.is_finite() => ReadingValue::Number(v),
                _ => ReadingValue::Unparsable(n.to_string()),
            },
            Value::String(s) => Self::from_text(s),
            other => ReadingValue::Unparsable(other.to_string()),
        }
    }

    pub fn from_text(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return ReadingValue::Unparsable(raw.to_string());
        }
        match trimmed.parse::<f64>() {
            Ok(v) if v.is_finite() => ReadingValue::Number(v),
            _ => ReadingValue::Unparsable(raw.to_string()),
        }
    }

    /// True when the reading carries energy (strictly positive)
    pub fn is_signal(&self) -> bool {
        matches!(self, ReadingValue::Number(v) if *v > 0.0)
    }
}

/// A timestamp as delivered upstream
#[derive(Debug, Clone, PartialEq)]
pub enum Stamp {
    /// Carried an offset or was an epoch value
    Absolute(DateTime<Utc>),
    /// Wall-clock time without a zone
    Local(NaiveDateTime),
    Invalid(String),
}

const NAIVE_FORMATS: [&str; 6] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

// Epoch values above this are milliseconds (year 5138 in seconds)
const EPOCH_MILLIS_CUTOFF: f64 = 1e11;

impl Stamp {
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Number(n) => match n.as_f64() {
                Some(v) => Self::from_epoch(v),
                None => Stamp::Invalid(n.to_string()),
            },
            Value::String(s) => Self::from_text(s),
            other => Stamp::Invalid(other.to_string()),
        }
    }

    pub fn from_text(raw: &str) -> Self {
        let s = raw.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Stamp::Absolute(dt.with_timezone(&Utc));
        }
        for fmt in NAIVE_FORMATS {
            if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
                return Stamp::Local(naive);
            }
        }
        Stamp::Invalid(raw.to_string())
    }

    fn from_epoch(v: f64) -> Self {
        if !v.is_finite() || v < 0.0 {
            return Stamp::Invalid(v.to_string());
        }
        let millis = if v > EPOCH_MILLIS_CUTOFF { v } else { v * 1000.0 };
        match Utc.timestamp_millis_opt(millis as i64).single() {
            Some(dt) => Stamp::Absolute(dt),
            None => Stamp::Invalid(v.to_string()),
        }
    }

    /// Resolve to UTC, reading wall-clock times in `zone`
    ///
    /// A time skipped by a DST jump has no instant and resolves to `None`;
    /// an ambiguous one resolves to its earlier instant.
    pub fn to_utc(&self, zone: Tz) -> Option<DateTime<Utc>> {
        match self {
            Stamp::Absolute(dt) => Some(*dt),
            Stamp::Local(naive) => zone
                .from_local_datetime(naive)
                .earliest()
                .map(|dt| dt.with_timezone(&Utc)),
            Stamp::Invalid(_) => None,
        }
    }
}
