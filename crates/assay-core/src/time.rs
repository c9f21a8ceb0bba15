//! Time handling for historian reads and writes
//!
//! - `Timestamp` - Unix epoch milliseconds, parsed from numbers or ISO-8601 text
//! - `Bucket` - Fixed-width downsampling window (`"1 hour"`, `"15 minutes"`, `"30s"`)
//! - `TimeFormat` - How timestamps are rendered in query rows

use crate::{Error, Result, Value};
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A point in time as Unix epoch milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// The current wall-clock time
    pub fn now() -> Self {
        Self(Utc::now().timestamp_millis())
    }

    /// Get the raw millisecond value
    pub fn millis(&self) -> i64 {
        self.0
    }

    /// Parse ISO-8601 / RFC 3339 text or a millisecond count
    ///
    /// Text without an offset is taken as UTC; a bare date is midnight UTC.
    pub fn parse_str(text: &str) -> Option<Self> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        if let Ok(ms) = text.parse::<i64>() {
            return Some(Self(ms));
        }
        if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
            return Some(Self(dt.timestamp_millis()));
        }
        for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
            if let Ok(naive) = NaiveDateTime::parse_from_str(text, fmt) {
                return Some(Self(naive.and_utc().timestamp_millis()));
            }
        }
        NaiveDate::parse_from_str(text, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|naive| Self(naive.and_utc().timestamp_millis()))
    }

    /// Parse a timestamp carried in a dynamic value
    pub fn from_value(value: &Value) -> Result<Self> {
        let parsed = match value {
            Value::Int(ms) => Some(Self(*ms)),
            Value::Float(ms) if ms.is_finite() => Some(Self(*ms as i64)),
            Value::String(s) => Self::parse_str(s),
            _ => None,
        };
        parsed.ok_or_else(|| Error::InvalidTimestamp(value.to_string()))
    }

    /// ISO-8601 text with millisecond precision, e.g. `2024-01-01T00:00:00.000Z`
    pub fn to_iso(&self) -> String {
        DateTime::<Utc>::from_timestamp_millis(self.0)
            .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
            .unwrap_or_else(|| self.0.to_string())
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_iso())
    }
}

/// Parse an inclusive `[start, end]` range
pub fn parse_range(start: &Value, end: &Value) -> Result<(Timestamp, Timestamp)> {
    let invalid = || Error::InvalidTimeRange(format!("{} .. {}", start, end));
    let start_ts = Timestamp::from_value(start).map_err(|_| invalid())?;
    let end_ts = Timestamp::from_value(end).map_err(|_| invalid())?;
    if start_ts > end_ts {
        return Err(invalid());
    }
    Ok((start_ts, end_ts))
}

/// A fixed-width time bucket anchored at the Unix epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bucket {
    width_ms: i64,
}

impl Bucket {
    /// Create a bucket of the given width; zero or negative widths are rejected
    pub fn from_millis(width_ms: i64) -> Option<Self> {
        (width_ms > 0).then_some(Self { width_ms })
    }

    /// Bucket width in milliseconds
    pub fn width_ms(&self) -> i64 {
        self.width_ms
    }

    /// Parse text like `"1 hour"`, `"15 minutes"`, `"30s"` or `"1h"`
    pub fn parse(text: &str) -> Result<Self> {
        let invalid = || Error::InvalidBucket(text.to_string());
        let lowered = text.trim().to_ascii_lowercase();
        let split = lowered
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(invalid)?;
        let (count, unit) = lowered.split_at(split);
        let count: i64 = count.parse().map_err(|_| invalid())?;
        let unit_ms = match unit.trim() {
            "ms" | "msec" | "millisecond" | "milliseconds" => 1,
            "s" | "sec" | "secs" | "second" | "seconds" => 1_000,
            "m" | "min" | "mins" | "minute" | "minutes" => 60_000,
            "h" | "hr" | "hrs" | "hour" | "hours" => 3_600_000,
            "d" | "day" | "days" => 86_400_000,
            "w" | "week" | "weeks" => 604_800_000,
            _ => return Err(invalid()),
        };
        count
            .checked_mul(unit_ms)
            .and_then(Self::from_millis)
            .ok_or_else(invalid)
    }

    /// The start of the bucket containing `ts`
    ///
    /// Clamped to `i64::MIN` for the partial bucket at the bottom of the range.
    pub fn start_of(&self, ts: Timestamp) -> Timestamp {
        Timestamp(ts.0.saturating_sub(ts.0.rem_euclid(self.width_ms)))
    }
}

/// Timestamp rendering in historian query rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TimeFormat {
    /// Unix epoch milliseconds
    #[default]
    EpochMs,
    /// ISO-8601 text
    Iso,
}

impl TimeFormat {
    pub fn render(&self, ts: Timestamp) -> Value {
        match self {
            TimeFormat::EpochMs => Value::Int(ts.0),
            TimeFormat::Iso => Value::String(ts.to_iso()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timestamps() {
        assert_eq!(Timestamp::parse_str("1700000000000"), Some(Timestamp(1_700_000_000_000)));
        assert_eq!(Timestamp::parse_str("1970-01-01T00:00:01Z"), Some(Timestamp(1_000)));
        assert_eq!(Timestamp::parse_str("1970-01-01T01:00:00+01:00"), Some(Timestamp(0)));
        assert_eq!(Timestamp::parse_str("1970-01-02"), Some(Timestamp(86_400_000)));
        assert_eq!(Timestamp::parse_str("1970-01-01T00:00:02.5"), Some(Timestamp(2_500)));
        assert_eq!(Timestamp::parse_str("yesterday"), None);
    }

    #[test]
    fn test_from_value() {
        assert_eq!(Timestamp::from_value(&Value::Int(5)).unwrap(), Timestamp(5));
        assert!(matches!(
            Timestamp::from_value(&Value::Bool(true)),
            Err(Error::InvalidTimestamp(_))
        ));
    }

    #[test]
    fn test_iso_rendering() {
        assert_eq!(Timestamp(0).to_iso(), "1970-01-01T00:00:00.000Z");
        assert_eq!(TimeFormat::Iso.render(Timestamp(1_500)), Value::from("1970-01-01T00:00:01.500Z"));
        assert_eq!(TimeFormat::EpochMs.render(Timestamp(1_500)), Value::Int(1_500));
    }

    #[test]
    fn test_range() {
        let (start, end) = parse_range(&"1970-01-01".into(), &Value::Int(10)).unwrap();
        assert_eq!((start.0, end.0), (0, 10));
        assert!(matches!(
            parse_range(&Value::Int(10), &Value::Int(0)),
            Err(Error::InvalidTimeRange(_))
        ));
        assert!(matches!(
            parse_range(&"soon".into(), &Value::Int(0)),
            Err(Error::InvalidTimeRange(_))
        ));
    }

    #[test]
    fn test_bucket_parse() {
        assert_eq!(Bucket::parse("1 hour").unwrap().width_ms(), 3_600_000);
        assert_eq!(Bucket::parse("15 minutes").unwrap().width_ms(), 900_000);
        assert_eq!(Bucket::parse("30s").unwrap().width_ms(), 30_000);
        assert_eq!(Bucket::parse("1h").unwrap().width_ms(), 3_600_000);
        assert_eq!(Bucket::parse(" 2 Days ").unwrap().width_ms(), 172_800_000);
        for bad in ["hour", "0 hours", "5 fortnights", "", "1.5h"] {
            assert!(matches!(Bucket::parse(bad), Err(Error::InvalidBucket(_))), "{bad}");
        }
    }

    #[test]
    fn test_bucket_start() {
        let hour = Bucket::parse("1 hour").unwrap();
        assert_eq!(hour.start_of(Timestamp(3_600_000 + 59_000)), Timestamp(3_600_000));
        assert_eq!(hour.start_of(Timestamp(-1)), Timestamp(-3_600_000));

        assert_eq!(hour.start_of(Timestamp(i64::MIN)), Timestamp(i64::MIN));
        assert_eq!(hour.start_of(Timestamp(i64::MIN + 1)), Timestamp(i64::MIN));
        let top = hour.start_of(Timestamp(i64::MAX));
        assert!(top.0 <= i64::MAX && i64::MAX - top.0 < 3_600_000);
    }
}
