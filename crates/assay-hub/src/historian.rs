//! Historian reads: bucketing, pivoting and aggregation

use crate::error::Result;
use crate::resolve::Resolver;
use assay_core::path::trailing_segment;
use assay_core::{
    Bucket, Error as CoreError, HistorianPoint, HistorianQuery, TimeFormat, Timestamp, Value,
    ValueMap,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// One column of a pivot: `(ts, value)` pairs ascending by time
pub type Series = Vec<(Timestamp, Value)>;

/// Keep the last value in each bucket, stamped with the bucket start
///
/// `points` must be ascending by time.
pub fn bucket_last(points: &[HistorianPoint], bucket: Bucket) -> Series {
    let mut buckets: BTreeMap<i64, Value> = BTreeMap::new();
    for point in points {
        let start = bucket.start_of(Timestamp(point.ts));
        buckets.insert(start.millis(), point.value.clone());
    }
    buckets
        .into_iter()
        .map(|(ts, value)| (Timestamp(ts), value))
        .collect()
}

/// Merge named series into rows keyed by time
///
/// Each row is `{ts, <column>: value, ...}`. A column with no point at a
/// timestamp is left out of that row.
pub fn pivot(columns: &[(String, Series)], format: TimeFormat) -> Vec<Value> {
    let mut rows: BTreeMap<i64, ValueMap> = BTreeMap::new();
    for (column, series) in columns {
        for (ts, value) in series {
            rows.entry(ts.millis())
                .or_insert_with(|| {
                    let mut row = ValueMap::new();
                    row.insert("ts".into(), format.render(*ts));
                    row
                })
                .insert(column.clone(), value.clone());
        }
    }
    rows.into_values().map(Value::Map).collect()
}

/// Run one historian query
///
/// Paths whose attribute has no row yet contribute no points.
pub fn run_query(resolver: &Resolver, query: &HistorianQuery) -> Result<Vec<Value>> {
    let mut columns = Vec::with_capacity(query.paths.len());
    for path in &query.paths {
        let tag = resolver.resolve_tag_path(path)?;
        let points = match tag.attribute_id {
            Some(attribute_id) => {
                resolver
                    .store()
                    .historian_range(attribute_id, query.start, query.end)?
            }
            None => Vec::new(),
        };
        let series = match query.bucket {
            Some(bucket) => bucket_last(&points, bucket),
            None => points
                .into_iter()
                .map(|p| (Timestamp(p.ts), p.value))
                .collect(),
        };
        columns.push((trailing_segment(path).to_string(), series));
    }
    Ok(pivot(&columns, query.format))
}

/// Aggregate function over a time range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregate {
    #[default]
    Avg,
    Min,
    Max,
    Sum,
    Count,
    First,
    Last,
}

impl Aggregate {
    pub fn as_str(&self) -> &'static str {
        match self {
            Aggregate::Avg => "avg",
            Aggregate::Min => "min",
            Aggregate::Max => "max",
            Aggregate::Sum => "sum",
            Aggregate::Count => "count",
            Aggregate::First => "first",
            Aggregate::Last => "last",
        }
    }

    /// Apply to points ascending by time
    ///
    /// Numbers and numeric text take part; other values are skipped, except
    /// by `count`, which counts every point. An empty input yields null, or
    /// zero for `count`.
    pub fn apply(&self, points: &[HistorianPoint]) -> Value {
        let numbers: Vec<f64> = points.iter().filter_map(|p| numeric(&p.value)).collect();
        let result = match self {
            Aggregate::Count => return Value::Int(points.len() as i64),
            _ if numbers.is_empty() => return Value::Null,
            Aggregate::Avg => numbers.iter().sum::<f64>() / numbers.len() as f64,
            Aggregate::Min => numbers.iter().copied().fold(f64::INFINITY, f64::min),
            Aggregate::Max => numbers.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Aggregate::Sum => numbers.iter().sum(),
            Aggregate::First => numbers[0],
            Aggregate::Last => numbers[numbers.len() - 1],
        };
        Value::Float(result)
    }
}

impl fmt::Display for Aggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Aggregate {
    type Err = CoreError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "avg" => Ok(Aggregate::Avg),
            "min" => Ok(Aggregate::Min),
            "max" => Ok(Aggregate::Max),
            "sum" => Ok(Aggregate::Sum),
            "count" => Ok(Aggregate::Count),
            "first" => Ok(Aggregate::First),
            "last" => Ok(Aggregate::Last),
            _ => Err(CoreError::ParseError(format!("Invalid agg '{}'", s))),
        }
    }
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Int(i) => Some(*i as f64),
        Value::Float(f) if f.is_finite() => Some(*f),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}
