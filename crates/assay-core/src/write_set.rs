//! Write records declared by a script
//!
//! A script returns either a plain value or an envelope
//! `{ result: ..., writes: [...] }`. Each entry of `writes` is one of three
//! shapes, told apart by its `target` field:
//!
//! | `target`           | shape                                        |
//! |--------------------|----------------------------------------------|
//! | absent             | `{path, value}` attribute write              |
//! | `"historian"`      | `{path, value, ts?}` time-series write       |
//! | `"historianQuery"` | `{paths, start, end, bucket?, format?/iso?}` |
//!
//! Records are parsed into the closed [`Write`] enum up front; the hub
//! applies them with a single match.

use crate::time::{parse_range, Bucket, TimeFormat, Timestamp};
use crate::{Error, Result, Value, ValueMap};

/// A time-series range read whose rows replace the script result
#[derive(Debug, Clone, PartialEq)]
pub struct HistorianQuery {
    pub paths: Vec<String>,
    pub start: Timestamp,
    pub end: Timestamp,
    pub bucket: Option<Bucket>,
    pub format: TimeFormat,
}

/// One write record, already validated
#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    /// Upsert an attribute's live value
    Attribute {
        path: String,
        value: Value,
    },
    /// Upsert a historian point and the attribute's live value
    Historian {
        path: String,
        value: Value,
        /// `None` means now
        ts: Option<Timestamp>,
    },
    /// Read points for several paths
    HistorianQuery(HistorianQuery),
}

impl Write {
    /// The path a mutation targets; queries have none
    pub fn mutation_path(&self) -> Option<&str> {
        match self {
            Write::Attribute { path, .. } | Write::Historian { path, .. } => Some(path),
            Write::HistorianQuery(_) => None,
        }
    }

    /// Parse one record
    pub fn from_value(record: &Value) -> Result<Self> {
        let map = record
            .as_map()
            .ok_or_else(|| Error::ParseError(format!("write record must be an object, got {}", record)))?;

        match map.get("target") {
            None | Some(Value::Null) => Ok(Write::Attribute {
                path: required_path(map)?,
                value: map.get("value").cloned().unwrap_or_default(),
            }),
            Some(Value::String(t)) if t == "historian" => {
                let ts = match map.get("ts") {
                    None | Some(Value::Null) => None,
                    Some(raw) => Some(Timestamp::from_value(raw)?),
                };
                Ok(Write::Historian {
                    path: required_path(map)?,
                    value: map.get("value").cloned().unwrap_or_default(),
                    ts,
                })
            }
            Some(Value::String(t)) if t == "historianQuery" => {
                parse_query(map).map(Write::HistorianQuery)
            }
            Some(other) => Err(Error::ParseError(format!("unknown write target {}", other))),
        }
    }
}

fn required_path(map: &ValueMap) -> Result<String> {
    match map.get("path") {
        Some(Value::String(p)) if !p.trim().is_empty() => Ok(p.clone()),
        _ => Err(Error::ParseError("write record requires a path".to_string())),
    }
}

fn parse_query(map: &ValueMap) -> Result<HistorianQuery> {
    let paths = match map.get("paths") {
        Some(Value::String(p)) => vec![p.clone()],
        Some(Value::List(items)) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| Error::ParseError(format!("query path must be a string, got {}", item)))
            })
            .collect::<Result<Vec<_>>>()?,
        _ => return Err(Error::ParseError("historian query requires paths".to_string())),
    };

    let null = Value::Null;
    let (start, end) = parse_range(
        map.get("start").unwrap_or(&null),
        map.get("end").unwrap_or(&null),
    )?;

    let bucket = match map.get("bucket") {
        None | Some(Value::Null) => None,
        Some(Value::String(text)) if text.trim().is_empty() => None,
        Some(Value::String(text)) => Some(Bucket::parse(text)?),
        Some(other) => return Err(Error::InvalidBucket(other.to_string())),
    };

    let iso_flag = map.get("iso").and_then(Value::as_bool).unwrap_or(false);
    let format = match map.get("format") {
        None | Some(Value::Null) => TimeFormat::EpochMs,
        Some(Value::String(f)) if f.eq_ignore_ascii_case("iso") => TimeFormat::Iso,
        Some(Value::String(f)) if matches!(f.to_ascii_lowercase().as_str(), "ms" | "epoch" | "epochms") => {
            TimeFormat::EpochMs
        }
        Some(other) => return Err(Error::ParseError(format!("unknown time format {}", other))),
    };
    let format = if iso_flag { TimeFormat::Iso } else { format };

    Ok(HistorianQuery {
        paths,
        start,
        end,
        bucket,
        format,
    })
}

/// The ordered write records of one run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteSet {
    writes: Vec<Write>,
}

impl WriteSet {
    /// Create a new empty WriteSet
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a `writes` list; `null` is an empty set
    pub fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Null => Ok(Self::new()),
            Value::List(records) => records
                .iter()
                .map(Write::from_value)
                .collect::<Result<Vec<_>>>()
                .map(|writes| Self { writes }),
            other => Err(Error::ParseError(format!("writes must be a list, got {}", other))),
        }
    }

    /// Add a write to the set
    pub fn push(&mut self, write: Write) {
        self.writes.push(write);
    }

    /// Get the number of writes
    pub fn len(&self) -> usize {
        self.writes.len()
    }

    /// Check if the WriteSet is empty
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Get an iterator over the writes
    pub fn iter(&self) -> impl Iterator<Item = &Write> {
        self.writes.iter()
    }

    /// Consume the WriteSet and return the underlying writes
    pub fn into_writes(self) -> Vec<Write> {
        self.writes
    }

    /// Whether any historian query is present
    pub fn has_queries(&self) -> bool {
        self.writes
            .iter()
            .any(|w| matches!(w, Write::HistorianQuery(_)))
    }
}

/// What a script handed back: its result plus declared writes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScriptOutput {
    pub result: Value,
    pub writes: WriteSet,
}

impl ScriptOutput {
    /// Split a script's return value
    ///
    /// A map with a `result` or `writes` key is an envelope; any other
    /// value is the result itself.
    pub fn from_return(value: Value) -> Result<Self> {
        match value {
            Value::Map(mut map) if map.contains_key("result") || map.contains_key("writes") => {
                let writes = match map.shift_remove("writes") {
                    Some(writes) => WriteSet::from_value(&writes)?,
                    None => WriteSet::new(),
                };
                Ok(Self {
                    result: map.shift_remove("result").unwrap_or_default(),
                    writes,
                })
            }
            other => Ok(Self {
                result: other,
                writes: WriteSet::new(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn json(text: &str) -> Value {
        Value::parse_json(text).unwrap()
    }

    #[test]
    fn test_attribute_record() {
        let write = Write::from_value(&json(r#"{"path":"A.B.x","value":1}"#)).unwrap();
        assert_eq!(
            write,
            Write::Attribute {
                path: "A.B.x".into(),
                value: Value::Int(1)
            }
        );
        assert_eq!(write.mutation_path(), Some("A.B.x"));
    }

    #[test]
    fn test_historian_record() {
        let write = Write::from_value(&json(
            r#"{"target":"historian","path":"A.x","value":2.5,"ts":"1970-01-01T00:00:01Z"}"#,
        ))
        .unwrap();
        assert_eq!(
            write,
            Write::Historian {
                path: "A.x".into(),
                value: Value::Float(2.5),
                ts: Some(Timestamp(1_000)),
            }
        );

        let err = Write::from_value(&json(r#"{"target":"historian","path":"A.x","ts":"later"}"#))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTimestamp(_)));
    }

    #[test]
    fn test_query_record() {
        let write = Write::from_value(&json(
            r#"{"target":"historianQuery","paths":["A.x","A.y"],"start":0,"end":"1970-01-02","bucket":"1 hour","iso":true}"#,
        ))
        .unwrap();
        match write {
            Write::HistorianQuery(q) => {
                assert_eq!(q.paths, vec!["A.x", "A.y"]);
                assert_eq!(q.end, Timestamp(86_400_000));
                assert_eq!(q.bucket.map(|b| b.width_ms()), Some(3_600_000));
                assert_eq!(q.format, TimeFormat::Iso);
            }
            other => panic!("unexpected write {:?}", other),
        }
    }

    #[test]
    fn test_query_errors() {
        let reversed = json(r#"{"target":"historianQuery","paths":["A.x"],"start":10,"end":0}"#);
        assert!(matches!(Write::from_value(&reversed), Err(Error::InvalidTimeRange(_))));

        let bad_bucket =
            json(r#"{"target":"historianQuery","paths":["A.x"],"start":0,"end":1,"bucket":"often"}"#);
        assert!(matches!(Write::from_value(&bad_bucket), Err(Error::InvalidBucket(_))));
    }

    #[test]
    fn test_malformed_records() {
        assert!(matches!(
            Write::from_value(&json(r#"{"target":"mqtt","path":"A.x"}"#)),
            Err(Error::ParseError(_))
        ));
        assert!(matches!(Write::from_value(&json("42")), Err(Error::ParseError(_))));
        assert!(matches!(
            Write::from_value(&json(r#"{"value":1}"#)),
            Err(Error::ParseError(_))
        ));
        assert!(matches!(WriteSet::from_value(&json("{}")), Err(Error::ParseError(_))));
    }

    #[test]
    fn test_envelope_split() {
        let output = ScriptOutput::from_return(json(
            r#"{"result":{"ok":true},"writes":[{"path":"A.x","value":1}]}"#,
        ))
        .unwrap();
        assert_eq!(output.result, json(r#"{"ok":true}"#));
        assert_eq!(output.writes.len(), 1);
        assert!(!output.writes.has_queries());

        let plain = ScriptOutput::from_return(json(r#"{"ok":true}"#)).unwrap();
        assert_eq!(plain.result, json(r#"{"ok":true}"#));
        assert!(plain.writes.is_empty());

        let writes_only = ScriptOutput::from_return(json(r#"{"writes":[]}"#)).unwrap();
        assert_eq!(writes_only.result, Value::Null);
    }
}
