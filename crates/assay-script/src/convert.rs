//! Value <-> Dynamic conversion
//!
//! Every crossing of the sandbox boundary goes through these functions, so
//! the script never holds a reference into host data and the host never
//! keeps a reference into the script's heap.

use assay_core::{Value, ValueMap};
use rhai::{Array, Dynamic, Map};

/// Deep-copy a host value into the engine
pub fn to_dynamic(value: &Value) -> Dynamic {
    match value {
        Value::Null => Dynamic::UNIT,
        Value::Bool(b) => Dynamic::from_bool(*b),
        Value::Int(i) => Dynamic::from_int(*i),
        Value::Float(f) => Dynamic::from_float(*f),
        Value::String(s) => Dynamic::from(s.clone()),
        Value::List(list) => Dynamic::from_array(list.iter().map(to_dynamic).collect::<Array>()),
        Value::Map(map) => Dynamic::from_map(
            map.iter()
                .map(|(k, v)| (k.as_str().into(), to_dynamic(v)))
                .collect::<Map>(),
        ),
    }
}

/// Deep-copy a script value back into the host
///
/// Values with no host counterpart (function pointers, timestamps, custom
/// types) come back as their display text.
pub fn from_dynamic(value: Dynamic) -> Value {
    if value.is_unit() {
        return Value::Null;
    }
    if let Ok(b) = value.as_bool() {
        return Value::Bool(b);
    }
    if let Ok(i) = value.as_int() {
        return Value::Int(i);
    }
    if let Ok(f) = value.as_float() {
        return Value::Float(f);
    }
    if let Ok(c) = value.as_char() {
        return Value::String(c.to_string());
    }
    if value.is_string() {
        return value.into_string().map(Value::String).unwrap_or_default();
    }
    if value.is_array() {
        return value
            .into_array()
            .map(|items| Value::List(items.into_iter().map(from_dynamic).collect()))
            .unwrap_or_default();
    }
    if value.is_map() {
        return value
            .try_cast::<Map>()
            .map(|map| {
                Value::Map(
                    map.into_iter()
                        .map(|(k, v)| (k.to_string(), from_dynamic(v)))
                        .collect::<ValueMap>(),
                )
            })
            .unwrap_or_default();
    }
    Value::String(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_values_cross_both_ways() {
        let value = Value::parse_json(r#"{"a":[1,2.5,"x",null,true],"b":{"c":{}}}"#).unwrap();
        let back = from_dynamic(to_dynamic(&value));
        assert_eq!(back.get("a"), value.get("a"));
        assert_eq!(back.get("b"), value.get("b"));
    }

    #[test]
    fn test_char_becomes_string() {
        assert_eq!(from_dynamic(Dynamic::from('z')), Value::from("z"));
    }
}
