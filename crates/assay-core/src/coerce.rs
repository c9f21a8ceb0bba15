//! Value coercion by declared type
//!
//! Two entry points share one set of rules:
//! - [`coerce_constant`] for constant bindings (`InvalidBinding` on failure)
//! - [`coerce_attribute_value`] for values headed into an attribute or the
//!   historian (`ParseError` on failure)
//!
//! Coercion is idempotent: feeding a coerced value back in yields the same
//! value.

use crate::binding::ConstantType;
use crate::{DataType, Error, Result, Value};

/// Parse a number from a dynamic value
///
/// Integers stay integers. Text is trimmed; empty text is zero. Non-finite
/// results are rejected.
fn to_number(raw: &Value) -> Option<Value> {
    match raw {
        Value::Int(i) => Some(Value::Int(*i)),
        Value::Float(f) if f.is_finite() => Some(Value::Float(*f)),
        Value::Float(_) => None,
        Value::Bool(b) => Some(Value::Int(*b as i64)),
        Value::Null => Some(Value::Int(0)),
        Value::String(s) => {
            let text = s.trim();
            if text.is_empty() {
                return Some(Value::Int(0));
            }
            if let Ok(i) = text.parse::<i64>() {
                return Some(Value::Int(i));
            }
            text.parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .map(Value::Float)
        }
        Value::List(_) | Value::Map(_) => None,
    }
}

fn to_bool(raw: &Value) -> Option<bool> {
    match raw {
        Value::Bool(b) => Some(*b),
        Value::String(s) if s.eq_ignore_ascii_case("true") => Some(true),
        Value::String(s) if s.eq_ignore_ascii_case("false") => Some(false),
        _ => None,
    }
}

/// Render a value as text; lists and maps become JSON text
pub fn to_text(raw: &Value) -> String {
    match raw {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::String(s) => s.clone(),
        Value::List(_) | Value::Map(_) => raw.to_json().to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Shape {
    Any,
    List,
    Map,
}

enum ShapeError {
    Json,
    Shape,
}

fn to_shaped(raw: &Value, shape: Shape) -> std::result::Result<Value, ShapeError> {
    let value = match raw {
        Value::String(s) => Value::parse_json(s).ok_or(ShapeError::Json)?,
        other => other.clone(),
    };
    match (shape, &value) {
        (Shape::Any, _) | (Shape::List, Value::List(_)) | (Shape::Map, Value::Map(_)) => Ok(value),
        _ => Err(ShapeError::Shape),
    }
}

/// Coerce a constant binding's raw value by its declared constant type
pub fn coerce_constant(name: &str, constant_type: ConstantType, raw: &Value) -> Result<Value> {
    match constant_type {
        ConstantType::Number => to_number(raw)
            .ok_or_else(|| Error::InvalidBinding(format!("Invalid number constant for {}", name))),
        ConstantType::Boolean => to_bool(raw)
            .map(Value::Bool)
            .ok_or_else(|| Error::InvalidBinding(format!("Invalid boolean constant for {}", name))),
        ConstantType::Array | ConstantType::Object => {
            let shape = if constant_type == ConstantType::Array {
                Shape::List
            } else {
                Shape::Map
            };
            to_shaped(raw, shape)
                .map_err(|_| Error::InvalidBinding(format!("Invalid JSON constant for {}", name)))
        }
        ConstantType::String => Ok(Value::String(to_text(raw))),
    }
}

/// Coerce a value by a template item's data type
///
/// `null` and the empty string clear the attribute.
pub fn coerce_attribute_value(data_type: DataType, raw: &Value) -> Result<Value> {
    if raw.is_null() || raw.as_str() == Some("") {
        return Ok(Value::Null);
    }
    match data_type {
        DataType::Json | DataType::Array | DataType::Object => {
            let shape = match data_type {
                DataType::Array => Shape::List,
                DataType::Object => Shape::Map,
                _ => Shape::Any,
            };
            to_shaped(raw, shape).map_err(|e| match (e, shape) {
                (ShapeError::Shape, Shape::List) => Error::ParseError("Value must be an array".into()),
                (ShapeError::Shape, _) => Error::ParseError("Value must be an object".into()),
                (ShapeError::Json, _) => Error::ParseError("Invalid JSON value".into()),
            })
        }
        DataType::Number => {
            to_number(raw).ok_or_else(|| Error::ParseError("Value must be a number".into()))
        }
        DataType::Boolean => to_bool(raw)
            .map(Value::Bool)
            .ok_or_else(|| Error::ParseError("Value must be boolean".into())),
        DataType::String => Ok(Value::String(to_text(raw))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_constant() {
        assert_eq!(
            coerce_constant("k", ConstantType::Number, &"7.2".into()).unwrap(),
            Value::Float(7.2)
        );
        assert_eq!(
            coerce_constant("k", ConstantType::Number, &"".into()).unwrap(),
            Value::Int(0)
        );
        let err = coerce_constant("k", ConstantType::Number, &"seven".into()).unwrap_err();
        assert_eq!(err.to_string(), "Invalid number constant for k");
    }

    #[test]
    fn test_boolean_constant() {
        assert_eq!(
            coerce_constant("b", ConstantType::Boolean, &"TRUE".into()).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            coerce_constant("b", ConstantType::Boolean, &Value::Bool(false)).unwrap(),
            Value::Bool(false)
        );
        assert!(coerce_constant("b", ConstantType::Boolean, &"yes".into()).is_err());
    }

    #[test]
    fn test_json_constant_shape() {
        let list = coerce_constant("a", ConstantType::Array, &"[1,2]".into()).unwrap();
        assert_eq!(list, Value::List(vec![Value::Int(1), Value::Int(2)]));
        let err = coerce_constant("o", ConstantType::Object, &"[1,2]".into()).unwrap_err();
        assert_eq!(err.to_string(), "Invalid JSON constant for o");
        assert!(coerce_constant("o", ConstantType::Object, &"{not json".into()).is_err());
    }

    #[test]
    fn test_string_constant_stringifies() {
        assert_eq!(
            coerce_constant("s", ConstantType::String, &Value::Float(7.5)).unwrap(),
            Value::from("7.5")
        );
    }

    #[test]
    fn test_attribute_value_clears_on_empty() {
        assert_eq!(coerce_attribute_value(DataType::Number, &"".into()).unwrap(), Value::Null);
        assert_eq!(coerce_attribute_value(DataType::Object, &Value::Null).unwrap(), Value::Null);
    }

    #[test]
    fn test_attribute_value_errors() {
        let err = coerce_attribute_value(DataType::Number, &"abc".into()).unwrap_err();
        assert_eq!(err, Error::ParseError("Value must be a number".into()));
        let err = coerce_attribute_value(DataType::Array, &r#"{"a":1}"#.into()).unwrap_err();
        assert_eq!(err, Error::ParseError("Value must be an array".into()));
        let err = coerce_attribute_value(DataType::Json, &"{oops".into()).unwrap_err();
        assert_eq!(err, Error::ParseError("Invalid JSON value".into()));
    }

    #[test]
    fn test_string_attribute_renders_json() {
        let map = Value::parse_json(r#"{"a":1}"#).unwrap();
        assert_eq!(
            coerce_attribute_value(DataType::String, &map).unwrap(),
            Value::from(r#"{"a":1}"#)
        );
    }

    #[test]
    fn test_coercion_is_idempotent() {
        let samples = [
            (DataType::Number, Value::from("6.5")),
            (DataType::Number, Value::Int(80)),
            (DataType::Boolean, Value::from("False")),
            (DataType::Object, Value::from(r#"{"vendor":"acme"}"#)),
            (DataType::Array, Value::from("[1, 2, 3]")),
            (DataType::Json, Value::from("42")),
            (DataType::String, Value::Float(1.25)),
        ];
        for (data_type, raw) in samples {
            let once = coerce_attribute_value(data_type, &raw).unwrap();
            let twice = coerce_attribute_value(data_type, &once).unwrap();
            assert_eq!(once, twice, "{data_type} {raw}");
        }
    }
}
