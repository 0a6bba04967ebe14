//! Conversion between native items and DynamoDB attribute values.
//!
//! Pure functions, testable without DynamoDB access. Both the DynamoDB store
//! and the in-memory store run every item through these, so the fake sees
//! exactly the values the real table would return.

use std::collections::HashMap;

use aws_sdk_dynamodb::types::AttributeValue;
use serde_json::{Number, Value};

use probstore_core::storage::{Item, RepositoryError, Result};

/// Wire representation of an item.
pub type AttributeMap = HashMap<String, AttributeValue>;

// ============================================================================
// Native -> wire
// ============================================================================

/// Converts an item into an attribute map, omitting null attributes.
pub fn to_attribute_map(item: &Item) -> AttributeMap {
    item.iter()
        .filter_map(|(name, value)| to_attribute_value(value).map(|av| (name.clone(), av)))
        .collect()
}

/// Converts a single value. Returns `None` for `null`, which is never written
/// as an attribute.
pub fn to_attribute_value(value: &Value) -> Option<AttributeValue> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(AttributeValue::Bool(*b)),
        Value::Number(n) => Some(AttributeValue::N(n.to_string())),
        Value::String(s) => Some(AttributeValue::S(s.clone())),
        // List positions are significant, so null elements survive as NULL.
        Value::Array(values) => Some(AttributeValue::L(
            values
                .iter()
                .map(|v| to_attribute_value(v).unwrap_or(AttributeValue::Null(true)))
                .collect(),
        )),
        Value::Object(map) => Some(AttributeValue::M(to_attribute_map(map))),
    }
}

/// Converts an expression value placeholder, where `null` must stay explicit.
pub fn to_expression_value(value: &Value) -> AttributeValue {
    to_attribute_value(value).unwrap_or(AttributeValue::Null(true))
}

// ============================================================================
// Wire -> native
// ============================================================================

/// Converts an attribute map back into an item.
pub fn from_attribute_map(map: &AttributeMap) -> Result<Item> {
    map.iter()
        .map(|(name, av)| Ok((name.clone(), from_attribute_value(av)?)))
        .collect()
}

/// Converts a single attribute value.
pub fn from_attribute_value(av: &AttributeValue) -> Result<Value> {
    Ok(match av {
        AttributeValue::S(s) => Value::String(s.clone()),
        AttributeValue::N(n) => parse_number(n)?,
        AttributeValue::Bool(b) => Value::Bool(*b),
        AttributeValue::Null(_) => Value::Null,
        AttributeValue::L(values) => Value::Array(
            values
                .iter()
                .map(from_attribute_value)
                .collect::<Result<Vec<_>>>()?,
        ),
        AttributeValue::M(map) => Value::Object(from_attribute_map(map)?),
        AttributeValue::Ss(values) => {
            Value::Array(values.iter().cloned().map(Value::String).collect())
        }
        AttributeValue::Ns(values) => Value::Array(
            values
                .iter()
                .map(|n| parse_number(n))
                .collect::<Result<Vec<_>>>()?,
        ),
        other => {
            return Err(RepositoryError::InvalidData(format!(
                "Unsupported attribute type: {:?}",
                other
            )))
        }
    })
}

/// Parses a wire number: integral values become integers, anything else a
/// float.
pub fn parse_number(raw: &str) -> Result<Value> {
    if let Ok(i) = raw.parse::<i64>() {
        return Ok(Value::from(i));
    }
    if let Ok(u) = raw.parse::<u64>() {
        return Ok(Value::from(u));
    }

    let f: f64 = raw
        .parse()
        .map_err(|_| RepositoryError::InvalidData(format!("Invalid number attribute: {}", raw)))?;

    if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        return Ok(Value::from(f as i64));
    }

    Number::from_f64(f)
        .map(Value::Number)
        .ok_or_else(|| RepositoryError::InvalidData(format!("Non-finite number: {}", raw)))
}

/// Marshals and unmarshals an item, normalizing it the way a write followed
/// by a read from the table would.
pub fn normalize(item: &Item) -> Result<Item> {
    from_attribute_map(&to_attribute_map(item))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn item(value: Value) -> Item {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_null_attributes_are_omitted() {
        let map = to_attribute_map(&item(json!({"a": 1, "b": null, "m": {"c": null}})));
        assert_eq!(map.len(), 2);
        assert!(!map.contains_key("b"));
        assert_eq!(map["m"], AttributeValue::M(HashMap::new()));
    }

    #[test]
    fn test_null_list_elements_are_kept() {
        let av = to_attribute_value(&json!([1, null, "x"])).unwrap();
        assert_eq!(
            av,
            AttributeValue::L(vec![
                AttributeValue::N("1".to_string()),
                AttributeValue::Null(true),
                AttributeValue::S("x".to_string()),
            ])
        );
        assert_eq!(from_attribute_value(&av).unwrap(), json!([1, null, "x"]));
    }

    #[test]
    fn test_empty_string_is_written() {
        let map = to_attribute_map(&item(json!({"o": ""})));
        assert_eq!(map["o"], AttributeValue::S(String::new()));
    }

    #[test]
    fn test_number_parsing() {
        assert_eq!(parse_number("3").unwrap(), json!(3));
        assert_eq!(parse_number("-12").unwrap(), json!(-12));
        assert_eq!(parse_number("3.0").unwrap(), json!(3));
        assert_eq!(parse_number("1e3").unwrap(), json!(1000));
        assert_eq!(parse_number("2.5").unwrap(), json!(2.5));
        assert_eq!(parse_number("18446744073709551615").unwrap(), json!(u64::MAX));
        assert!(parse_number("abc").is_err());
    }

    #[test]
    fn test_float_round_trip() {
        let original = item(json!({"pct": 0.1, "n": 42, "neg": -7.25}));
        assert_eq!(normalize(&original).unwrap(), original);
    }

    #[test]
    fn test_sets_read_back_as_lists() {
        let ss = AttributeValue::Ss(vec!["a".to_string(), "b".to_string()]);
        let ns = AttributeValue::Ns(vec!["1".to_string(), "1.5".to_string()]);
        assert_eq!(from_attribute_value(&ss).unwrap(), json!(["a", "b"]));
        assert_eq!(from_attribute_value(&ns).unwrap(), json!([1, 1.5]));
    }

    #[test]
    fn test_nested_envelope_round_trip() {
        let original = item(json!({
            "PK": "PROB#baekjoon#1000",
            "SK": "META",
            "tp": "problem",
            "dat": {"ti": "A+B", "tg": ["math", "io"], "md": {"k": true}, "v": 1},
            "crt": 1_700_000_000,
            "upd": 1_700_000_000
        }));
        assert_eq!(normalize(&original).unwrap(), original);
    }
}
