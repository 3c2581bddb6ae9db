//! Field values.
//!
//! Records, remote payloads and mapper output all share one shape: a JSON
//! object keyed by field name.

use crate::types::RecordId;
use serde_json::Value;

/// A set of field values keyed by field name.
pub type Values = serde_json::Map<String, Value>;

/// Turns a JSON object into values. Anything else yields an empty map.
pub fn object(value: Value) -> Values {
    match value {
        Value::Object(map) => map,
        _ => Values::new(),
    }
}

/// Copies every entry of `from` into `into`, replacing existing keys.
pub fn merge(into: &mut Values, from: Values) {
    for (key, value) in from {
        into.insert(key, value);
    }
}

/// Returns true when a value counts as set.
///
/// `null`, `false`, `0`, empty strings and empty collections are unset.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Returns the field as a string slice when it holds a string.
pub fn get_str<'a>(values: &'a Values, key: &str) -> Option<&'a str> {
    values.get(key).and_then(Value::as_str)
}

/// Returns the field when it holds a value that counts as set.
pub fn get_set<'a>(values: &'a Values, key: &str) -> Option<&'a Value> {
    values.get(key).filter(|value| is_truthy(value))
}

/// Reads a reference to another record stored in a field.
pub fn get_record_id(values: &Values, key: &str) -> Option<RecordId> {
    values
        .get(key)
        .and_then(Value::as_u64)
        .filter(|id| *id != 0)
        .map(RecordId::new)
}

/// Converts a record id into a field value.
pub fn record_value(id: RecordId) -> Value {
    Value::from(id.as_u64())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn values(value: Value) -> Values {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn truthiness() {
        assert!(!is_truthy(&json!(null)));
        assert!(!is_truthy(&json!(false)));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!("")));
        assert!(!is_truthy(&json!([])));
        assert!(is_truthy(&json!("x")));
        assert!(is_truthy(&json!(0.5)));
    }

    #[test]
    fn merge_overrides() {
        let mut base = values(json!({"a": 1, "b": 2}));
        merge(&mut base, values(json!({"b": 3, "c": 4})));
        assert_eq!(Value::Object(base), json!({"a": 1, "b": 3, "c": 4}));
    }

    #[test]
    fn record_references() {
        let v = values(json!({"parent_id": 12, "none": 0, "text": "x"}));
        assert_eq!(get_record_id(&v, "parent_id"), Some(RecordId::new(12)));
        assert_eq!(get_record_id(&v, "none"), None);
        assert_eq!(get_record_id(&v, "text"), None);
        assert_eq!(get_str(&v, "text"), Some("x"));
        assert!(get_set(&v, "none").is_none());
    }
}
