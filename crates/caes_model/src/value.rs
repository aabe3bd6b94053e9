//! Dynamic field values and payloads.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A record payload: field name to value.
///
/// Field order carries no meaning; a `BTreeMap` keeps iteration stable for
/// logging and encoding.
pub type Payload = BTreeMap<String, Value>;

/// A dynamic field value.
///
/// This is the common denominator of what both stores can hold: the column
/// store's scalar and collection column types, and the JSON document model
/// of the search store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed integer.
    Integer(i64),
    /// Floating point number.
    Float(f64),
    /// Text string (UTF-8).
    Text(String),
    /// Ordered list of values.
    List(Vec<Value>),
    /// Nested map with string keys.
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Returns true if this is a null value.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the boolean value, if this is a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the integer value, if this is an integer.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the float value, if this is a float.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Returns the text value, if this is a text string.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the list items, if this is a list.
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Returns the nested map, if this is a map.
    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Converts to a JSON value.
    ///
    /// Non-finite floats have no JSON representation and become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Integer(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::List(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Map(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }

    /// Converts from a JSON value.
    ///
    /// Integers that fit in an `i64` stay integers; everything else numeric
    /// becomes a float.
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::Text(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => Value::Map(
                map.into_iter()
                    .map(|(k, v)| (k, Value::from_json(v)))
                    .collect(),
            ),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Null
    }
}

/// Builds a payload from `(field, value)` pairs.
///
/// ```
/// use caes_model::{payload_of, Value};
///
/// let payload = payload_of([("vint", Value::from(1)), ("vstring", Value::from("Hi"))]);
/// assert_eq!(payload["vint"], Value::Integer(1));
/// ```
pub fn payload_of<K, V, I>(pairs: I) -> Payload
where
    K: Into<String>,
    V: Into<Value>,
    I: IntoIterator<Item = (K, V)>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// Converts a JSON object into a payload.
pub fn payload_from_json(object: serde_json::Map<String, serde_json::Value>) -> Payload {
    object
        .into_iter()
        .map(|(k, v)| (k, Value::from_json(v)))
        .collect()
}

/// Converts a payload into a JSON object.
pub fn payload_to_json(payload: &Payload) -> serde_json::Map<String, serde_json::Value> {
    payload
        .iter()
        .map(|(k, v)| (k.clone(), v.to_json()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accessors() {
        assert!(Value::Null.is_null());
        assert_eq!(Value::from(true).as_bool(), Some(true));
        assert_eq!(Value::from(7).as_integer(), Some(7));
        assert_eq!(Value::from(1.5).as_float(), Some(1.5));
        assert_eq!(Value::from("hi").as_text(), Some("hi"));
        assert_eq!(Value::from(vec![1, 2]).as_list().map(<[Value]>::len), Some(2));
        assert!(Value::from("hi").as_integer().is_none());
    }

    #[test]
    fn json_keeps_integers_apart_from_floats() {
        let value = Value::from_json(json!({"vint": 1, "ratio": 0.5, "big": u64::MAX}));
        let map = value.as_map().unwrap();
        assert_eq!(map["vint"], Value::Integer(1));
        assert_eq!(map["ratio"], Value::Float(0.5));
        assert!(map["big"].as_float().is_some());
    }

    #[test]
    fn json_conversion_preserves_structure() {
        let original = json!({
            "vstring": "Hi",
            "tags": ["a", "b"],
            "nested": {"flag": true, "none": null}
        });
        let value = Value::from_json(original.clone());
        assert_eq!(value.to_json(), original);
    }

    #[test]
    fn non_finite_float_becomes_null() {
        assert_eq!(Value::Float(f64::NAN).to_json(), serde_json::Value::Null);
    }

    #[test]
    fn untagged_serde_matches_json_shape() {
        let payload = payload_of([("vint", Value::from(1)), ("vstring", Value::from("Hi"))]);
        let text = serde_json::to_string(&payload).unwrap();
        assert_eq!(text, r#"{"vint":1,"vstring":"Hi"}"#);

        let back: Payload = serde_json::from_str(&text).unwrap();
        assert_eq!(back, payload);
    }

    #[test]
    fn payload_json_helpers() {
        let payload = payload_of([("a", 1), ("b", 2)]);
        let object = payload_to_json(&payload);
        assert_eq!(object["a"], json!(1));
        assert_eq!(payload_from_json(object), payload);
    }
}
