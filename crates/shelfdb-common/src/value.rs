use std::{borrow::Cow, cmp::Ordering, collections::BTreeMap};

use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{Result, ShelfError};

/// Record value stored in an object store.
///
/// Variants
/// * Primitive types: Null, Bool, Int64, Float64, String, Binary
/// * Date: a UTC timestamp, orderable and usable as a key
/// * Collection types: Array, Object (document)
///
/// A field that is absent from an object is "undefined" and is modelled as
/// `None` by [`Value::get_path`], which keeps it distinct from `Value::Null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int64(i64),
    Float64(f64),
    String(String),
    Binary(Vec<u8>),
    Date(DateTime<Utc>),
    Array(Vec<Value>),
    Object(BTreeMap<String, Value>),
}

impl Value {
    /// Get the type name as a string
    ///
    /// # Example
    /// ```rust
    /// use shelfdb_common::Value;
    ///
    /// assert_eq!(Value::Int64(42).type_name(), "int64");
    /// assert_eq!(Value::from("Hello").type_name(), "string");
    /// ```
    pub fn type_name(&self) -> Cow<'_, str> {
        match self {
            Value::Null => Cow::Borrowed("null"),
            Value::Bool(_) => Cow::Borrowed("bool"),
            Value::Int64(_) => Cow::Borrowed("int64"),
            Value::Float64(_) => Cow::Borrowed("float64"),
            Value::String(_) => Cow::Borrowed("string"),
            Value::Binary(_) => Cow::Borrowed("binary"),
            Value::Date(_) => Cow::Borrowed("date"),
            Value::Array(_) => Cow::Borrowed("array"),
            Value::Object(_) => Cow::Borrowed("object"),
        }
    }

    /// Build an object value from `(field, value)` pairs.
    ///
    /// ```rust
    /// use shelfdb_common::Value;
    ///
    /// let person = Value::object([("id", Value::from(1)), ("name", Value::from("Ada"))]);
    /// assert_eq!(person.get_path("name"), Some(&Value::from("Ada")));
    /// ```
    pub fn object<K, I>(fields: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Object(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Convert Value to JSON representation
    ///
    /// Binary values are written as `"b64:<base64>"` and dates as RFC 3339
    /// strings.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int64(i) => serde_json::Value::Number((*i).into()),
            Value::Float64(f) => serde_json::Number::from_f64(*f)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Binary(b) => serde_json::Value::String(format!(
                "b64:{}",
                base64::engine::general_purpose::STANDARD.encode(b)
            )),
            Value::Date(dt) => serde_json::Value::String(dt.to_rfc3339()),
            Value::Array(arr) => serde_json::Value::Array(arr.iter().map(Value::to_json).collect()),
            Value::Object(obj) => serde_json::Value::Object(
                obj.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }

    /// Convert from JSON representation
    ///
    /// # Example
    /// ```rust
    /// use shelfdb_common::Value;
    /// use serde_json::json;
    ///
    /// let val = Value::from_json(json!({"id": 1, "tags": ["a"]}));
    /// assert_eq!(val.get_path("id"), Some(&Value::Int64(1)));
    /// ```
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int64(i)
                } else if let Some(f) = n.as_f64() {
                    Value::Float64(f)
                } else {
                    Value::Null
                }
            }
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(arr) => {
                Value::Array(arr.into_iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(k, v)| (k, Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Convert any serializable type into a record value.
    pub fn from_serializable<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        serde_json::to_value(value)
            .map(Value::from_json)
            .map_err(|e| ShelfError::InvalidOperation(format!("cannot serialize value: {e}")))
    }

    /// Deserialize this value into a typed structure.
    pub fn deserialize_into<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.to_json()).map_err(|e| {
            ShelfError::InvalidOperation(format!(
                "cannot deserialize {} value: {e}",
                self.type_name()
            ))
        })
    }

    /// Resolve a dotted field path.
    ///
    /// The empty path resolves to the value itself. Returns `None` when any
    /// step is missing or is not an object.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        if path.is_empty() {
            return Some(self);
        }
        path.split('.').try_fold(self, |current, segment| match current {
            Value::Object(map) => map.get(segment),
            _ => None,
        })
    }

    /// Write `value` at a dotted field path, creating intermediate objects.
    ///
    /// Returns `false` without modifying anything when a step along the path
    /// holds a non-object value.
    pub fn set_path(&mut self, path: &str, value: Value) -> bool {
        let segments: Vec<&str> = path.split('.').collect();
        let Some((last, parents)) = segments.split_last() else {
            return false;
        };

        let mut current = self;
        for segment in parents {
            let Value::Object(map) = current else {
                return false;
            };
            current = map
                .entry((*segment).to_string())
                .or_insert_with(|| Value::Object(BTreeMap::new()));
        }

        match current {
            Value::Object(map) => {
                map.insert((*last).to_string(), value);
                true
            }
            _ => false,
        }
    }

    /// Strict equality without type coercion.
    ///
    /// Integers and floats are both numbers, so `Int64(1)` equals
    /// `Float64(1.0)`; a string never equals a number. Collections compare
    /// structurally.
    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Array(a), Value::Array(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.strict_equals(y))
            }
            (Value::Object(a), Value::Object(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .zip(b)
                        .all(|((ka, va), (kb, vb))| ka == kb && va.strict_equals(vb))
            }
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => a == b,
                _ => self == other,
            },
        }
    }

    /// Relational comparison between two values of the same kind.
    ///
    /// Numbers, strings, dates, booleans and binaries are comparable among
    /// themselves. Any other pairing is incomparable and yields `None`.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
            (Value::Binary(a), Value::Binary(b)) => Some(a.cmp(b)),
            (Value::Int64(a), Value::Int64(b)) => Some(a.cmp(b)),
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => a.partial_cmp(&b),
                _ => None,
            },
        }
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Value::Int64(_) | Value::Float64(_))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view of `Int64` and `Float64` values.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int64(i) => Some(*i as f64),
            Value::Float64(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int64(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Vec<Value>> {
        match self {
            Value::Array(arr) => Some(arr),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int64(value as i64)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int64(value)
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Int64(value as i64)
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        if value <= i64::MAX as u64 {
            Value::Int64(value as i64)
        } else {
            Value::Float64(value as f64)
        }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float64(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Value::Date(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::Array(value)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(value: BTreeMap<String, Value>) -> Self {
        Value::Object(value)
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        Value::from_json(value)
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int64(i) => write!(f, "{}", i),
            Value::Float64(fl) => write!(f, "{}", fl),
            Value::String(s) => write!(f, "\"{}\"", s),
            Value::Binary(b) => write!(f, "<{} bytes>", b.len()),
            Value::Date(dt) => write!(f, "{}", dt.to_rfc3339()),
            Value::Array(arr) => {
                let items: Vec<String> = arr.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", items.join(", "))
            }
            Value::Object(obj) => {
                let items: Vec<String> = obj
                    .iter()
                    .map(|(k, v)| format!("\"{}\": {}", k, v))
                    .collect();
                write!(f, "{{{}}}", items.join(", "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn nested_paths_resolve_and_missing_is_undefined() {
        let doc = Value::from_json(json!({"address": {"city": "Oslo"}, "age": null}));

        assert_eq!(doc.get_path("address.city"), Some(&Value::from("Oslo")));
        assert_eq!(doc.get_path("age"), Some(&Value::Null));
        assert_eq!(doc.get_path("address.zip"), None);
        assert_eq!(doc.get_path("age.years"), None);
        assert_eq!(doc.get_path(""), Some(&doc));
    }

    #[test]
    fn set_path_creates_parents_but_not_through_scalars() {
        let mut doc = Value::from_json(json!({"name": "x"}));
        assert!(doc.set_path("meta.id", Value::Int64(7)));
        assert_eq!(doc.get_path("meta.id"), Some(&Value::Int64(7)));

        assert!(!doc.set_path("name.first", Value::from("y")));
        assert_eq!(doc.get_path("name"), Some(&Value::from("x")));
    }

    #[test]
    fn strict_equality_does_not_coerce() {
        assert!(Value::Int64(1).strict_equals(&Value::Float64(1.0)));
        assert!(!Value::from("1").strict_equals(&Value::Int64(1)));
        assert!(!Value::Null.strict_equals(&Value::Bool(false)));
        assert!(
            Value::from_json(json!({"a": [1, 2]})).strict_equals(&Value::from_json(json!({"a": [1.0, 2]})))
        );
    }

    #[test]
    fn mixed_kinds_are_incomparable() {
        assert_eq!(Value::Int64(2).compare(&Value::Float64(1.5)), Some(Ordering::Greater));
        assert_eq!(Value::from("a").compare(&Value::from("b")), Some(Ordering::Less));
        assert_eq!(Value::from("3").compare(&Value::Int64(2)), None);
        assert_eq!(Value::Null.compare(&Value::Null), None);
    }

    #[test]
    fn serde_round_trip_through_json() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct Person {
            id: u32,
            tags: Vec<String>,
        }

        let person = Person {
            id: 3,
            tags: vec!["x".into()],
        };
        let value = Value::from_serializable(&person).unwrap();
        assert_eq!(value.get_path("id"), Some(&Value::Int64(3)));
        assert_eq!(value.deserialize_into::<Person>().unwrap(), person);
    }
}
