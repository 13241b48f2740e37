//! Keys, key ranges and key paths.
//!
//! Keys form a total order across types:
//! `Number < Date < String < Binary < Array`. Arrays compare element by
//! element, a shorter array that is a prefix of a longer one sorts first.

use std::cmp::Ordering;
use std::ops::Bound;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Result, ShelfError, Value};

/// Largest integer magnitude a numeric key holds exactly (2^53).
pub const MAX_SAFE_INTEGER: u64 = 1 << 53;

/// A valid record or index key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Key {
    Number(f64),
    Date(DateTime<Utc>),
    String(String),
    Binary(Vec<u8>),
    Array(Vec<Key>),
}

impl Key {
    fn type_rank(&self) -> u8 {
        match self {
            Key::Number(_) => 0,
            Key::Date(_) => 1,
            Key::String(_) => 2,
            Key::Binary(_) => 3,
            Key::Array(_) => 4,
        }
    }

    /// Convert back into a record value.
    ///
    /// Integral numbers become `Int64` so generated keys round-trip as
    /// integers.
    pub fn to_value(&self) -> Value {
        match self {
            Key::Number(n) => {
                if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
                    Value::Int64(*n as i64)
                } else {
                    Value::Float64(*n)
                }
            }
            Key::Date(d) => Value::Date(*d),
            Key::String(s) => Value::String(s.clone()),
            Key::Binary(b) => Value::Binary(b.clone()),
            Key::Array(items) => Value::Array(items.iter().map(Key::to_value).collect()),
        }
    }

    /// A numeric key. `-0.0` is stored as `0.0`.
    pub fn number(n: f64) -> Key {
        Key::Number(if n == 0.0 { 0.0 } else { n })
    }

    /// Numeric view, used by key generators.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Key::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Convert a value into a key, returning `None` when it is not a valid key.
    ///
    /// Integers whose magnitude exceeds 2^53 are rejected rather than
    /// rounded into a neighbouring key.
    pub fn from_value(value: &Value) -> Option<Key> {
        match value {
            Value::Int64(i) if i.unsigned_abs() <= MAX_SAFE_INTEGER => {
                Some(Key::Number(*i as f64))
            }
            Value::Float64(f) if !f.is_nan() => Some(Key::number(*f)),
            Value::String(s) => Some(Key::String(s.clone())),
            Value::Date(d) => Some(Key::Date(*d)),
            Value::Binary(b) => Some(Key::Binary(b.clone())),
            Value::Array(items) => items
                .iter()
                .map(Key::from_value)
                .collect::<Option<Vec<_>>>()
                .map(Key::Array),
            _ => None,
        }
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Key {}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            // -0.0 and 0.0 are the same key.
            (Key::Number(a), Key::Number(b)) => a.partial_cmp(b).unwrap_or_else(|| a.total_cmp(b)),
            (Key::Date(a), Key::Date(b)) => a.cmp(b),
            (Key::String(a), Key::String(b)) => a.cmp(b),
            (Key::Binary(a), Key::Binary(b)) => a.cmp(b),
            (Key::Array(a), Key::Array(b)) => a.cmp(b),
            _ => self.type_rank().cmp(&other.type_rank()),
        }
    }
}

impl TryFrom<&Value> for Key {
    type Error = ShelfError;

    fn try_from(value: &Value) -> Result<Self> {
        Key::from_value(value).ok_or_else(|| match value {
            Value::Int64(i) => ShelfError::InvalidOperation(format!(
                "integer key {i} is outside the exact range of +/-2^53"
            )),
            _ => ShelfError::InvalidOperation(format!(
                "a {} value is not a valid key",
                value.type_name()
            )),
        })
    }
}

impl TryFrom<Value> for Key {
    type Error = ShelfError;

    fn try_from(value: Value) -> Result<Self> {
        Key::try_from(&value)
    }
}

impl From<i32> for Key {
    fn from(value: i32) -> Self {
        Key::Number(value as f64)
    }
}

/// Integers beyond +/-2^53 are rounded to the nearest representable number.
/// Record values are checked instead, see [`Key::from_value`].
impl From<i64> for Key {
    fn from(value: i64) -> Self {
        Key::Number(value as f64)
    }
}

impl From<u32> for Key {
    fn from(value: u32) -> Self {
        Key::Number(value as f64)
    }
}

impl From<f64> for Key {
    fn from(value: f64) -> Self {
        Key::number(value)
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Key::String(value.to_string())
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Key::String(value)
    }
}

impl From<DateTime<Utc>> for Key {
    fn from(value: DateTime<Utc>) -> Self {
        Key::Date(value)
    }
}

impl From<Vec<Key>> for Key {
    fn from(value: Vec<Key>) -> Self {
        Key::Array(value)
    }
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_value())
    }
}

/// A contiguous interval of keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange {
    pub lower: Option<Key>,
    pub upper: Option<Key>,
    pub lower_open: bool,
    pub upper_open: bool,
}

impl KeyRange {
    /// A range containing exactly one key.
    pub fn only(key: impl Into<Key>) -> Self {
        let key = key.into();
        Self {
            lower: Some(key.clone()),
            upper: Some(key),
            lower_open: false,
            upper_open: false,
        }
    }

    /// A range bounded on both ends.
    ///
    /// Fails with a `DataError` when `lower > upper`, or when both are equal
    /// and either end is open.
    pub fn bound(
        lower: impl Into<Key>,
        upper: impl Into<Key>,
        lower_open: bool,
        upper_open: bool,
    ) -> Result<Self> {
        let (lower, upper) = (lower.into(), upper.into());
        match lower.cmp(&upper) {
            Ordering::Greater => {
                return Err(ShelfError::data(format!(
                    "lower bound {lower} is greater than upper bound {upper}"
                )));
            }
            Ordering::Equal if lower_open || upper_open => {
                return Err(ShelfError::data(format!(
                    "bounds are equal ({lower}) but the range is open"
                )));
            }
            _ => {}
        }
        Ok(Self {
            lower: Some(lower),
            upper: Some(upper),
            lower_open,
            upper_open,
        })
    }

    /// All keys above `lower`.
    pub fn lower_bound(lower: impl Into<Key>, open: bool) -> Self {
        Self {
            lower: Some(lower.into()),
            upper: None,
            lower_open: open,
            upper_open: true,
        }
    }

    /// All keys below `upper`.
    pub fn upper_bound(upper: impl Into<Key>, open: bool) -> Self {
        Self {
            lower: None,
            upper: Some(upper.into()),
            lower_open: true,
            upper_open: open,
        }
    }

    pub fn contains(&self, key: &Key) -> bool {
        let above_lower = match &self.lower {
            Some(lower) if self.lower_open => key > lower,
            Some(lower) => key >= lower,
            None => true,
        };
        let below_upper = match &self.upper {
            Some(upper) if self.upper_open => key < upper,
            Some(upper) => key <= upper,
            None => true,
        };
        above_lower && below_upper
    }

    /// True when no key can satisfy both bounds.
    pub fn is_empty(&self) -> bool {
        match (&self.lower, &self.upper) {
            (Some(lower), Some(upper)) => {
                lower > upper || (lower == upper && (self.lower_open || self.upper_open))
            }
            _ => false,
        }
    }

    /// Lower bound in `std::ops::Bound` form, for `BTreeMap::range`.
    pub fn start_bound(&self) -> Bound<&Key> {
        match &self.lower {
            Some(key) if self.lower_open => Bound::Excluded(key),
            Some(key) => Bound::Included(key),
            None => Bound::Unbounded,
        }
    }

    /// Upper bound in `std::ops::Bound` form, for `BTreeMap::range`.
    pub fn end_bound(&self) -> Bound<&Key> {
        match &self.upper {
            Some(key) if self.upper_open => Bound::Excluded(key),
            Some(key) => Bound::Included(key),
            None => Bound::Unbounded,
        }
    }
}

/// Argument of point lookups and deletes: one key, or every key in a range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyQuery {
    Key(Key),
    Range(KeyRange),
}

impl KeyQuery {
    pub fn matches(&self, key: &Key) -> bool {
        match self {
            KeyQuery::Key(k) => k == key,
            KeyQuery::Range(range) => range.contains(key),
        }
    }

    /// Normalise to a range.
    pub fn to_range(&self) -> KeyRange {
        match self {
            KeyQuery::Key(k) => KeyRange::only(k.clone()),
            KeyQuery::Range(range) => range.clone(),
        }
    }
}

impl std::fmt::Display for KeyQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyQuery::Key(key) => write!(f, "{key}"),
            KeyQuery::Range(range) => {
                let open = if range.lower_open { '(' } else { '[' };
                let close = if range.upper_open { ')' } else { ']' };
                let lower = range.lower.as_ref().map_or("-inf".into(), |k| k.to_string());
                let upper = range.upper.as_ref().map_or("+inf".into(), |k| k.to_string());
                write!(f, "{open}{lower}, {upper}{close}")
            }
        }
    }
}

impl From<Key> for KeyQuery {
    fn from(value: Key) -> Self {
        KeyQuery::Key(value)
    }
}

macro_rules! key_query_from {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for KeyQuery {
                fn from(value: $ty) -> Self {
                    KeyQuery::Key(Key::from(value))
                }
            }
        )*
    };
}

key_query_from!(i32, i64, u32, f64, &str, String);

impl From<KeyRange> for KeyQuery {
    fn from(value: KeyRange) -> Self {
        KeyQuery::Range(value)
    }
}

/// Where a store or index finds the key inside a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyPath {
    /// A dotted field path. The empty string addresses the record itself.
    Single(String),
    /// Several paths combined into an array key.
    Compound(Vec<String>),
}

impl KeyPath {
    /// Evaluate the key path against a record.
    pub fn extract(&self, value: &Value) -> Option<Key> {
        match self {
            KeyPath::Single(path) => value.get_path(path).and_then(Key::from_value),
            KeyPath::Compound(paths) => paths
                .iter()
                .map(|path| value.get_path(path).and_then(Key::from_value))
                .collect::<Option<Vec<_>>>()
                .map(Key::Array),
        }
    }

    /// Raw value addressed by a single key path, used for multi-entry indexes.
    pub fn extract_value<'a>(&self, value: &'a Value) -> Option<&'a Value> {
        match self {
            KeyPath::Single(path) => value.get_path(path),
            KeyPath::Compound(_) => None,
        }
    }
}

impl From<&str> for KeyPath {
    fn from(value: &str) -> Self {
        KeyPath::Single(value.to_string())
    }
}

impl From<String> for KeyPath {
    fn from(value: String) -> Self {
        KeyPath::Single(value)
    }
}

impl From<Vec<&str>> for KeyPath {
    fn from(value: Vec<&str>) -> Self {
        KeyPath::Compound(value.into_iter().map(String::from).collect())
    }
}

impl std::fmt::Display for KeyPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyPath::Single(path) => write!(f, "{path}"),
            KeyPath::Compound(paths) => write!(f, "[{}]", paths.join(", ")),
        }
    }
}
