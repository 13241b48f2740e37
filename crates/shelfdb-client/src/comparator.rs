//! Predicates used by field-level where-conditions.
//!
//! Every comparator takes the bound value(s) and the candidate read from a
//! record. A missing field is passed as `None`. Relational comparators only
//! hold between values of the same kind (two numbers, two strings, two dates,
//! two booleans or two binaries); anything else is incomparable and yields
//! `false`.

use std::cmp::Ordering;

use shelfdb_common::Value;

/// A predicate bound to its comparison value(s).
pub type Comparator = Box<dyn Fn(Option<&Value>) -> bool + Send + Sync>;

/// Strict equality without type coercion.
pub fn equals(bound: &Value, candidate: Option<&Value>) -> bool {
    candidate.is_some_and(|value| value.strict_equals(bound))
}

/// `lower < candidate < upper`.
pub fn between(lower: &Value, upper: &Value, candidate: Option<&Value>) -> bool {
    greater_than(lower, candidate) && less_than(upper, candidate)
}

/// `lower <= candidate <= upper`.
pub fn range(lower: &Value, upper: &Value, candidate: Option<&Value>) -> bool {
    greater_than_equal(lower, candidate) && less_than_equal(upper, candidate)
}

pub fn greater_than(bound: &Value, candidate: Option<&Value>) -> bool {
    ordering(bound, candidate) == Some(Ordering::Greater)
}

pub fn greater_than_equal(bound: &Value, candidate: Option<&Value>) -> bool {
    matches!(
        ordering(bound, candidate),
        Some(Ordering::Greater | Ordering::Equal)
    )
}

pub fn less_than(bound: &Value, candidate: Option<&Value>) -> bool {
    ordering(bound, candidate) == Some(Ordering::Less)
}

pub fn less_than_equal(bound: &Value, candidate: Option<&Value>) -> bool {
    matches!(
        ordering(bound, candidate),
        Some(Ordering::Less | Ordering::Equal)
    )
}

/// Ordering of the candidate relative to the bound.
///
/// Values are never coerced across kinds: `25` against `"3"` has no
/// ordering, where a loosely typed comparison would convert the string to
/// a number. Mismatched kinds make every relational comparator false.
fn ordering(bound: &Value, candidate: Option<&Value>) -> Option<Ordering> {
    candidate.and_then(|value| value.compare(bound))
}
