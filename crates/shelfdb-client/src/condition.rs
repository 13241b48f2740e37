//! Where-conditions.
//!
//! A condition either restricts the scan range (on an index or on the
//! primary key) or filters visited records in memory (on a field).

use shelfdb_common::{Key, KeyRange, Result, ShelfError, Value};

use crate::comparator::{self, Comparator};

/// What a condition applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionTarget {
    /// A secondary index, turned into an index range scan.
    Index,
    /// A record field, checked against every visited record.
    Field,
    /// The store's primary key, turned into a key range scan.
    KeyPath,
}

impl ConditionTarget {
    /// Whether the condition restricts the scan range.
    pub fn is_range(&self) -> bool {
        matches!(self, ConditionTarget::Index | ConditionTarget::KeyPath)
    }
}

impl std::fmt::Display for ConditionTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConditionTarget::Index => write!(f, "INDEX"),
            ConditionTarget::Field => write!(f, "FIELD"),
            ConditionTarget::KeyPath => write!(f, "KEYPATH"),
        }
    }
}

/// Comparison kind with its bound value(s).
#[derive(Debug, Clone, PartialEq)]
pub enum Comparison {
    Equals(Value),
    /// Both ends exclusive.
    Between(Value, Value),
    /// Both ends inclusive.
    Range(Value, Value),
    GreaterThan(Value),
    GreaterThanEqual(Value),
    LessThan(Value),
    LessThanEqual(Value),
}

/// Descriptor handed to the executor.
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionValue {
    Range(KeyRange),
    Value(Value),
    Pair(Value, Value),
}

/// One filter term of a query.
#[derive(Debug, Clone, PartialEq)]
pub struct WhereCondition {
    name: String,
    target: ConditionTarget,
    comparison: Comparison,
}

impl WhereCondition {
    pub fn new(name: impl Into<String>, target: ConditionTarget, comparison: Comparison) -> Self {
        Self {
            name: name.into(),
            target,
            comparison,
        }
    }

    /// Field path, index name, or a label for key conditions.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn target(&self) -> ConditionTarget {
        self.target
    }

    pub fn comparison(&self) -> &Comparison {
        &self.comparison
    }

    /// Predicate for a field condition.
    pub fn comparator(&self) -> Result<Comparator> {
        if self.target != ConditionTarget::Field {
            return Err(ShelfError::InvalidOperation(format!(
                "{} condition '{}' has no comparator; it is applied as a key range",
                self.target, self.name
            )));
        }
        let comparator: Comparator = match self.comparison.clone() {
            Comparison::Equals(bound) => Box::new(move |v| comparator::equals(&bound, v)),
            Comparison::Between(lower, upper) => {
                Box::new(move |v| comparator::between(&lower, &upper, v))
            }
            Comparison::Range(lower, upper) => {
                Box::new(move |v| comparator::range(&lower, &upper, v))
            }
            Comparison::GreaterThan(bound) => {
                Box::new(move |v| comparator::greater_than(&bound, v))
            }
            Comparison::GreaterThanEqual(bound) => {
                Box::new(move |v| comparator::greater_than_equal(&bound, v))
            }
            Comparison::LessThan(bound) => Box::new(move |v| comparator::less_than(&bound, v)),
            Comparison::LessThanEqual(bound) => {
                Box::new(move |v| comparator::less_than_equal(&bound, v))
            }
        };
        Ok(comparator)
    }

    /// Check that the condition can be applied, without building it.
    pub fn validate(&self) -> Result<()> {
        if self.target.is_range() {
            self.key_range().map(drop)
        } else {
            self.comparator().map(drop)
        }
    }

    /// Range or raw comparison value(s), depending on the target.
    pub fn condition(&self) -> Result<ConditionValue> {
        if self.target.is_range() {
            return self.key_range().map(ConditionValue::Range);
        }
        Ok(match &self.comparison {
            Comparison::Between(lower, upper) | Comparison::Range(lower, upper) => {
                ConditionValue::Pair(lower.clone(), upper.clone())
            }
            Comparison::Equals(v)
            | Comparison::GreaterThan(v)
            | Comparison::GreaterThanEqual(v)
            | Comparison::LessThan(v)
            | Comparison::LessThanEqual(v) => ConditionValue::Value(v.clone()),
        })
    }

    /// Key range for an index or key condition.
    pub fn key_range(&self) -> Result<KeyRange> {
        if !self.target.is_range() {
            return Err(ShelfError::InvalidOperation(format!(
                "field condition '{}' cannot be turned into a key range",
                self.name
            )));
        }
        Ok(match &self.comparison {
            Comparison::Equals(v) => KeyRange::only(Key::try_from(v)?),
            Comparison::Between(lower, upper) => {
                KeyRange::bound(Key::try_from(lower)?, Key::try_from(upper)?, true, true)?
            }
            Comparison::Range(lower, upper) => {
                KeyRange::bound(Key::try_from(lower)?, Key::try_from(upper)?, false, false)?
            }
            Comparison::GreaterThan(v) => KeyRange::lower_bound(Key::try_from(v)?, true),
            Comparison::GreaterThanEqual(v) => KeyRange::lower_bound(Key::try_from(v)?, false),
            Comparison::LessThan(v) => KeyRange::upper_bound(Key::try_from(v)?, true),
            Comparison::LessThanEqual(v) => KeyRange::upper_bound(Key::try_from(v)?, false),
        })
    }
}
