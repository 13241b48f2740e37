//! Query result types for ShelfDB

use serde::de::DeserializeOwned;
use shelfdb_common::{Result, ShelfError, Value};

/// Outcome of an executed query.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    /// Keyed lookup. `None` when nothing was stored under the key.
    Record(Option<Value>),
    /// Scans, and the items written by an insert or upsert.
    Records(Vec<Value>),
    /// Remove and clear.
    Acknowledged(bool),
    Count(u64),
}

impl QueryResult {
    /// The single record of a keyed lookup.
    pub fn record(&self) -> Option<&Value> {
        match self {
            QueryResult::Record(record) => record.as_ref(),
            _ => None,
        }
    }

    pub fn into_record(self) -> Option<Value> {
        match self {
            QueryResult::Record(record) => record,
            _ => None,
        }
    }

    /// Every returned record. A keyed lookup yields zero or one.
    pub fn records(&self) -> &[Value] {
        match self {
            QueryResult::Records(records) => records,
            QueryResult::Record(Some(record)) => std::slice::from_ref(record),
            _ => &[],
        }
    }

    pub fn into_records(self) -> Vec<Value> {
        match self {
            QueryResult::Records(records) => records,
            QueryResult::Record(record) => record.into_iter().collect(),
            _ => Vec::new(),
        }
    }

    pub fn count(&self) -> Option<u64> {
        match self {
            QueryResult::Count(n) => Some(*n),
            _ => None,
        }
    }

    pub fn is_acknowledged(&self) -> bool {
        matches!(self, QueryResult::Acknowledged(true))
    }

    /// Deserialize the single record of a keyed lookup.
    pub fn one<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        self.record().map(Value::deserialize_into::<T>).transpose()
    }

    /// Deserialize every returned record.
    pub fn all<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        self.records().iter().map(Value::deserialize_into::<T>).collect()
    }

    /// Exactly one record, or an error.
    pub fn expect_one(&self) -> Result<&Value> {
        match self.records() {
            [record] => Ok(record),
            [] => Err(ShelfError::NotFound("no record returned".into())),
            records => Err(ShelfError::InvalidOperation(format!(
                "expected 1 record, got {}",
                records.len()
            ))),
        }
    }

    /// JSON rendering, mostly for logs and debugging.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            QueryResult::Record(Some(record)) => record.to_json(),
            QueryResult::Record(None) => serde_json::Value::Null,
            QueryResult::Records(records) => {
                serde_json::Value::Array(records.iter().map(Value::to_json).collect())
            }
            QueryResult::Acknowledged(ack) => serde_json::Value::Bool(*ack),
            QueryResult::Count(n) => serde_json::Value::from(*n),
        }
    }
}
