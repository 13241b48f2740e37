//! Query builder.
//!
//! A `Query` accumulates a method (find, insert, count, ...), an optional key,
//! where-conditions and payload values. Nothing touches the engine until the
//! query is executed: `build` validates the builder into an immutable
//! `QueryPlan`, and `execute` (or `.await`) hands the plan to the executor.
//!
//! ```rust,no_run
//! # async fn run(db: shelfdb_client::Database) -> shelfdb_common::Result<()> {
//! let adults = db
//!     .store("people")
//!     .find()
//!     .where_index("age")
//!     .greater_than(17)
//!     .where_field("city")
//!     .equals("Paris")
//!     .await?;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::future::IntoFuture;

use futures::future::BoxFuture;
use shelfdb_common::{Key, KeyQuery, KeyRange, Result, ShelfError, Value};
use shelfdb_storage::TransactionMode;
use tracing::warn;

use crate::condition::{Comparison, ConditionTarget, WhereCondition};
use crate::context::PendingContext;
use crate::executor;
use crate::result::QueryResult;

/// Label of key-path conditions.
const PRIMARY_KEY_LABEL: &str = "<primary key>";

/// Query method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryType {
    Find,
    FindAll,
    Insert,
    Upsert,
    Remove,
    Clear,
    Count,
}

impl QueryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryType::Find => "FIND",
            QueryType::FindAll => "FINDALL",
            QueryType::Insert => "INSERT",
            QueryType::Upsert => "UPSERT",
            QueryType::Remove => "REMOVE",
            QueryType::Clear => "CLEAR",
            QueryType::Count => "COUNT",
        }
    }

    /// Mode of the transaction the method runs in.
    pub fn transaction_mode(&self) -> TransactionMode {
        match self {
            QueryType::Find | QueryType::FindAll | QueryType::Count => TransactionMode::ReadOnly,
            QueryType::Insert | QueryType::Upsert | QueryType::Remove | QueryType::Clear => {
                TransactionMode::ReadWrite
            }
        }
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Range a conditional find scans.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanRange {
    Index { name: String, range: KeyRange },
    PrimaryKey(KeyRange),
}

/// Validated operation of a query.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Keyed lookup.
    Get { key: KeyQuery, required: bool },
    /// Conditional find: at most one range, then field filters.
    Scan {
        range: Option<ScanRange>,
        filters: Vec<WhereCondition>,
    },
    FindAll,
    /// Insert (`overwrite == false`) or upsert.
    Write {
        values: Vec<Value>,
        key: Option<Key>,
        overwrite: bool,
    },
    Remove { key: KeyQuery },
    Clear,
    Count { index: Option<String> },
}

/// Immutable, validated description of a query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    pub store: String,
    pub query_type: QueryType,
    pub operation: Operation,
}

impl QueryPlan {
    pub fn mode(&self) -> TransactionMode {
        self.query_type.transaction_mode()
    }
}

/// Builder for one operation against one object store.
pub struct Query {
    store: String,
    context: PendingContext,
    inside_transaction: bool,
    query_type: Option<QueryType>,
    key: Option<KeyQuery>,
    required: bool,
    conditions: Vec<WhereCondition>,
    values: Vec<Value>,
    count_index: Option<String>,
}

impl Query {
    /// Create a query against `store`.
    ///
    /// Queries created inside a coordinated transaction neither commit nor
    /// wait for the transaction to finish; the coordinator does both once.
    pub fn new(store: impl Into<String>, context: PendingContext, inside_transaction: bool) -> Self {
        Self {
            store: store.into(),
            context,
            inside_transaction,
            query_type: None,
            key: None,
            required: false,
            conditions: Vec::new(),
            values: Vec::new(),
            count_index: None,
        }
    }

    pub fn store_name(&self) -> &str {
        &self.store
    }

    pub fn query_type(&self) -> Option<QueryType> {
        self.query_type
    }

    pub fn is_inside_transaction(&self) -> bool {
        self.inside_transaction
    }

    pub fn conditions(&self) -> &[WhereCondition] {
        &self.conditions
    }

    fn set_type(&mut self, query_type: QueryType) {
        if let Some(previous) = self.query_type {
            warn!(
                store = %self.store,
                %previous,
                next = %query_type,
                "Query method set more than once, keeping the last one"
            );
        }
        self.query_type = Some(query_type);
    }

    /// Find records matching the where-conditions added next.
    pub fn find(mut self) -> Self {
        self.set_type(QueryType::Find);
        self
    }

    /// Find the record stored under `key`. With `required`, a missing record
    /// is a `NotFound` error instead of an empty result.
    pub fn find_by_key(mut self, key: impl Into<KeyQuery>, required: bool) -> Self {
        self.set_type(QueryType::Find);
        self.key = Some(key.into());
        self.required = required;
        self
    }

    /// Every record of the store, in key order.
    pub fn find_all(mut self) -> Self {
        self.set_type(QueryType::FindAll);
        self
    }

    /// Add records. Fails if any key already exists.
    pub fn insert<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.set_type(QueryType::Insert);
        self.values = values.into_iter().map(Into::into).collect();
        self
    }

    /// Add one record under an out-of-line key.
    pub fn insert_with_key(mut self, value: impl Into<Value>, key: impl Into<Key>) -> Self {
        self.set_type(QueryType::Insert);
        self.values = vec![value.into()];
        self.key = Some(KeyQuery::Key(key.into()));
        self
    }

    /// Add or overwrite records.
    pub fn upsert<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.set_type(QueryType::Upsert);
        self.values = values.into_iter().map(Into::into).collect();
        self
    }

    /// Add or overwrite one record under an out-of-line key.
    pub fn upsert_with_key(mut self, value: impl Into<Value>, key: impl Into<Key>) -> Self {
        self.set_type(QueryType::Upsert);
        self.values = vec![value.into()];
        self.key = Some(KeyQuery::Key(key.into()));
        self
    }

    /// Delete the record(s) matching `key`.
    pub fn remove(mut self, key: impl Into<KeyQuery>) -> Self {
        self.set_type(QueryType::Remove);
        self.key = Some(key.into());
        self
    }

    /// Delete every record of the store.
    pub fn clear(mut self) -> Self {
        self.set_type(QueryType::Clear);
        self
    }

    /// Number of records in the store.
    pub fn count(mut self) -> Self {
        self.set_type(QueryType::Count);
        self
    }

    /// Number of entries in an index.
    pub fn count_index(mut self, index: impl Into<String>) -> Self {
        self.set_type(QueryType::Count);
        self.count_index = Some(index.into());
        self
    }

    /// Restrict the scan to a range of an index.
    pub fn where_index(self, index: impl Into<String>) -> PendingCondition {
        PendingCondition::new(self, index.into(), ConditionTarget::Index)
    }

    /// Filter visited records on a field.
    pub fn where_field(self, field: impl Into<String>) -> PendingCondition {
        PendingCondition::new(self, field.into(), ConditionTarget::Field)
    }

    /// Restrict the scan to a range of primary keys.
    pub fn where_key(self) -> PendingCondition {
        PendingCondition::new(self, PRIMARY_KEY_LABEL.to_string(), ConditionTarget::KeyPath)
    }

    /// Validate the builder into a plan.
    pub fn build(&self) -> Result<QueryPlan> {
        let query_type = self.query_type.ok_or_else(|| {
            ShelfError::InvalidQuery(format!(
                "no query method selected for store '{}'",
                self.store
            ))
        })?;

        if !self.conditions.is_empty() && query_type != QueryType::Find {
            return Err(ShelfError::InvalidQuery(format!(
                "where-conditions are only supported on FIND, not {query_type}"
            )));
        }

        let operation = match query_type {
            QueryType::Find => match &self.key {
                Some(key) => Operation::Get {
                    key: key.clone(),
                    required: self.required,
                },
                None if !self.conditions.is_empty() => self.scan_operation()?,
                None => {
                    return Err(ShelfError::InvalidQuery(
                        "neither key nor conditions specified".into(),
                    ));
                }
            },
            QueryType::FindAll => Operation::FindAll,
            QueryType::Insert | QueryType::Upsert => {
                let key = match &self.key {
                    Some(KeyQuery::Key(key)) => {
                        if self.values.len() != 1 {
                            return Err(ShelfError::InvalidQuery(format!(
                                "a keyed {query_type} writes exactly one value, got {}",
                                self.values.len()
                            )));
                        }
                        Some(key.clone())
                    }
                    Some(KeyQuery::Range(_)) => {
                        return Err(ShelfError::InvalidQuery(format!(
                            "{query_type} needs a single key, not a range"
                        )));
                    }
                    None => None,
                };
                Operation::Write {
                    values: self.values.clone(),
                    key,
                    overwrite: query_type == QueryType::Upsert,
                }
            }
            QueryType::Remove => Operation::Remove {
                key: self.key.clone().ok_or_else(|| {
                    ShelfError::InvalidQuery("REMOVE needs a key or key range".into())
                })?,
            },
            QueryType::Clear => Operation::Clear,
            QueryType::Count => Operation::Count {
                index: self.count_index.clone(),
            },
        };

        Ok(QueryPlan {
            store: self.store.clone(),
            query_type,
            operation,
        })
    }

    fn scan_operation(&self) -> Result<Operation> {
        let (ranges, filters): (Vec<_>, Vec<_>) = self
            .conditions
            .iter()
            .cloned()
            .partition(|condition| condition.target().is_range());

        if ranges.len() > 1 {
            return Err(ShelfError::InvalidQuery(format!(
                "only one index or key condition is supported per query, got {}",
                ranges.len()
            )));
        }

        let range = match ranges.into_iter().next() {
            Some(condition) => {
                let range = condition.key_range()?;
                Some(match condition.target() {
                    ConditionTarget::Index => ScanRange::Index {
                        name: condition.name().to_string(),
                        range,
                    },
                    _ => ScanRange::PrimaryKey(range),
                })
            }
            None => None,
        };

        // Fail at build time rather than halfway through the scan.
        for filter in &filters {
            filter.validate()?;
        }

        Ok(Operation::Scan { range, filters })
    }

    /// Build the plan and run it.
    pub async fn execute(self) -> Result<QueryResult> {
        let plan = self.build()?;
        executor::execute(plan, self.context, self.inside_transaction).await
    }
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("store", &self.store)
            .field("query_type", &self.query_type)
            .field("key", &self.key)
            .field("required", &self.required)
            .field("conditions", &self.conditions)
            .field("values", &self.values.len())
            .field("count_index", &self.count_index)
            .field("inside_transaction", &self.inside_transaction)
            .finish_non_exhaustive()
    }
}

impl IntoFuture for Query {
    type Output = Result<QueryResult>;
    type IntoFuture = BoxFuture<'static, Result<QueryResult>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.execute())
    }
}

/// A where-condition waiting for its comparison.
///
/// Owns the query it was created from and hands it back once a comparison
/// method is called.
#[derive(Debug)]
#[must_use = "a condition does nothing until a comparison is chosen"]
pub struct PendingCondition {
    query: Query,
    name: String,
    target: ConditionTarget,
}

impl PendingCondition {
    fn new(query: Query, name: String, target: ConditionTarget) -> Self {
        Self {
            query,
            name,
            target,
        }
    }

    fn with(mut self, comparison: Comparison) -> Query {
        self.query
            .conditions
            .push(WhereCondition::new(self.name, self.target, comparison));
        self.query
    }

    pub fn equals(self, value: impl Into<Value>) -> Query {
        self.with(Comparison::Equals(value.into()))
    }

    /// Alias of `equals`.
    pub fn only(self, value: impl Into<Value>) -> Query {
        self.equals(value)
    }

    /// Strictly between the bounds.
    pub fn between(self, lower: impl Into<Value>, upper: impl Into<Value>) -> Query {
        self.with(Comparison::Between(lower.into(), upper.into()))
    }

    /// Between the bounds, inclusive.
    pub fn range(self, lower: impl Into<Value>, upper: impl Into<Value>) -> Query {
        self.with(Comparison::Range(lower.into(), upper.into()))
    }

    pub fn greater_than(self, value: impl Into<Value>) -> Query {
        self.with(Comparison::GreaterThan(value.into()))
    }

    pub fn greater_than_equal(self, value: impl Into<Value>) -> Query {
        self.with(Comparison::GreaterThanEqual(value.into()))
    }

    pub fn less_than(self, value: impl Into<Value>) -> Query {
        self.with(Comparison::LessThan(value.into()))
    }

    pub fn less_than_equal(self, value: impl Into<Value>) -> Query {
        self.with(Comparison::LessThanEqual(value.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context;
    use futures::FutureExt;
    use shelfdb_common::EngineErrorKind;

    /// A query whose context never resolves; enough for build-time checks.
    fn query(store: &str) -> Query {
        let never = futures::future::pending::<Result<context::TransactionContext>>()
            .boxed()
            .shared();
        Query::new(store, never, false)
    }

    #[test]
    fn build_requires_a_method() {
        let err = query("people").build().unwrap_err();
        assert_eq!(err.kind(), "invalid_query");
    }

    #[test]
    fn last_method_wins() {
        let plan = query("people").count().find_all().build().unwrap();
        assert_eq!(plan.query_type, QueryType::FindAll);
        assert_eq!(plan.operation, Operation::FindAll);
        assert_eq!(plan.mode(), TransactionMode::ReadOnly);
    }

    #[test]
    fn find_needs_key_or_conditions() {
        let err = query("people").find().build().unwrap_err();
        assert_eq!(err, ShelfError::InvalidQuery("neither key nor conditions specified".into()));

        let plan = query("people").find_by_key(7, true).build().unwrap();
        assert_eq!(
            plan.operation,
            Operation::Get {
                key: KeyQuery::from(7),
                required: true
            }
        );
    }

    #[test]
    fn conditions_split_into_range_and_filters() {
        let plan = query("people")
            .find()
            .where_field("name")
            .equals("Ada")
            .where_index("age")
            .greater_than(22)
            .build()
            .unwrap();
        let Operation::Scan { range, filters } = plan.operation else {
            panic!("expected a scan");
        };
        assert_eq!(
            range,
            Some(ScanRange::Index {
                name: "age".into(),
                range: KeyRange::lower_bound(22, true)
            })
        );
        assert_eq!(filters.len(), 1);
        assert_eq!(filters[0].name(), "name");
    }

    #[test]
    fn key_conditions_scan_primary_keys() {
        let plan = query("people")
            .find()
            .where_key()
            .range(2, 4)
            .build()
            .unwrap();
        assert_eq!(
            plan.operation,
            Operation::Scan {
                range: Some(ScanRange::PrimaryKey(KeyRange::bound(2, 4, false, false).unwrap())),
                filters: vec![],
            }
        );
    }

    #[test]
    fn two_range_conditions_are_rejected() {
        let err = query("people")
            .find()
            .where_index("age")
            .greater_than(1)
            .where_key()
            .less_than(10)
            .build()
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_query");
    }

    #[test]
    fn conditions_only_apply_to_find() {
        let err = query("people")
            .where_index("age")
            .equals(3)
            .count()
            .build()
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_query");
    }

    #[test]
    fn inverted_index_bounds_fail_at_build() {
        let err = query("people")
            .find()
            .where_index("age")
            .between(9, 1)
            .build()
            .unwrap_err();
        assert!(err.is_engine(EngineErrorKind::Data));
    }

    #[test]
    fn keyed_writes_take_one_value() {
        let plan = query("notes")
            .insert_with_key("hello", 5)
            .build()
            .unwrap();
        assert_eq!(
            plan.operation,
            Operation::Write {
                values: vec![Value::from("hello")],
                key: Some(Key::from(5)),
                overwrite: false,
            }
        );
        assert_eq!(plan.mode(), TransactionMode::ReadWrite);
    }

    #[tokio::test]
    async fn build_errors_surface_when_awaited() {
        let db = context::ready(context::TransactionContext::Connection(std::sync::Arc::new(
            shelfdb_storage::MemoryEngine::new("t", 1),
        )));
        let err = Query::new("people", db, false).find().await.unwrap_err();
        assert_eq!(err.kind(), "invalid_query");
    }
}
