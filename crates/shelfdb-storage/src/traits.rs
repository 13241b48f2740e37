//! Storage engine interface.
//!
//! These traits describe the transactional key-value engine the query
//! layer runs against: transactions scoped to a set of object stores, store
//! and index handles issuing single-shot asynchronous requests, and
//! step-advanceable cursors. They are object safe so the query layer can
//! hold any engine behind `Arc<dyn StorageEngine>`.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shelfdb_common::{Key, KeyPath, KeyQuery, KeyRange, Result, ShelfError, Value};

/// Access mode of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionMode {
    ReadOnly,
    ReadWrite,
}

impl TransactionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionMode::ReadOnly => "readonly",
            TransactionMode::ReadWrite => "readwrite",
        }
    }

    pub fn is_read_only(&self) -> bool {
        matches!(self, TransactionMode::ReadOnly)
    }
}

impl std::fmt::Display for TransactionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum TransactionState {
    Active,
    Committed,
    Aborted(ShelfError),
}

impl TransactionState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionState::Active)
    }
}

/// Terminal event of a transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum TransactionOutcome {
    Committed,
    /// The transaction was rolled back. Carries the error that caused the
    /// abort, or an `AbortError` when it was aborted explicitly.
    Aborted(ShelfError),
}

impl TransactionOutcome {
    /// Convert the terminal event into a result.
    pub fn into_result(self) -> Result<()> {
        match self {
            TransactionOutcome::Committed => Ok(()),
            TransactionOutcome::Aborted(err) => Err(err),
        }
    }
}

/// Iteration order of a cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CursorDirection {
    #[default]
    Next,
    Prev,
}

/// One step of a cursor.
#[derive(Debug, Clone, PartialEq)]
pub struct CursorEntry {
    /// Position of the cursor in its source: the primary key for store
    /// cursors, the index key for index cursors.
    pub key: Key,
    pub primary_key: Key,
    pub value: Value,
}

/// A connection to a transactional key-value engine.
#[async_trait]
pub trait StorageEngine: Send + Sync {
    /// Database name.
    fn name(&self) -> &str;

    /// Schema version the engine was opened with.
    fn version(&self) -> u32;

    /// Names of all object stores, sorted.
    fn store_names(&self) -> Vec<String>;

    /// Open a transaction over `stores`.
    ///
    /// Resolves once the engine has granted the scope; read-write
    /// transactions wait for any overlapping transaction to finish.
    async fn open_transaction(
        &self,
        stores: &[String],
        mode: TransactionMode,
    ) -> Result<Arc<dyn EngineTransaction>>;
}

/// An open transaction.
///
/// Requests are only accepted while the transaction is active. `commit` and
/// `abort` are requests: the terminal event is observed through `done`.
#[async_trait]
pub trait EngineTransaction: Send + Sync {
    fn id(&self) -> u64;

    fn mode(&self) -> TransactionMode;

    /// Store names the transaction was opened over.
    fn scope(&self) -> &[String];

    fn state(&self) -> TransactionState;

    /// Handle to a store in the transaction scope.
    fn object_store(&self, name: &str) -> Result<Box<dyn ObjectStoreHandle>>;

    /// Request a commit. No-op once the transaction has finished.
    fn commit(&self);

    /// Roll the transaction back. Idempotent.
    fn abort(&self);

    /// Wait for the terminal event.
    async fn done(&self) -> TransactionOutcome;
}

/// Requests against one object store inside a transaction.
#[async_trait]
pub trait ObjectStoreHandle: Send + Sync {
    fn name(&self) -> &str;

    fn key_path(&self) -> Option<KeyPath>;

    fn auto_increment(&self) -> bool;

    fn index_names(&self) -> Vec<String>;

    /// First record matching the query.
    async fn get(&self, query: &KeyQuery) -> Result<Option<Value>>;

    /// Every record in the range, in key order.
    async fn get_all(&self, range: Option<&KeyRange>) -> Result<Vec<Value>>;

    /// Insert a record. Fails with a `ConstraintError` when the key exists.
    async fn add(&self, value: Value, key: Option<Key>) -> Result<Key>;

    /// Insert or overwrite a record.
    async fn put(&self, value: Value, key: Option<Key>) -> Result<Key>;

    /// Delete every record matching the query. Succeeds when nothing matched.
    async fn delete(&self, query: &KeyQuery) -> Result<()>;

    async fn clear(&self) -> Result<()>;

    async fn count(&self, range: Option<&KeyRange>) -> Result<u64>;

    async fn open_cursor(
        &self,
        range: Option<KeyRange>,
        direction: CursorDirection,
    ) -> Result<Box<dyn Cursor>>;

    /// Handle to an index of this store. Fails with `NotFoundError`.
    fn index(&self, name: &str) -> Result<Box<dyn IndexHandle>>;
}

/// Requests against a secondary index inside a transaction.
#[async_trait]
pub trait IndexHandle: Send + Sync {
    fn name(&self) -> &str;

    fn key_path(&self) -> KeyPath;

    fn unique(&self) -> bool;

    fn multi_entry(&self) -> bool;

    /// Record referenced by the first index entry matching the query.
    async fn get(&self, query: &KeyQuery) -> Result<Option<Value>>;

    /// Number of index entries in the range.
    async fn count(&self, range: Option<&KeyRange>) -> Result<u64>;

    async fn open_cursor(
        &self,
        range: Option<KeyRange>,
        direction: CursorDirection,
    ) -> Result<Box<dyn Cursor>>;
}

/// Step-advanceable iterator over a store or index range.
///
/// Each call to `next` yields the following entry; dropping the cursor ends
/// the iteration.
#[async_trait]
pub trait Cursor: Send {
    async fn next(&mut self) -> Result<Option<CursorEntry>>;
}
