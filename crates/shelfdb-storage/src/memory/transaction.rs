//! Transactions, store handles and index handles of the in-memory engine.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use shelfdb_common::{EngineErrorKind, Key, KeyPath, KeyQuery, KeyRange, Result, ShelfError, Value};
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, watch};
use tracing::{debug, trace, warn};

use super::StoreSlot;
use super::cursor::{CursorSource, MemoryCursor};
use super::store::WriteMode;
use crate::schema::IndexSchema;
use crate::traits::{
    Cursor, CursorDirection, EngineTransaction, IndexHandle, ObjectStoreHandle,
    TransactionMode, TransactionOutcome, TransactionState,
};

/// Lock held on one store of the scope.
#[derive(Debug)]
pub(crate) enum ScopeGuard {
    Shared { _guard: OwnedRwLockReadGuard<()> },
    Exclusive { _guard: OwnedRwLockWriteGuard<()> },
}

#[derive(Debug)]
enum UndoEntry {
    Record {
        store: String,
        key: Key,
        previous: Option<Value>,
    },
    Generator {
        store: String,
        previous: u64,
    },
}

/// State shared by a transaction and every handle opened from it.
#[derive(Debug)]
pub(crate) struct TxInner {
    id: u64,
    mode: TransactionMode,
    scope: Vec<String>,
    slots: BTreeMap<String, Arc<StoreSlot>>,
    finished: AtomicBool,
    state: watch::Sender<TransactionState>,
    undo: Mutex<Vec<UndoEntry>>,
    guards: Mutex<Vec<ScopeGuard>>,
}

impl TxInner {
    pub(crate) fn ensure_active(&self) -> Result<()> {
        if self.finished.load(Ordering::SeqCst) {
            return Err(ShelfError::engine(
                EngineErrorKind::TransactionInactive,
                format!("transaction {} has already finished", self.id),
            ));
        }
        Ok(())
    }

    fn ensure_writable(&self) -> Result<()> {
        self.ensure_active()?;
        if self.mode.is_read_only() {
            return Err(ShelfError::engine(
                EngineErrorKind::ReadOnly,
                format!("transaction {} is read-only", self.id),
            ));
        }
        Ok(())
    }

    fn slot(&self, name: &str) -> Result<&Arc<StoreSlot>> {
        self.slots.get(name).ok_or_else(|| {
            ShelfError::engine(
                EngineErrorKind::NotFound,
                format!("object store '{name}' is not in the transaction scope"),
            )
        })
    }

    fn commit(&self) {
        if self.finished.swap(true, Ordering::SeqCst) {
            return;
        }
        self.undo.lock().clear();
        self.state.send_replace(TransactionState::Committed);
        self.guards.lock().clear();
        debug!(tx = self.id, "Transaction committed");
    }

    fn abort_with(&self, reason: ShelfError) {
        if self.finished.swap(true, Ordering::SeqCst) {
            return;
        }
        self.rollback();
        warn!(tx = self.id, error = %reason, "Transaction aborted");
        self.state.send_replace(TransactionState::Aborted(reason));
        self.guards.lock().clear();
    }

    /// Apply the undo log in reverse.
    fn rollback(&self) {
        let entries = std::mem::take(&mut *self.undo.lock());
        for entry in entries.into_iter().rev() {
            match entry {
                UndoEntry::Record {
                    store,
                    key,
                    previous,
                } => {
                    if let Some(slot) = self.slots.get(&store) {
                        slot.data.lock().restore(key, previous);
                    }
                }
                UndoEntry::Generator { store, previous } => {
                    if let Some(slot) = self.slots.get(&store) {
                        slot.data.lock().restore_generator(previous);
                    }
                }
            }
        }
    }

    fn write(&self, store: &str, value: Value, key: Option<Key>, mode: WriteMode) -> Result<Key> {
        self.ensure_writable()?;
        let slot = self.slot(store)?;
        let result = slot.data.lock().write(value, key, mode);
        match result {
            Ok(outcome) => {
                let mut undo = self.undo.lock();
                if let Some(previous) = outcome.previous_generator {
                    undo.push(UndoEntry::Generator {
                        store: store.to_string(),
                        previous,
                    });
                }
                undo.push(UndoEntry::Record {
                    store: store.to_string(),
                    key: outcome.key.clone(),
                    previous: outcome.previous,
                });
                trace!(tx = self.id, store, key = %outcome.key, "Record written");
                Ok(outcome.key)
            }
            Err(err) => {
                // Failed write requests abort the whole transaction.
                if err.is_engine(EngineErrorKind::Constraint) || err.is_engine(EngineErrorKind::Data) {
                    self.abort_with(err.clone());
                }
                Err(err)
            }
        }
    }

    fn record_removals(&self, store: &str, removed: Vec<(Key, Value)>) {
        let mut undo = self.undo.lock();
        undo.extend(removed.into_iter().map(|(key, value)| UndoEntry::Record {
            store: store.to_string(),
            key,
            previous: Some(value),
        }));
    }
}

impl Drop for TxInner {
    fn drop(&mut self) {
        if !self.finished.load(Ordering::SeqCst) {
            self.abort_with(ShelfError::engine(
                EngineErrorKind::Abort,
                "transaction dropped before it was committed",
            ));
        }
    }
}

/// A transaction of the in-memory engine.
///
/// Dropping the last handle to an active transaction rolls it back.
#[derive(Debug)]
pub struct MemoryTransaction {
    inner: Arc<TxInner>,
}

impl MemoryTransaction {
    pub(crate) fn new(
        id: u64,
        mode: TransactionMode,
        scope: Vec<String>,
        slots: BTreeMap<String, Arc<StoreSlot>>,
        guards: Vec<ScopeGuard>,
    ) -> Self {
        let (state, _) = watch::channel(TransactionState::Active);
        Self {
            inner: Arc::new(TxInner {
                id,
                mode,
                scope,
                slots,
                finished: AtomicBool::new(false),
                state,
                undo: Mutex::new(Vec::new()),
                guards: Mutex::new(guards),
            }),
        }
    }
}

#[async_trait]
impl EngineTransaction for MemoryTransaction {
    fn id(&self) -> u64 {
        self.inner.id
    }

    fn mode(&self) -> TransactionMode {
        self.inner.mode
    }

    fn scope(&self) -> &[String] {
        &self.inner.scope
    }

    fn state(&self) -> TransactionState {
        self.inner.state.borrow().clone()
    }

    fn object_store(&self, name: &str) -> Result<Box<dyn ObjectStoreHandle>> {
        if self.inner.finished.load(Ordering::SeqCst) {
            return Err(ShelfError::engine(
                EngineErrorKind::InvalidState,
                format!("transaction {} has already finished", self.inner.id),
            ));
        }
        let slot = Arc::clone(self.inner.slot(name)?);
        Ok(Box::new(MemoryObjectStore {
            tx: Arc::clone(&self.inner),
            slot,
        }))
    }

    fn commit(&self) {
        self.inner.commit();
    }

    fn abort(&self) {
        self.inner.abort_with(ShelfError::engine(
            EngineErrorKind::Abort,
            format!("transaction {} was aborted", self.inner.id),
        ));
    }

    async fn done(&self) -> TransactionOutcome {
        let mut state = self.inner.state.subscribe();
        let terminal = match state.wait_for(TransactionState::is_terminal).await {
            Ok(state) => state.clone(),
            // The sender lives in `inner`, which `self` keeps alive.
            Err(_) => self.state(),
        };
        match terminal {
            TransactionState::Aborted(err) => TransactionOutcome::Aborted(err),
            _ => TransactionOutcome::Committed,
        }
    }
}

/// Object store handle bound to a transaction.
#[derive(Debug)]
pub struct MemoryObjectStore {
    tx: Arc<TxInner>,
    slot: Arc<StoreSlot>,
}

#[async_trait]
impl ObjectStoreHandle for MemoryObjectStore {
    fn name(&self) -> &str {
        &self.slot.name
    }

    fn key_path(&self) -> Option<KeyPath> {
        self.slot.data.lock().schema.key_path.clone()
    }

    fn auto_increment(&self) -> bool {
        self.slot.data.lock().schema.auto_increment
    }

    fn index_names(&self) -> Vec<String> {
        self.slot.data.lock().index_names()
    }

    async fn get(&self, query: &KeyQuery) -> Result<Option<Value>> {
        self.tx.ensure_active()?;
        Ok(self.slot.data.lock().get(query))
    }

    async fn get_all(&self, range: Option<&KeyRange>) -> Result<Vec<Value>> {
        self.tx.ensure_active()?;
        Ok(self.slot.data.lock().get_all(range))
    }

    async fn add(&self, value: Value, key: Option<Key>) -> Result<Key> {
        self.tx.write(&self.slot.name, value, key, WriteMode::Add)
    }

    async fn put(&self, value: Value, key: Option<Key>) -> Result<Key> {
        self.tx.write(&self.slot.name, value, key, WriteMode::Put)
    }

    async fn delete(&self, query: &KeyQuery) -> Result<()> {
        self.tx.ensure_writable()?;
        let removed = self.slot.data.lock().delete(query);
        trace!(tx = self.tx.id, store = %self.slot.name, %query, removed = removed.len(), "Records deleted");
        self.tx.record_removals(&self.slot.name, removed);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.tx.ensure_writable()?;
        let removed = self.slot.data.lock().clear();
        debug!(tx = self.tx.id, store = %self.slot.name, removed = removed.len(), "Store cleared");
        self.tx.record_removals(&self.slot.name, removed);
        Ok(())
    }

    async fn count(&self, range: Option<&KeyRange>) -> Result<u64> {
        self.tx.ensure_active()?;
        Ok(self.slot.data.lock().count(range))
    }

    async fn open_cursor(
        &self,
        range: Option<KeyRange>,
        direction: CursorDirection,
    ) -> Result<Box<dyn Cursor>> {
        self.tx.ensure_active()?;
        Ok(Box::new(MemoryCursor::new(
            Arc::clone(&self.tx),
            Arc::clone(&self.slot),
            CursorSource::Store,
            range,
            direction,
        )))
    }

    fn index(&self, name: &str) -> Result<Box<dyn IndexHandle>> {
        self.tx.ensure_active()?;
        let schema = self.slot.data.lock().index_schema(name).ok_or_else(|| {
            ShelfError::engine(
                EngineErrorKind::NotFound,
                format!("store '{}' has no index named '{name}'", self.slot.name),
            )
        })?;
        Ok(Box::new(MemoryIndex {
            tx: Arc::clone(&self.tx),
            slot: Arc::clone(&self.slot),
            schema,
        }))
    }
}

/// Index handle bound to a transaction.
#[derive(Debug)]
pub struct MemoryIndex {
    tx: Arc<TxInner>,
    slot: Arc<StoreSlot>,
    schema: IndexSchema,
}

#[async_trait]
impl IndexHandle for MemoryIndex {
    fn name(&self) -> &str {
        &self.schema.name
    }

    fn key_path(&self) -> KeyPath {
        self.schema.resolved_key_path()
    }

    fn unique(&self) -> bool {
        self.schema.unique
    }

    fn multi_entry(&self) -> bool {
        self.schema.multi_entry
    }

    async fn get(&self, query: &KeyQuery) -> Result<Option<Value>> {
        self.tx.ensure_active()?;
        Ok(self.slot.data.lock().index_get(&self.schema.name, query))
    }

    async fn count(&self, range: Option<&KeyRange>) -> Result<u64> {
        self.tx.ensure_active()?;
        Ok(self.slot.data.lock().index_count(&self.schema.name, range))
    }

    async fn open_cursor(
        &self,
        range: Option<KeyRange>,
        direction: CursorDirection,
    ) -> Result<Box<dyn Cursor>> {
        self.tx.ensure_active()?;
        Ok(Box::new(MemoryCursor::new(
            Arc::clone(&self.tx),
            Arc::clone(&self.slot),
            CursorSource::Index(self.schema.name.clone()),
            range,
            direction,
        )))
    }
}
