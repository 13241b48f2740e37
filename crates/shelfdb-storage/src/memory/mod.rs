//! In-memory transactional engine.
//!
//! Each object store keeps its records in a `BTreeMap` ordered by key, with
//! one `BTreeMap` per secondary index mapping index keys to primary keys.
//! Transactions lock their whole scope for their lifetime: read-only
//! transactions share it, read-write transactions hold it exclusively.
//! Scopes are locked in store-name order so overlapping transactions cannot
//! deadlock each other.

mod cursor;
mod store;
mod transaction;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use shelfdb_common::{EngineErrorKind, Result, ShelfError};
use tracing::{debug, info};

use crate::schema::{IndexSchema, StoreSchema};
use crate::traits::{EngineTransaction, StorageEngine, TransactionMode};

pub use cursor::MemoryCursor;
pub use transaction::{MemoryIndex, MemoryObjectStore, MemoryTransaction};

use store::StoreData;
use transaction::ScopeGuard;

/// One object store: its scope lock and its data.
#[derive(Debug)]
pub(crate) struct StoreSlot {
    pub name: String,
    /// Held for the lifetime of every transaction whose scope includes the
    /// store.
    scope_lock: Arc<tokio::sync::RwLock<()>>,
    pub data: Mutex<StoreData>,
}

impl StoreSlot {
    fn new(schema: StoreSchema) -> Result<Self> {
        Ok(Self {
            name: schema.name.clone(),
            scope_lock: Arc::new(tokio::sync::RwLock::new(())),
            data: Mutex::new(StoreData::new(schema)?),
        })
    }
}

/// An in-memory database.
///
/// Cloning yields another handle to the same database.
#[derive(Debug, Clone)]
pub struct MemoryEngine {
    inner: Arc<EngineInner>,
}

#[derive(Debug)]
struct EngineInner {
    name: String,
    version: u32,
    stores: RwLock<BTreeMap<String, Arc<StoreSlot>>>,
    next_tx_id: AtomicU64,
}

impl MemoryEngine {
    /// Create an empty database.
    pub fn new(name: impl Into<String>, version: u32) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                name: name.into(),
                version,
                stores: RwLock::new(BTreeMap::new()),
                next_tx_id: AtomicU64::new(1),
            }),
        }
    }

    /// Create a database with the given object stores.
    pub fn with_stores(
        name: impl Into<String>,
        version: u32,
        stores: impl IntoIterator<Item = StoreSchema>,
    ) -> Result<Self> {
        let engine = Self::new(name, version);
        for schema in stores {
            engine.create_object_store(schema)?;
        }
        Ok(engine)
    }

    /// Add an object store.
    ///
    /// Schema changes are meant for setup; they do not wait for running
    /// transactions.
    pub fn create_object_store(&self, schema: StoreSchema) -> Result<()> {
        let mut stores = self.inner.stores.write();
        if stores.contains_key(&schema.name) {
            return Err(ShelfError::constraint(format!(
                "object store '{}' already exists",
                schema.name
            )));
        }
        let slot = StoreSlot::new(schema)?;
        info!(
            database = %self.inner.name,
            store = %slot.name,
            "Created object store"
        );
        stores.insert(slot.name.clone(), Arc::new(slot));
        Ok(())
    }

    /// Remove an object store and its records.
    pub fn delete_object_store(&self, name: &str) -> Result<()> {
        match self.inner.stores.write().remove(name) {
            Some(_) => {
                info!(database = %self.inner.name, store = name, "Deleted object store");
                Ok(())
            }
            None => Err(ShelfError::engine(
                EngineErrorKind::NotFound,
                format!("object store '{name}' does not exist"),
            )),
        }
    }

    /// Add an index to an existing store, indexing the records it holds.
    pub fn create_index(&self, store: &str, index: IndexSchema) -> Result<()> {
        let slot = self.inner.stores.read().get(store).cloned().ok_or_else(|| {
            ShelfError::engine(
                EngineErrorKind::NotFound,
                format!("object store '{store}' does not exist"),
            )
        })?;
        let name = index.name.clone();
        slot.data.lock().create_index(index)?;
        info!(store, index = %name, "Created index");
        Ok(())
    }

    /// Definition of a store, if it exists.
    pub fn store_schema(&self, name: &str) -> Option<StoreSchema> {
        let slot = self.inner.stores.read().get(name).cloned()?;
        let schema = slot.data.lock().schema.clone();
        Some(schema)
    }
}

#[async_trait]
impl StorageEngine for MemoryEngine {
    fn name(&self) -> &str {
        &self.inner.name
    }

    fn version(&self) -> u32 {
        self.inner.version
    }

    fn store_names(&self) -> Vec<String> {
        self.inner.stores.read().keys().cloned().collect()
    }

    async fn open_transaction(
        &self,
        stores: &[String],
        mode: TransactionMode,
    ) -> Result<Arc<dyn EngineTransaction>> {
        if stores.is_empty() {
            return Err(ShelfError::engine(
                EngineErrorKind::InvalidAccess,
                "a transaction needs at least one object store",
            ));
        }

        let mut scope = stores.to_vec();
        scope.sort();
        scope.dedup();

        let slots = {
            let registry = self.inner.stores.read();
            scope
                .iter()
                .map(|name| {
                    registry
                        .get(name)
                        .map(|slot| (name.clone(), Arc::clone(slot)))
                        .ok_or_else(|| {
                            ShelfError::engine(
                                EngineErrorKind::NotFound,
                                format!("object store '{name}' does not exist"),
                            )
                        })
                })
                .collect::<Result<BTreeMap<_, _>>>()?
        };

        // BTreeMap iteration keeps the lock order stable across transactions.
        let mut guards = Vec::with_capacity(slots.len());
        for slot in slots.values() {
            let lock = Arc::clone(&slot.scope_lock);
            guards.push(match mode {
                TransactionMode::ReadOnly => ScopeGuard::Shared {
                    _guard: lock.read_owned().await,
                },
                TransactionMode::ReadWrite => ScopeGuard::Exclusive {
                    _guard: lock.write_owned().await,
                },
            });
        }

        let id = self.inner.next_tx_id.fetch_add(1, Ordering::SeqCst);
        debug!(tx = id, %mode, stores = ?scope, "Transaction opened");
        Ok(Arc::new(MemoryTransaction::new(id, mode, scope, slots, guards)))
    }
}
