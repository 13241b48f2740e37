//! Coordinated transactions.
//!
//! A coordinator runs a callback that may issue any number of queries, all
//! bound to one read-write transaction over the declared stores. The
//! coordinator settles only after that transaction reached a terminal state:
//! the callback's value is returned once the commit completed, and any
//! failure (from the callback or from the engine) rolls back every write
//! made through the scope.

use std::future::Future;
use std::sync::Arc;

use shelfdb_common::{Result, ShelfError};
use shelfdb_storage::{StorageEngine, TransactionMode, TransactionOutcome};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::context::{self, PendingContext, TransactionContext};
use crate::query::Query;

/// Stores taking part in a coordinated transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreSelection {
    /// Every store of the connection.
    All,
    Only(Vec<String>),
}

impl From<Vec<String>> for StoreSelection {
    fn from(stores: Vec<String>) -> Self {
        StoreSelection::Only(stores)
    }
}

impl From<Vec<&str>> for StoreSelection {
    fn from(stores: Vec<&str>) -> Self {
        StoreSelection::Only(stores.into_iter().map(String::from).collect())
    }
}

impl From<&[&str]> for StoreSelection {
    fn from(stores: &[&str]) -> Self {
        StoreSelection::Only(stores.iter().map(|s| s.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for StoreSelection {
    fn from(stores: [&str; N]) -> Self {
        StoreSelection::Only(stores.iter().map(|s| s.to_string()).collect())
    }
}

impl From<&str> for StoreSelection {
    fn from(store: &str) -> Self {
        StoreSelection::Only(vec![store.to_string()])
    }
}

/// View of the database handed to a coordinated callback.
///
/// Queries minted here join the coordinated transaction. Awaiting a query
/// obtained from `Database::store` inside the callback instead opens a
/// separate transaction, which waits for this one if the scopes overlap.
#[derive(Clone)]
pub struct TransactionScope {
    context: PendingContext,
    stores: Arc<[String]>,
}

impl TransactionScope {
    /// Start a query on `store` inside the transaction.
    pub fn store(&self, name: impl Into<String>) -> Query {
        Query::new(name, self.context.clone(), true)
    }

    /// Stores the transaction covers.
    pub fn stores(&self) -> &[String] {
        &self.stores
    }
}

impl std::fmt::Debug for TransactionScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionScope")
            .field("stores", &self.stores)
            .finish_non_exhaustive()
    }
}

/// Runs a callback inside one transaction.
pub struct TransactionCoordinator<F> {
    engine: Arc<dyn StorageEngine>,
    stores: Vec<String>,
    callback: F,
}

impl<F, Fut, T> TransactionCoordinator<F>
where
    F: FnOnce(TransactionScope) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    /// Resolve the participating stores.
    ///
    /// Names the connection does not know are dropped; if none remain the
    /// coordinator cannot be created.
    pub fn new(
        engine: Arc<dyn StorageEngine>,
        stores: impl Into<StoreSelection>,
        callback: F,
    ) -> Result<Self> {
        let available = engine.store_names();
        let stores: Vec<String> = match stores.into() {
            StoreSelection::All => available,
            StoreSelection::Only(requested) => {
                let (known, unknown): (Vec<_>, Vec<_>) = requested
                    .into_iter()
                    .partition(|name| available.contains(name));
                if !unknown.is_empty() {
                    warn!(stores = ?unknown, "Ignoring unknown stores in transaction");
                }
                known
            }
        };

        if stores.is_empty() {
            return Err(ShelfError::InvalidOperation("No valid stores specified".into()));
        }

        Ok(Self {
            engine,
            stores,
            callback,
        })
    }

    pub fn stores(&self) -> &[String] {
        &self.stores
    }

    /// Run the callback and settle with the transaction's outcome.
    pub async fn perform(self) -> Result<T> {
        let Self {
            engine,
            stores,
            callback,
        } = self;

        let (opened, pending) = oneshot::channel::<Result<TransactionContext>>();
        let context = context::pending(async move {
            pending.await.unwrap_or_else(|_| {
                Err(ShelfError::Transaction(
                    "coordinated transaction was never opened".into(),
                ))
            })
        });

        let scope = TransactionScope {
            context,
            stores: stores.clone().into(),
        };
        let work = callback(scope);

        let tx = match engine.open_transaction(&stores, TransactionMode::ReadWrite).await {
            Ok(tx) => tx,
            Err(err) => {
                let _ = opened.send(Err(err.clone()));
                return Err(err);
            }
        };
        let _ = opened.send(Ok(TransactionContext::Shared(Arc::clone(&tx))));
        debug!(tx = tx.id(), stores = ?stores, "Coordinated transaction started");

        match work.await {
            Ok(value) => {
                tx.commit();
                match tx.done().await {
                    TransactionOutcome::Committed => {
                        debug!(tx = tx.id(), "Coordinated transaction committed");
                        Ok(value)
                    }
                    TransactionOutcome::Aborted(err) => {
                        warn!(tx = tx.id(), error = %err, "Coordinated transaction aborted by the engine");
                        Err(err)
                    }
                }
            }
            Err(err) => {
                warn!(tx = tx.id(), error = %err, "Transaction callback failed, rolling back");
                tx.abort();
                tx.done().await;
                Err(err)
            }
        }
    }
}
