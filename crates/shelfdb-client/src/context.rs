//! Where a query gets its transaction from.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use shelfdb_common::Result;
use shelfdb_storage::{EngineTransaction, StorageEngine};

/// Resolved execution context of a query.
#[derive(Clone)]
pub enum TransactionContext {
    /// The whole connection; the query opens its own transaction.
    Connection(Arc<dyn StorageEngine>),
    /// A coordinator's transaction, shared by every query of the unit.
    Shared(Arc<dyn EngineTransaction>),
}

impl fmt::Debug for TransactionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionContext::Connection(engine) => f
                .debug_tuple("Connection")
                .field(&engine.name())
                .finish(),
            TransactionContext::Shared(tx) => f.debug_tuple("Shared").field(&tx.id()).finish(),
        }
    }
}

/// A context that may not be available yet. Cloning is cheap and every clone
/// resolves to the same context.
pub type PendingContext = Shared<BoxFuture<'static, Result<TransactionContext>>>;

/// Wrap a future resolving to a context.
pub fn pending<F>(future: F) -> PendingContext
where
    F: Future<Output = Result<TransactionContext>> + Send + 'static,
{
    future.boxed().shared()
}

/// A context that is already available.
pub fn ready(context: TransactionContext) -> PendingContext {
    pending(futures::future::ready(Ok(context)))
}
