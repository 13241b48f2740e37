//! Connection facade.

use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use shelfdb_common::{Key, KeyQuery, Result, Value};
use shelfdb_storage::{MemoryEngine, StorageEngine};
use tracing::info;

use crate::config::DatabaseConfig;
use crate::context::{self, TransactionContext};
use crate::query::Query;
use crate::transaction::{StoreSelection, TransactionCoordinator, TransactionScope};

type Connection = Shared<BoxFuture<'static, Result<Arc<dyn StorageEngine>>>>;

/// Handle to a database.
///
/// The connection is opened lazily: queries can be built and awaited before
/// it is available and run once it opens. Every query obtained through
/// `store` runs in its own transaction; use `transaction` to group queries.
/// Cloning is cheap.
#[derive(Clone)]
pub struct Database {
    connection: Connection,
}

impl Database {
    /// Wrap a future that opens the connection. It is polled when the first
    /// query runs.
    pub fn new<F>(open: F) -> Self
    where
        F: Future<Output = Result<Arc<dyn StorageEngine>>> + Send + 'static,
    {
        Self {
            connection: open.boxed().shared(),
        }
    }

    /// Use an engine that is already open.
    pub fn from_engine(engine: Arc<dyn StorageEngine>) -> Self {
        Self::new(futures::future::ready(Ok(engine)))
    }

    /// Open an in-memory database with the configured stores.
    pub fn open_in_memory(config: &DatabaseConfig) -> Result<Self> {
        config.validate()?;
        let engine = MemoryEngine::with_stores(&config.name, config.version, config.stores.clone())?;
        info!(
            database = %config.name,
            version = config.version,
            stores = config.stores.len(),
            "Opened in-memory database"
        );
        Ok(Self::from_engine(Arc::new(engine)))
    }

    /// The engine, once the connection is open.
    pub async fn engine(&self) -> Result<Arc<dyn StorageEngine>> {
        self.connection.clone().await
    }

    pub async fn store_names(&self) -> Result<Vec<String>> {
        Ok(self.engine().await?.store_names())
    }

    /// Start a query on `store`.
    pub fn store(&self, name: impl Into<String>) -> Query {
        let connection = self.connection.clone();
        let context =
            context::pending(async move { connection.await.map(TransactionContext::Connection) });
        Query::new(name, context, false)
    }

    /// Run `callback` with every query it issues through its scope bound to
    /// one read-write transaction over `stores`.
    pub async fn transaction<F, Fut, T>(
        &self,
        stores: impl Into<StoreSelection>,
        callback: F,
    ) -> Result<T>
    where
        F: FnOnce(TransactionScope) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let engine = self.engine().await?;
        TransactionCoordinator::new(engine, stores, callback)?
            .perform()
            .await
    }

    /// Insert records and return the inserted items.
    pub async fn insert<I, V>(&self, store: &str, values: I) -> Result<Vec<Value>>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Ok(self.store(store).insert(values).await?.into_records())
    }

    /// Insert or overwrite records and return the written items.
    pub async fn upsert<I, V>(&self, store: &str, values: I) -> Result<Vec<Value>>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Ok(self.store(store).upsert(values).await?.into_records())
    }

    /// The record stored under `key`, if any.
    pub async fn find_by_key(&self, store: &str, key: impl Into<KeyQuery>) -> Result<Option<Value>> {
        Ok(self.store(store).find_by_key(key, false).await?.into_record())
    }

    /// Number of records in `store`.
    pub async fn count(&self, store: &str) -> Result<u64> {
        Ok(self.store(store).count().await?.count().unwrap_or_default())
    }

    /// Delete the record stored under `key`.
    pub async fn remove(&self, store: &str, key: impl Into<Key>) -> Result<()> {
        self.store(store).remove(key.into()).await?;
        Ok(())
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self.connection.peek() {
            Some(Ok(engine)) => engine.name().to_string(),
            Some(Err(err)) => format!("failed: {err}"),
            None => "opening".to_string(),
        };
        f.debug_struct("Database").field("connection", &state).finish()
    }
}
