//! Runs a `QueryPlan` against the engine.

use futures::future::try_join_all;
use shelfdb_common::{KeyRange, Result, ShelfError, Value};
use shelfdb_storage::{CursorDirection, EngineTransaction, ObjectStoreHandle};
use tracing::{debug, trace, warn};

use crate::condition::WhereCondition;
use crate::context::{PendingContext, TransactionContext};
use crate::query::{Operation, QueryPlan, ScanRange};
use crate::result::QueryResult;

/// Execute a plan.
///
/// Outside a coordinated transaction the query opens its own transaction
/// over its store, commits it once the operation succeeded and waits for the
/// commit; on failure it aborts and waits for the abort. Inside one, the
/// coordinator owns the transaction and the query does neither.
pub async fn execute(
    plan: QueryPlan,
    context: PendingContext,
    inside_transaction: bool,
) -> Result<QueryResult> {
    let tx = match context.await? {
        TransactionContext::Connection(engine) => {
            engine
                .open_transaction(std::slice::from_ref(&plan.store), plan.mode())
                .await?
        }
        TransactionContext::Shared(tx) => tx,
    };

    debug!(
        tx = tx.id(),
        store = %plan.store,
        query = %plan.query_type,
        inside_transaction,
        "Executing query"
    );

    let result = run(&plan, tx.as_ref()).await;
    if inside_transaction {
        return result;
    }

    match result {
        Ok(value) => {
            tx.commit();
            tx.done().await.into_result()?;
            Ok(value)
        }
        Err(err) => {
            warn!(tx = tx.id(), store = %plan.store, error = %err, "Query failed, aborting its transaction");
            tx.abort();
            tx.done().await;
            Err(err)
        }
    }
}

async fn run(plan: &QueryPlan, tx: &dyn EngineTransaction) -> Result<QueryResult> {
    let store = tx.object_store(&plan.store)?;
    let store = store.as_ref();

    match &plan.operation {
        Operation::Get { key, required } => {
            let record = store.get(key).await?;
            if record.is_none() && *required {
                return Err(ShelfError::NotFound(format!(
                    "no record in store '{}' for key {key}",
                    plan.store
                )));
            }
            Ok(QueryResult::Record(record))
        }
        Operation::Scan { range, filters } => {
            scan(store, range.as_ref(), filters).await.map(QueryResult::Records)
        }
        Operation::FindAll => scan(store, None, &[]).await.map(QueryResult::Records),
        Operation::Write {
            values,
            key,
            overwrite,
        } => {
            let overwrite = *overwrite;
            let requests = values.iter().cloned().map(|value| {
                let key = key.clone();
                async move {
                    if overwrite {
                        store.put(value, key).await
                    } else {
                        store.add(value, key).await
                    }
                }
            });
            let keys = try_join_all(requests).await?;
            debug!(store = %plan.store, written = keys.len(), "Records written");
            Ok(QueryResult::Records(values.clone()))
        }
        Operation::Remove { key } => {
            store.delete(key).await?;
            Ok(QueryResult::Acknowledged(true))
        }
        Operation::Clear => {
            store.clear().await?;
            Ok(QueryResult::Acknowledged(true))
        }
        Operation::Count { index: Some(name) } => {
            ensure_index(store, name)?;
            let count = store.index(name)?.count(None).await?;
            Ok(QueryResult::Count(count))
        }
        Operation::Count { index: None } => Ok(QueryResult::Count(store.count(None).await?)),
    }
}

fn ensure_index(store: &dyn ObjectStoreHandle, name: &str) -> Result<()> {
    if store.index_names().iter().any(|index| index == name) {
        Ok(())
    } else {
        Err(ShelfError::IndexNotFound(format!(
            "store '{}' has no index named '{name}'",
            store.name()
        )))
    }
}

/// Walk one forward cursor and keep the records every filter accepts.
async fn scan(
    store: &dyn ObjectStoreHandle,
    range: Option<&ScanRange>,
    filters: &[WhereCondition],
) -> Result<Vec<Value>> {
    let filters = filters
        .iter()
        .map(|filter| -> Result<_> { Ok((filter.name(), filter.comparator()?)) })
        .collect::<Result<Vec<_>>>()?;

    let mut cursor = match range {
        Some(ScanRange::Index { name, range }) => {
            ensure_index(store, name)?;
            store
                .index(name)?
                .open_cursor(Some(range.clone()), CursorDirection::Next)
                .await?
        }
        Some(ScanRange::PrimaryKey(range)) => {
            store
                .open_cursor(Some(range.clone()), CursorDirection::Next)
                .await?
        }
        None => store.open_cursor(None::<KeyRange>, CursorDirection::Next).await?,
    };

    let mut records = Vec::new();
    while let Some(entry) = cursor.next().await? {
        let accepted = filters
            .iter()
            .all(|(field, accept)| accept(entry.value.get_path(field)));
        trace!(store = store.name(), key = %entry.primary_key, accepted, "Cursor step");
        if accepted {
            records.push(entry.value);
        }
    }
    Ok(records)
}
