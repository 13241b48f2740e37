use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::json;
use shelfdb_client::{Database, DatabaseConfig, QueryResult, StoreSelection, TransactionCoordinator};
use shelfdb_common::{EngineErrorKind, ShelfError, Value};
use shelfdb_storage::{IndexSchema, MemoryEngine, StorageEngine, StoreSchema};

fn schema() -> DatabaseConfig {
    DatabaseConfig::new("tx-test")
        .with_store(
            StoreSchema::new("accounts")
                .key_path("id")
                .index(IndexSchema::new("owner").unique()),
        )
        .with_store(StoreSchema::new("ledger").auto_increment())
        .with_store(StoreSchema::new("audit").auto_increment())
}

fn account(id: i64, owner: &str, balance: i64) -> Value {
    Value::from_json(json!({"id": id, "owner": owner, "balance": balance}))
}

#[tokio::test]
async fn callback_error_rolls_back_every_write() {
    let db = Database::open_in_memory(&schema()).unwrap();

    let err = db
        .transaction(["accounts"], |tx| async move {
            tx.store("accounts").insert([account(1, "ada", 10)]).await?;
            tx.store("accounts").insert([account(2, "bob", 20)]).await?;
            Err::<(), _>(ShelfError::Transaction("changed my mind".into()))
        })
        .await
        .unwrap_err();

    assert_eq!(err, ShelfError::Transaction("changed my mind".into()));
    assert_eq!(db.count("accounts").await.unwrap(), 0);
}

#[tokio::test]
async fn callback_value_is_returned_after_commit() {
    let db = Database::open_in_memory(&schema()).unwrap();

    let moved = db
        .transaction(["accounts", "ledger"], |tx| async move {
            tx.store("accounts")
                .insert([account(1, "ada", 90), account(2, "bob", 10)])
                .await?;
            tx.store("ledger")
                .insert([Value::from_json(json!({"from": 1, "to": 2, "amount": 10}))])
                .await?;
            let ada = tx.store("accounts").find_by_key(1, true).await?;
            Ok(ada.record().and_then(|r| r.get_path("balance")).cloned())
        })
        .await
        .unwrap();

    assert_eq!(moved, Some(Value::from(90)));
    assert_eq!(db.count("accounts").await.unwrap(), 2);
    assert_eq!(db.count("ledger").await.unwrap(), 1);
}

#[tokio::test]
async fn swallowed_engine_error_still_aborts_the_unit() {
    let db = Database::open_in_memory(&schema()).unwrap();
    db.insert("accounts", [account(1, "ada", 10)]).await.unwrap();

    let err = db
        .transaction(["accounts", "ledger"], |tx| async move {
            tx.store("ledger").insert(["note"]).await?;
            // Ignore the unique index violation.
            let clash = tx.store("accounts").insert([account(2, "ada", 5)]).await;
            assert!(clash.is_err());
            Ok(())
        })
        .await
        .unwrap_err();

    assert!(err.is_engine(EngineErrorKind::Constraint), "{err}");
    assert_eq!(db.count("ledger").await.unwrap(), 0);
    assert_eq!(db.count("accounts").await.unwrap(), 1);
}

#[tokio::test]
async fn reads_inside_see_uncommitted_writes() {
    let db = Database::open_in_memory(&schema()).unwrap();

    let counts = db
        .transaction(StoreSelection::All, |tx| async move {
            tx.store("audit").insert(["a", "b", "c"]).await?;
            let inside = tx.store("audit").count().await?;
            tx.store("audit").remove(2).await?;
            let after_remove = tx.store("audit").find_all().await?;
            Ok((inside, after_remove))
        })
        .await
        .unwrap();

    assert_eq!(counts.0, QueryResult::Count(3));
    assert_eq!(
        counts.1.into_records(),
        vec![Value::from("a"), Value::from("c")]
    );
    assert_eq!(db.count("audit").await.unwrap(), 2);
}

#[tokio::test]
async fn unknown_stores_are_dropped_and_empty_selection_fails() {
    let engine: Arc<dyn StorageEngine> =
        Arc::new(MemoryEngine::with_stores("t", 1, schema().stores).unwrap());

    let coordinator = TransactionCoordinator::new(
        Arc::clone(&engine),
        ["ledger", "nope"],
        |_tx| async { Ok(()) },
    )
    .unwrap();
    assert_eq!(coordinator.stores(), ["ledger".to_string()]);
    coordinator.perform().await.unwrap();

    let err = TransactionCoordinator::new(engine, ["nope"], |_tx| async { Ok(()) })
        .err()
        .unwrap();
    assert_eq!(err, ShelfError::InvalidOperation("No valid stores specified".into()));
}

#[tokio::test]
async fn stores_outside_the_scope_are_not_found() {
    let db = Database::open_in_memory(&schema()).unwrap();

    let err = db
        .transaction(["ledger"], |tx| async move {
            tx.store("accounts").insert([account(1, "ada", 1)]).await?;
            Ok(())
        })
        .await
        .unwrap_err();
    assert!(err.is_engine(EngineErrorKind::NotFound));
    assert_eq!(db.count("accounts").await.unwrap(), 0);
}

#[tokio::test]
async fn concurrent_units_on_the_same_store_serialize() {
    let db = Database::open_in_memory(&schema()).unwrap();
    db.insert("accounts", [account(1, "ada", 0)]).await.unwrap();

    let increment = |db: Database| async move {
        db.transaction(["accounts"], |tx| async move {
            let current = tx.store("accounts").find_by_key(1, true).await?;
            let balance = current
                .record()
                .and_then(|r| r.get_path("balance"))
                .and_then(Value::as_i64)
                .unwrap_or_default();
            tx.store("accounts")
                .upsert([account(1, "ada", balance + 1)])
                .await?;
            Ok(())
        })
        .await
    };

    let tasks: Vec<_> = (0..10)
        .map(|_| tokio::spawn(increment(db.clone())))
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let ada = db.find_by_key("accounts", 1).await.unwrap().unwrap();
    assert_eq!(ada.get_path("balance"), Some(&Value::from(10)));
}
