use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;
use shelfdb_client::{Database, DatabaseConfig, QueryResult, QueryType};
use shelfdb_common::{EngineErrorKind, Key, KeyRange, ShelfError, Value};
use shelfdb_storage::{IndexSchema, MemoryEngine, StorageEngine, StoreSchema};
use tokio::sync::oneshot;

fn schema() -> DatabaseConfig {
    DatabaseConfig::new("test")
        .with_store(
            StoreSchema::new("people")
                .key_path("id")
                .index(IndexSchema::new("age"))
                .index(IndexSchema::new("email").unique()),
        )
        .with_store(StoreSchema::new("notes").auto_increment())
        .with_store(StoreSchema::new("settings"))
}

fn open() -> Database {
    Database::open_in_memory(&schema()).unwrap()
}

fn person(id: i64, name: &str, age: Option<i64>) -> Value {
    let mut record = json!({"id": id, "name": name, "email": format!("{name}@example.com")});
    if let Some(age) = age {
        record["age"] = json!(age);
    }
    Value::from_json(record)
}

fn ids(records: &[Value]) -> Vec<i64> {
    records
        .iter()
        .filter_map(|r| r.get_path("id").and_then(Value::as_i64))
        .collect()
}

#[tokio::test]
async fn insert_then_find_returns_equal_record() {
    let db = open();
    let ada = person(1, "ada", Some(36));

    let inserted = db.store("people").insert([ada.clone()]).await.unwrap();
    assert_eq!(inserted, QueryResult::Records(vec![ada.clone()]));

    let found = db.store("people").find_by_key(1, true).await.unwrap();
    assert_eq!(found.record(), Some(&ada));
}

#[tokio::test]
async fn nested_payloads_round_trip() {
    let db = open();
    let record = Value::from_json(json!({
        "id": 7,
        "name": "grace",
        "address": {"city": "Arlington", "lines": ["1 Navy Way", {"unit": 3}]},
        "scores": [1.5, 2, null],
    }));
    db.upsert("people", [record.clone()]).await.unwrap();
    assert_eq!(db.find_by_key("people", 7).await.unwrap(), Some(record));
}

#[tokio::test]
async fn upsert_overwrites_and_insert_rejects_duplicates() {
    let db = open();
    db.insert("people", [person(1, "ada", Some(36))]).await.unwrap();

    db.upsert("people", [person(1, "ada", Some(37))]).await.unwrap();
    let found = db.find_by_key("people", 1).await.unwrap().unwrap();
    assert_eq!(found.get_path("age"), Some(&Value::from(37)));

    let err = db.insert("people", [person(1, "ada", Some(38))]).await.unwrap_err();
    assert!(err.is_engine(EngineErrorKind::Constraint), "{err}");
    assert_eq!(db.count("people").await.unwrap(), 1);
}

#[tokio::test]
async fn failed_batch_leaves_nothing_behind() {
    let db = open();
    db.insert("people", [person(2, "bob", None)]).await.unwrap();

    let err = db
        .insert(
            "people",
            [person(3, "cy", None), person(2, "bob", None), person(4, "di", None)],
        )
        .await
        .unwrap_err();
    assert!(err.is_engine(EngineErrorKind::Constraint));
    assert_eq!(db.count("people").await.unwrap(), 1);
}

#[tokio::test]
async fn find_all_returns_every_record_in_key_order() {
    let db = open();
    db.insert(
        "people",
        [
            person(3, "c", Some(1)),
            person(1, "a", Some(2)),
            person(2, "b", Some(3)),
        ],
    )
    .await
    .unwrap();

    let before = db.count("people").await.unwrap();
    let all = db.store("people").find_all().await.unwrap().into_records();
    assert_eq!(all.len() as u64, before);
    assert_eq!(ids(&all), vec![1, 2, 3]);
}

#[tokio::test]
async fn remove_then_find() {
    let db = open();
    db.insert("people", [person(1, "ada", None)]).await.unwrap();

    let removed = db.store("people").remove(1).await.unwrap();
    assert!(removed.is_acknowledged());
    // Removing a missing key still succeeds.
    assert!(db.store("people").remove(1).await.unwrap().is_acknowledged());

    let err = db.store("people").find_by_key(1, true).await.unwrap_err();
    assert_eq!(err.kind(), "not_found");
    let missing = db.store("people").find_by_key(1, false).await.unwrap();
    assert_eq!(missing, QueryResult::Record(None));
}

#[tokio::test]
async fn remove_accepts_key_ranges() {
    let db = open();
    db.insert("people", (1..=5).map(|id| person(id, &format!("p{id}"), None)))
        .await
        .unwrap();
    db.store("people")
        .remove(KeyRange::bound(2, 4, false, false).unwrap())
        .await
        .unwrap();
    let left = db.store("people").find_all().await.unwrap().into_records();
    assert_eq!(ids(&left), vec![1, 5]);
}

#[tokio::test]
async fn clear_then_count_is_zero() {
    let db = open();
    db.insert("people", [person(1, "a", None), person(2, "b", None)])
        .await
        .unwrap();
    let cleared = db.store("people").clear().await.unwrap();
    assert!(cleared.is_acknowledged());
    assert_eq!(db.store("people").count().await.unwrap(), QueryResult::Count(0));
}

#[tokio::test]
async fn index_range_skips_records_without_the_field() {
    let db = open();
    let ages = [Some(25), None, Some(20), Some(31), Some(30)];
    db.insert(
        "people",
        ages.iter()
            .enumerate()
            .map(|(i, age)| person(i as i64 + 1, &format!("p{i}"), *age)),
    )
    .await
    .unwrap();

    let found = db
        .store("people")
        .find()
        .where_index("age")
        .greater_than(22)
        .await
        .unwrap()
        .into_records();

    let found_ages: Vec<i64> = found
        .iter()
        .filter_map(|r| r.get_path("age").and_then(Value::as_i64))
        .collect();
    assert_eq!(found_ages, vec![25, 30, 31]);
}

#[tokio::test]
async fn index_range_combines_with_field_filters() {
    let db = open();
    db.insert(
        "people",
        [
            Value::from_json(json!({"id": 1, "age": 40, "city": "Paris", "email": "1"})),
            Value::from_json(json!({"id": 2, "age": 23, "city": "Paris", "email": "2"})),
            Value::from_json(json!({"id": 3, "age": 50, "city": "Rome", "email": "3"})),
            Value::from_json(json!({"id": 4, "age": 18, "city": "Paris", "email": "4"})),
            Value::from_json(json!({"id": 5, "age": 30, "email": "5"})),
        ],
    )
    .await
    .unwrap();

    let found = db
        .store("people")
        .find()
        .where_index("age")
        .greater_than(20)
        .where_field("city")
        .equals("Paris")
        .await
        .unwrap()
        .into_records();

    // Ascending by index value: 23 then 40.
    assert_eq!(ids(&found), vec![2, 1]);
}

#[tokio::test]
async fn field_conditions_alone_scan_the_store() {
    let db = open();
    db.insert(
        "people",
        [
            person(1, "a", Some(10)),
            person(2, "b", Some(20)),
            person(3, "c", Some(30)),
        ],
    )
    .await
    .unwrap();

    let found = db
        .store("people")
        .find()
        .where_field("age")
        .between(10, 30)
        .await
        .unwrap();
    assert_eq!(ids(found.records()), vec![2]);

    let found = db
        .store("people")
        .find()
        .where_field("age")
        .range(10, 30)
        .where_field("name")
        .equals("c")
        .await
        .unwrap();
    assert_eq!(ids(found.records()), vec![3]);
}

#[tokio::test]
async fn key_conditions_restrict_the_primary_key_range() {
    let db = open();
    db.insert("people", (1..=6).map(|id| person(id, &format!("p{id}"), Some(id * 10))))
        .await
        .unwrap();

    let found = db
        .store("people")
        .find()
        .where_key()
        .greater_than_equal(4)
        .where_field("age")
        .less_than(60)
        .await
        .unwrap();
    assert_eq!(ids(found.records()), vec![4, 5]);
}

#[tokio::test]
async fn two_range_conditions_are_rejected() {
    let db = open();
    let err = db
        .store("people")
        .find()
        .where_index("age")
        .greater_than(1)
        .where_index("email")
        .equals("x")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "invalid_query");
}

#[tokio::test]
async fn count_on_an_index_counts_indexed_records() {
    let db = open();
    db.insert(
        "people",
        [person(1, "a", Some(1)), person(2, "b", None), person(3, "c", Some(3))],
    )
    .await
    .unwrap();

    let count = db.store("people").count_index("age").await.unwrap();
    assert_eq!(count.count(), Some(2));
    assert_eq!(db.store("people").count().await.unwrap().count(), Some(3));

    let err = db.store("people").count_index("height").await.unwrap_err();
    assert_eq!(err, ShelfError::IndexNotFound("store 'people' has no index named 'height'".into()));
}

#[tokio::test]
async fn missing_index_in_a_condition_is_reported() {
    let db = open();
    let err = db
        .store("people")
        .find()
        .where_index("height")
        .equals(180)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "index_not_found");
}

#[tokio::test]
async fn unique_index_violation_is_a_constraint_error() {
    let db = open();
    db.insert("people", [person(1, "ada", None)]).await.unwrap();
    let clash = Value::from_json(json!({"id": 2, "email": "ada@example.com"}));
    let err = db.insert("people", [clash]).await.unwrap_err();
    assert!(err.is_engine(EngineErrorKind::Constraint));
    assert_eq!(db.count("people").await.unwrap(), 1);
}

#[tokio::test]
async fn out_of_line_keys_and_generated_keys() {
    let db = open();
    db.store("settings")
        .insert_with_key("dark", "theme")
        .await
        .unwrap();
    db.store("settings")
        .upsert_with_key("light", "theme")
        .await
        .unwrap();
    assert_eq!(
        db.find_by_key("settings", "theme").await.unwrap(),
        Some(Value::from("light"))
    );

    let err = db.insert("settings", ["no key"]).await.unwrap_err();
    assert!(err.is_engine(EngineErrorKind::Data));

    db.insert("notes", ["first", "second"]).await.unwrap();
    let notes = db.store("notes").find_all().await.unwrap();
    assert_eq!(notes.records(), &[Value::from("first"), Value::from("second")]);
    assert_eq!(db.find_by_key("notes", 2).await.unwrap(), Some(Value::from("second")));
}

#[tokio::test]
async fn negative_zero_and_zero_are_one_key() {
    let db = open();
    db.store("settings").insert_with_key("zero", 0).await.unwrap();
    assert_eq!(
        db.find_by_key("settings", Key::from(-0.0)).await.unwrap(),
        Some(Value::from("zero"))
    );

    let err = db
        .store("settings")
        .insert_with_key("negative zero", -0.0)
        .await
        .unwrap_err();
    assert!(err.is_engine(EngineErrorKind::Constraint), "{err}");
    assert_eq!(db.count("settings").await.unwrap(), 1);

    db.insert(
        "people",
        [Value::from_json(json!({"id": 1, "age": -0.0, "email": "z"}))],
    )
    .await
    .unwrap();
    let by_index = db
        .store("people")
        .find()
        .where_index("age")
        .equals(0)
        .await
        .unwrap();
    let by_field = db
        .store("people")
        .find()
        .where_field("age")
        .equals(0)
        .await
        .unwrap();
    assert_eq!(ids(by_index.records()), vec![1]);
    assert_eq!(by_index, by_field);
}

#[tokio::test]
async fn integer_keys_beyond_two_pow_53_are_rejected() {
    let db = open();
    let limit: i64 = 1 << 53;
    db.insert("people", [person(limit, "edge", None)]).await.unwrap();

    let err = db
        .insert("people", [person(limit + 1, "past", None)])
        .await
        .unwrap_err();
    assert!(err.is_engine(EngineErrorKind::Data), "{err}");
    assert_eq!(db.count("people").await.unwrap(), 1);
    assert_eq!(ids(&db.store("people").find_all().await.unwrap().into_records()), vec![limit]);
}

#[tokio::test]
async fn resetting_the_method_keeps_the_last_one() {
    let db = open();
    db.insert("people", [person(1, "a", None)]).await.unwrap();

    let query = db.store("people").find_all().count();
    assert_eq!(query.query_type(), Some(QueryType::Count));
    assert_eq!(query.await.unwrap(), QueryResult::Count(1));
}

#[tokio::test]
async fn unknown_store_is_a_not_found_engine_error() {
    let db = open();
    let err = db.store("ghosts").find_all().await.unwrap_err();
    assert!(err.is_engine(EngineErrorKind::NotFound));
}

#[tokio::test]
async fn queries_wait_for_the_connection_to_open() {
    let (open, opened) = oneshot::channel::<Arc<dyn StorageEngine>>();
    let db = Database::new(async move {
        opened
            .await
            .map_err(|_| ShelfError::Io("connection attempt abandoned".into()))
    });

    let insert = db.store("people").insert([person(1, "ada", Some(36))]);
    let pending = tokio::spawn(insert.into_future());

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!pending.is_finished());

    let engine = MemoryEngine::with_stores("late", 1, schema().stores).unwrap();
    open.send(Arc::new(engine)).ok().unwrap();

    pending.await.unwrap().unwrap();
    assert_eq!(db.count("people").await.unwrap(), 1);
    assert_eq!(db.store_names().await.unwrap(), vec!["notes", "people", "settings"]);
}

#[tokio::test]
async fn failed_connection_fails_every_query() {
    let db = Database::new(async { Err::<Arc<dyn StorageEngine>, _>(ShelfError::Io("refused".into())) });
    let err = db.store("people").find_all().await.unwrap_err();
    assert_eq!(err, ShelfError::Io("refused".into()));
    assert!(db.store("people").count().await.is_err());
}
