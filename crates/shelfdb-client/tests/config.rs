use std::fs;

use pretty_assertions::assert_eq;
use shelfdb_client::{Config, Database, logging};
use shelfdb_common::Value;
use tempfile::tempdir;

const LIBRARY: &str = r#"
[database]
name = "library"
version = 2

[[database.stores]]
name = "books"
key_path = "isbn"

[[database.stores.indexes]]
name = "author"

[logging]
level = "warn"
ansi = false
"#;

// Environment variables are process-wide, so every case that touches them
// lives in this one test.
#[tokio::test]
async fn loads_files_and_applies_env_overrides() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("shelfdb.toml");

    let defaults = Config::load_from_path(&path).unwrap();
    assert_eq!(defaults, Config::default());

    fs::write(&path, LIBRARY).unwrap();
    let cfg = Config::load_from_path(&path).unwrap();
    assert_eq!(cfg.database.name, "library");
    assert_eq!(cfg.database.version, 2);
    assert_eq!(cfg.logging.level, "warn");
    assert!(!cfg.logging.ansi);

    let db = Database::open_in_memory(&cfg.database).unwrap();
    db.insert(
        "books",
        [Value::from_json(
            serde_json::json!({"isbn": "978-0", "author": "Le Guin"}),
        )],
    )
    .await
    .unwrap();
    let by_author = db
        .store("books")
        .where_index("author")
        .equals("Le Guin")
        .find()
        .await
        .unwrap();
    assert_eq!(by_author.records().len(), 1);

    let moved = dir.path().join("elsewhere.toml");
    fs::write(&moved, "[database]\nname = \"moved\"\nversion = 1\n").unwrap();
    unsafe {
        std::env::set_var("SHELFDB_CONFIG", &moved);
        std::env::set_var("SHELFDB_DATABASE", "overridden");
        std::env::set_var("SHELFDB_LOG", "debug");
    }
    let cfg = Config::load_from_path(&path).unwrap();
    assert_eq!(cfg.database.name, "overridden");
    assert_eq!(cfg.logging.level, "debug");

    unsafe {
        std::env::set_var("SHELFDB_DATABASE", "  ");
    }
    let err = Config::load_from_path(&path).unwrap_err();
    assert!(err.to_string().contains("database name"), "{err}");

    fs::write(&moved, "[database\nname = ").unwrap();
    assert!(Config::load_from_path(&path).is_err());

    unsafe {
        std::env::remove_var("SHELFDB_CONFIG");
        std::env::remove_var("SHELFDB_DATABASE");
        std::env::remove_var("SHELFDB_LOG");
    }

    logging::init(&cfg.logging).unwrap();
    assert!(logging::init(&cfg.logging).is_err());
}
