//! ShelfDB client
//!
//! Query and transaction layer over a transactional key-value engine.
//!
//! # Example
//! ```rust,no_run
//! use serde_json::json;
//! use shelfdb_client::{Database, DatabaseConfig};
//! use shelfdb_common::Value;
//! use shelfdb_storage::{IndexSchema, StoreSchema};
//!
//! #[tokio::main]
//! async fn main() -> shelfdb_common::Result<()> {
//!     let config = DatabaseConfig::new("app").with_store(
//!         StoreSchema::new("people")
//!             .key_path("id")
//!             .index(IndexSchema::new("age")),
//!     );
//!     let db = Database::open_in_memory(&config)?;
//!
//!     db.store("people")
//!         .insert([Value::from_json(json!({"id": 1, "name": "Ada", "age": 36}))])
//!         .await?;
//!
//!     let found = db.store("people").find_by_key(1, true).await?;
//!     println!("{:?}", found.record());
//!
//!     db.transaction(["people"], |tx| async move {
//!         tx.store("people").remove(1).await?;
//!         tx.store("people").count().await
//!     })
//!     .await?;
//!     Ok(())
//! }
//! ```

pub mod comparator;
pub mod condition;
pub mod config;
pub mod context;
pub mod database;
pub mod executor;
pub mod logging;
pub mod query;
pub mod result;
pub mod transaction;

pub use condition::{Comparison, ConditionTarget, ConditionValue, WhereCondition};
pub use config::{Config, DatabaseConfig, LoggingConfig};
pub use context::{PendingContext, TransactionContext};
pub use database::Database;
pub use query::{Operation, PendingCondition, Query, QueryPlan, QueryType, ScanRange};
pub use result::QueryResult;
pub use transaction::{StoreSelection, TransactionCoordinator, TransactionScope};
