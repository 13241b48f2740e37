//! Storage layer for ShelfDB
//!
//! Modules:
//! * `traits`: The transactional engine interface the query layer runs against.
//! * `schema`: Object store and index definitions.
//! * `memory`: An in-memory implementation of the engine interface.

pub mod memory;
pub mod schema;
pub mod traits;

pub use memory::MemoryEngine;
pub use schema::{IndexSchema, StoreSchema};
pub use traits::{
    Cursor, CursorDirection, CursorEntry, EngineTransaction, IndexHandle, ObjectStoreHandle,
    StorageEngine, TransactionMode, TransactionOutcome, TransactionState,
};
