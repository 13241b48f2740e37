//! Common library for ShelfDB
//!
//! This crate provides the types shared by the storage engine and the query
//! layer of ShelfDB.
//!
//! Modules:
//! * `error`: Defines error types and handling.
//! * `key`: Defines keys, key ranges and key paths.
//! * `value`: Defines the record value type.

pub mod error;
pub mod key;
pub mod value;

// Re-export commonly used types at the base
pub use error::*;
pub use key::{Key, KeyPath, KeyQuery, KeyRange};
pub use value::Value;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
