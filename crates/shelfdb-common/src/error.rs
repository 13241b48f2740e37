//! Error definitions for ShelfDB

use std::fmt;

use thiserror::Error;

/// Failure categories reported by a storage engine.
///
/// The names follow the request-error vocabulary of transactional
/// key-value engines, so an error raised by the engine can be matched
/// without string comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineErrorKind {
    /// A write violated a primary-key or unique-index constraint.
    Constraint,
    /// A key was missing, invalid, or supplied where the store forbids one.
    Data,
    /// The object store or index does not exist in the transaction scope.
    NotFound,
    /// A write was issued against a read-only transaction.
    ReadOnly,
    /// A request was made after the transaction finished.
    TransactionInactive,
    /// A transaction was opened with an invalid scope.
    InvalidAccess,
    /// The transaction was aborted.
    Abort,
    /// The engine is not in a state where the request can run.
    InvalidState,
}

impl EngineErrorKind {
    pub fn name(&self) -> &'static str {
        match self {
            EngineErrorKind::Constraint => "ConstraintError",
            EngineErrorKind::Data => "DataError",
            EngineErrorKind::NotFound => "NotFoundError",
            EngineErrorKind::ReadOnly => "ReadOnlyError",
            EngineErrorKind::TransactionInactive => "TransactionInactiveError",
            EngineErrorKind::InvalidAccess => "InvalidAccessError",
            EngineErrorKind::Abort => "AbortError",
            EngineErrorKind::InvalidState => "InvalidStateError",
        }
    }
}

impl fmt::Display for EngineErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Represents errors that can occur during ShelfDB operations.
///
/// # Example
/// ```rust
/// use shelfdb_common::ShelfError;
///
/// fn example() -> shelfdb_common::Result<()> {
///     Err(ShelfError::NotFound("No item found for key 1".into()))
/// }
///
/// match example() {
///     Ok(_) => println!("Success"),
///     Err(e) => assert_eq!(e.kind(), "not_found"),
/// }
/// ```
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ShelfError {
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Index not found: {0}")]
    IndexNotFound(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("{kind}: {message}")]
    Engine {
        kind: EngineErrorKind,
        message: String,
    },

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(String),
}

pub type Result<T> = std::result::Result<T, ShelfError>;

impl ShelfError {
    /// Build an engine error of the given kind.
    pub fn engine(kind: EngineErrorKind, message: impl Into<String>) -> Self {
        ShelfError::Engine {
            kind,
            message: message.into(),
        }
    }

    pub fn constraint(message: impl Into<String>) -> Self {
        Self::engine(EngineErrorKind::Constraint, message)
    }

    pub fn data(message: impl Into<String>) -> Self {
        Self::engine(EngineErrorKind::Data, message)
    }

    /// Get the inner message without the type prefix.
    pub fn message(&self) -> &str {
        match self {
            ShelfError::InvalidQuery(msg) => msg,
            ShelfError::NotFound(msg) => msg,
            ShelfError::IndexNotFound(msg) => msg,
            ShelfError::InvalidOperation(msg) => msg,
            ShelfError::Engine { message, .. } => message,
            ShelfError::Transaction(msg) => msg,
            ShelfError::Config(msg) => msg,
            ShelfError::Io(msg) => msg,
        }
    }

    /// Get a short error kind name
    pub fn kind(&self) -> &'static str {
        match self {
            ShelfError::InvalidQuery(_) => "invalid_query",
            ShelfError::NotFound(_) => "not_found",
            ShelfError::IndexNotFound(_) => "index_not_found",
            ShelfError::InvalidOperation(_) => "invalid_operation",
            ShelfError::Engine { .. } => "engine_error",
            ShelfError::Transaction(_) => "transaction_error",
            ShelfError::Config(_) => "config_error",
            ShelfError::Io(_) => "io_error",
        }
    }

    /// The engine error kind, if this error came from the storage engine.
    pub fn engine_kind(&self) -> Option<EngineErrorKind> {
        match self {
            ShelfError::Engine { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    pub fn is_engine(&self, kind: EngineErrorKind) -> bool {
        self.engine_kind() == Some(kind)
    }
}

impl From<std::io::Error> for ShelfError {
    fn from(err: std::io::Error) -> Self {
        ShelfError::Io(err.to_string())
    }
}
