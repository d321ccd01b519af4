//! Error types for cmdlog-store
//!
//! Every redb failure is folded into [`StoreError`] so callers see a single
//! error type regardless of which transaction stage failed.

use thiserror::Error;

/// Errors that can occur in storage operations
#[derive(Debug, Error)]
pub enum StoreError {
    /// I/O error while preparing the database location
    #[error("I/O error: {0}")]
    Io(String),

    /// The database file could not be opened or created
    #[error("Database error: {0}")]
    Database(String),

    /// A read or write transaction could not be started
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// A collection could not be opened
    #[error("Table error: {0}")]
    Table(String),

    /// Low-level storage failure inside a transaction
    #[error("Storage error: {0}")]
    Storage(String),

    /// The write transaction failed to commit
    #[error("Commit error: {0}")]
    Commit(String),

    /// A stored record does not have the expected layout
    #[error("Corrupt record in {collection}: {reason}")]
    Corrupt {
        collection: &'static str,
        reason: String,
    },
}

impl StoreError {
    /// Create a new Corrupt error
    pub fn corrupt(collection: &'static str, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            collection,
            reason: reason.into(),
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}

impl From<redb::DatabaseError> for StoreError {
    fn from(err: redb::DatabaseError) -> Self {
        StoreError::Database(err.to_string())
    }
}

impl From<redb::TransactionError> for StoreError {
    fn from(err: redb::TransactionError) -> Self {
        StoreError::Transaction(err.to_string())
    }
}

impl From<redb::TableError> for StoreError {
    fn from(err: redb::TableError) -> Self {
        StoreError::Table(err.to_string())
    }
}

impl From<redb::StorageError> for StoreError {
    fn from(err: redb::StorageError) -> Self {
        StoreError::Storage(err.to_string())
    }
}

impl From<redb::CommitError> for StoreError {
    fn from(err: redb::CommitError) -> Self {
        StoreError::Commit(err.to_string())
    }
}
