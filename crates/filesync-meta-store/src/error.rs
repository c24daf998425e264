//! Error type for metadata store operations

use thiserror::Error;

/// Result alias for metadata store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Error type for metadata store operations
#[derive(Debug, Error)]
pub enum StoreError {
    /// Lookup or delete target is absent. Expected and recoverable.
    #[error("entry not found")]
    NotFound,

    #[error("redb error: {0}")]
    Redb(#[from] redb::DatabaseError),
    #[error("redb storage error: {0}")]
    Storage(#[from] redb::StorageError),
    #[error("redb table error: {0}")]
    Table(#[from] redb::TableError),
    #[error("redb transaction error: {0}")]
    Transaction(Box<redb::TransactionError>),
    #[error("redb commit error: {0}")]
    Commit(#[from] redb::CommitError),
    #[error("bincode error: {0}")]
    Codec(#[from] bincode::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Unrecoverable on-disk damage: unparseable stored integers,
    /// duplicate keys at load, or an on-disk version newer than this
    /// build supports. Aborts initialization.
    #[error("store corruption: {0}")]
    Corruption(String),

    /// The persistence worker has shut down
    #[error("metadata writer is gone")]
    Closed,
}

impl From<redb::TransactionError> for StoreError {
    fn from(e: redb::TransactionError) -> Self {
        Self::Transaction(Box::new(e))
    }
}

impl StoreError {
    /// Create a corruption error
    pub fn corruption(msg: impl Into<String>) -> Self {
        Self::Corruption(msg.into())
    }

    /// Check if this is a not found error
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    /// Check if this is fatal on-disk corruption
    #[must_use]
    pub const fn is_corruption(&self) -> bool {
        matches!(self, Self::Corruption(_))
    }

    /// Check if this wraps an underlying engine failure
    #[must_use]
    pub const fn is_database(&self) -> bool {
        matches!(
            self,
            Self::Redb(_)
                | Self::Storage(_)
                | Self::Table(_)
                | Self::Transaction(_)
                | Self::Commit(_)
                | Self::Io(_)
        )
    }
}
