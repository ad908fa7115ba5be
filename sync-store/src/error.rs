//! Error types for sync-store.

/// Storage layer errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The store handle was closed.
    #[error("store is closed")]
    Closed,

    /// The store handle does not accept writes.
    #[error("store is read-only")]
    ReadOnly,

    /// A stored row could not be turned into a record.
    #[error("corrupt row in {table}: {reason}")]
    CorruptRow {
        /// Table the row came from.
        table: &'static str,
        /// What was wrong with it.
        reason: String,
    },

    /// Filesystem error while preparing the database location.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failure injected by a test backend.
    #[error("injected failure: {0}")]
    Injected(String),
}

/// Result type alias for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;
