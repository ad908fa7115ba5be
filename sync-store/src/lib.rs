//! # sync-store
//!
//! Transactional record stores for convo-sync.
//!
//! - [`RecordStore`] / [`StoreTransaction`] - the interface the engine writes through
//! - [`SqliteStore`] - persistent backend (sqlx, WAL mode)
//! - [`MemoryStore`] - in-memory backend with fault injection for tests

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod storage;

pub use error::{StorageError, StorageResult};
pub use storage::{
    CommitHold, MemoryStore, MemoryTransaction, RecordCounts, RecordStore, SqliteStore,
    SqliteTransaction, StoreTransaction,
};
