//! Storage layer for convo-sync.
//!
//! A [`RecordStore`] holds conversation and message records. All writes go
//! through a [`StoreTransaction`]: reads inside the transaction see its own
//! writes, and nothing is visible outside until [`StoreTransaction::commit`].

mod memory;
mod sqlite;

pub use memory::{CommitHold, MemoryStore, MemoryTransaction};
pub use sqlite::{SqliteStore, SqliteTransaction};

use crate::error::StorageResult;
use async_trait::async_trait;
use sync_core::StoreSchema;
use sync_types::{ConversationRecord, MessageRecord, RemoteId};

/// Number of records of each kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordCounts {
    /// Conversation records.
    pub conversations: u64,
    /// Message records.
    pub messages: u64,
}

/// Trait for record store backends.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Transaction type handed out by [`RecordStore::begin`].
    type Tx: StoreTransaction;

    /// Describe the entities this store provides.
    async fn schema(&self) -> StorageResult<StoreSchema>;

    /// Check the handle is open and writable.
    fn check_handle(&self) -> StorageResult<()>;

    /// Start a transaction.
    async fn begin(&self) -> StorageResult<Self::Tx>;

    /// Get a committed conversation by identifier.
    async fn conversation(&self, id: &RemoteId) -> StorageResult<Option<ConversationRecord>>;

    /// Get a committed message by identifier.
    async fn message(&self, id: &RemoteId) -> StorageResult<Option<MessageRecord>>;

    /// Get the committed messages of a conversation, ordered by index.
    async fn messages_in(&self, conversation: &RemoteId) -> StorageResult<Vec<MessageRecord>>;

    /// Count committed records.
    async fn counts(&self) -> StorageResult<RecordCounts>;
}

/// A scoped unit of work against a [`RecordStore`].
///
/// Dropping a transaction without committing discards its writes.
#[async_trait]
pub trait StoreTransaction: Send {
    /// Get a conversation, including uncommitted writes.
    async fn find_conversation(&mut self, id: &RemoteId)
        -> StorageResult<Option<ConversationRecord>>;

    /// Get a message, including uncommitted writes.
    async fn find_message(&mut self, id: &RemoteId) -> StorageResult<Option<MessageRecord>>;

    /// Get the messages of a conversation, ordered by index.
    async fn messages_in(&mut self, conversation: &RemoteId) -> StorageResult<Vec<MessageRecord>>;

    /// Insert or replace a conversation.
    async fn put_conversation(&mut self, record: &ConversationRecord) -> StorageResult<()>;

    /// Insert or replace a message.
    async fn put_message(&mut self, record: &MessageRecord) -> StorageResult<()>;

    /// Delete a conversation. Returns false if it did not exist.
    async fn delete_conversation(&mut self, id: &RemoteId) -> StorageResult<bool>;

    /// Delete a message. Returns false if it did not exist.
    async fn delete_message(&mut self, id: &RemoteId) -> StorageResult<bool>;

    /// Make all writes visible atomically.
    async fn commit(self) -> StorageResult<()>;

    /// Discard all writes.
    async fn rollback(self) -> StorageResult<()>;
}
