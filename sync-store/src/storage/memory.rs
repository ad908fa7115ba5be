//! In-memory storage backend.
//!
//! Holds records in ordered maps. A transaction works on a private copy of
//! the maps and swaps it in on commit. Failures can be injected to exercise
//! rollback paths.

use super::{RecordCounts, RecordStore, StoreTransaction};
use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use sync_core::StoreSchema;
use sync_types::{ConversationRecord, MessageRecord, RemoteId};
use tokio::sync::Notify;

#[derive(Debug, Clone, Default)]
struct Records {
    conversations: BTreeMap<RemoteId, ConversationRecord>,
    messages: BTreeMap<RemoteId, MessageRecord>,
}

impl Records {
    fn messages_in(&self, conversation: &RemoteId) -> Vec<MessageRecord> {
        let mut messages: Vec<_> = self
            .messages
            .values()
            .filter(|m| &m.conversation == conversation)
            .cloned()
            .collect();
        messages.sort_by(|a, b| {
            a.index
                .cmp(&b.index)
                .then_with(|| a.identifier.cmp(&b.identifier))
        });
        messages
    }
}

#[derive(Debug, Default)]
struct Faults {
    fail_next_commit: Option<String>,
    fail_next_write: Option<String>,
    hold_next_commit: Option<CommitHold>,
}

/// Pauses one commit until released. See [`MemoryStore::hold_next_commit`].
#[derive(Debug, Clone, Default)]
pub struct CommitHold {
    reached: Arc<Notify>,
    release: Arc<Notify>,
}

impl CommitHold {
    /// Wait until the held commit has started.
    pub async fn reached(&self) {
        self.reached.notified().await;
    }

    /// Let the held commit finish.
    pub fn release(&self) {
        self.release.notify_one();
    }
}

#[derive(Debug)]
struct Shared {
    records: Mutex<Records>,
    faults: Mutex<Faults>,
    closed: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-memory record store.
///
/// Clones share the same records.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    shared: Arc<Shared>,
    read_only: bool,
    schema: StoreSchema,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create an empty store reporting the canonical schema.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                records: Mutex::new(Records::default()),
                faults: Mutex::new(Faults::default()),
                closed: AtomicBool::new(false),
            }),
            read_only: false,
            schema: StoreSchema::canonical("Conversation", "Message"),
        }
    }

    /// Report a different schema (for compatibility checks).
    pub fn with_schema(mut self, schema: StoreSchema) -> Self {
        self.schema = schema;
        self
    }

    /// A handle to the same records that refuses writes.
    pub fn read_only(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            read_only: true,
            schema: self.schema.clone(),
        }
    }

    /// Close the store. Every handle sharing it sees the close.
    pub fn close(&self) {
        self.shared.closed.store(true, Ordering::SeqCst);
    }

    /// Cause the next commit to fail with the given error.
    pub fn fail_next_commit(&self, error: &str) {
        lock(&self.shared.faults).fail_next_commit = Some(error.to_string());
    }

    /// Make the next commit wait until the returned hold is released.
    pub fn hold_next_commit(&self) -> CommitHold {
        let hold = CommitHold::default();
        lock(&self.shared.faults).hold_next_commit = Some(hold.clone());
        hold
    }

    /// Cause the next put or delete to fail with the given error.
    pub fn fail_next_write(&self, error: &str) {
        lock(&self.shared.faults).fail_next_write = Some(error.to_string());
    }

    fn ensure_open(&self) -> StorageResult<()> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(StorageError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    type Tx = MemoryTransaction;

    async fn schema(&self) -> StorageResult<StoreSchema> {
        self.ensure_open()?;
        Ok(self.schema.clone())
    }

    fn check_handle(&self) -> StorageResult<()> {
        self.ensure_open()?;
        if self.read_only {
            return Err(StorageError::ReadOnly);
        }
        Ok(())
    }

    async fn begin(&self) -> StorageResult<MemoryTransaction> {
        self.check_handle()?;
        let working = lock(&self.shared.records).clone();
        Ok(MemoryTransaction {
            shared: Arc::clone(&self.shared),
            working,
        })
    }

    async fn conversation(&self, id: &RemoteId) -> StorageResult<Option<ConversationRecord>> {
        self.ensure_open()?;
        Ok(lock(&self.shared.records).conversations.get(id).cloned())
    }

    async fn message(&self, id: &RemoteId) -> StorageResult<Option<MessageRecord>> {
        self.ensure_open()?;
        Ok(lock(&self.shared.records).messages.get(id).cloned())
    }

    async fn messages_in(&self, conversation: &RemoteId) -> StorageResult<Vec<MessageRecord>> {
        self.ensure_open()?;
        Ok(lock(&self.shared.records).messages_in(conversation))
    }

    async fn counts(&self) -> StorageResult<RecordCounts> {
        self.ensure_open()?;
        let records = lock(&self.shared.records);
        Ok(RecordCounts {
            conversations: records.conversations.len() as u64,
            messages: records.messages.len() as u64,
        })
    }
}

/// A transaction on a [`MemoryStore`].
#[derive(Debug)]
pub struct MemoryTransaction {
    shared: Arc<Shared>,
    working: Records,
}

impl MemoryTransaction {
    fn check_write(&self) -> StorageResult<()> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(StorageError::Closed);
        }
        match lock(&self.shared.faults).fail_next_write.take() {
            Some(error) => Err(StorageError::Injected(error)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn find_conversation(
        &mut self,
        id: &RemoteId,
    ) -> StorageResult<Option<ConversationRecord>> {
        Ok(self.working.conversations.get(id).cloned())
    }

    async fn find_message(&mut self, id: &RemoteId) -> StorageResult<Option<MessageRecord>> {
        Ok(self.working.messages.get(id).cloned())
    }

    async fn messages_in(&mut self, conversation: &RemoteId) -> StorageResult<Vec<MessageRecord>> {
        Ok(self.working.messages_in(conversation))
    }

    async fn put_conversation(&mut self, record: &ConversationRecord) -> StorageResult<()> {
        self.check_write()?;
        self.working
            .conversations
            .insert(record.identifier.clone(), record.clone());
        Ok(())
    }

    async fn put_message(&mut self, record: &MessageRecord) -> StorageResult<()> {
        self.check_write()?;
        self.working
            .messages
            .insert(record.identifier.clone(), record.clone());
        Ok(())
    }

    async fn delete_conversation(&mut self, id: &RemoteId) -> StorageResult<bool> {
        self.check_write()?;
        Ok(self.working.conversations.remove(id).is_some())
    }

    async fn delete_message(&mut self, id: &RemoteId) -> StorageResult<bool> {
        self.check_write()?;
        Ok(self.working.messages.remove(id).is_some())
    }

    async fn commit(self) -> StorageResult<()> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(StorageError::Closed);
        }
        let hold = lock(&self.shared.faults).hold_next_commit.take();
        if let Some(hold) = hold {
            hold.reached.notify_one();
            hold.release.notified().await;
        }
        if let Some(error) = lock(&self.shared.faults).fail_next_commit.take() {
            return Err(StorageError::Injected(error));
        }
        *lock(&self.shared.records) = self.working;
        Ok(())
    }

    async fn rollback(self) -> StorageResult<()> {
        Ok(())
    }
}
