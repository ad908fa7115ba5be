//! Per-batch change ledger.
//!
//! While a batch is applied the engine records every create, update and
//! delete here. After the commit, [`ChangeLedger::finish`] collapses the
//! history of each record into at most one [`RecordChange`]:
//!
//! | existed before | exists after | result              |
//! |----------------|--------------|---------------------|
//! | no             | yes          | `Created`           |
//! | yes            | yes          | `Updated`           |
//! | yes            | no           | `Deleted`           |
//! | no             | no           | nothing             |
//!
//! An `Updated` result carries the net difference between the record as it
//! was before the batch and as it is after it. A record that ends the batch
//! where it started produces nothing.
//!
//! Results come out in the order records were first touched.

use std::collections::HashMap;
use sync_types::{FieldChange, LocalRecord, RecordKey, RemoteObject};

/// One coalesced notification for one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordChange {
    /// The record did not exist before the batch.
    Created {
        /// Record state after the batch.
        record: LocalRecord,
        /// Remote state the record was built from.
        snapshot: RemoteObject,
    },
    /// The record existed before and after the batch.
    Updated {
        /// Record state after the batch.
        record: LocalRecord,
        /// Fields that differ from the pre-batch state, never empty.
        changes: Vec<FieldChange>,
        /// Remote state after the batch.
        snapshot: RemoteObject,
    },
    /// The record existed before the batch and is gone now.
    Deleted {
        /// Last record state before deletion.
        record: LocalRecord,
        /// Last known remote state.
        snapshot: RemoteObject,
    },
}

impl RecordChange {
    /// The record this change is about.
    pub fn record(&self) -> &LocalRecord {
        match self {
            RecordChange::Created { record, .. }
            | RecordChange::Updated { record, .. }
            | RecordChange::Deleted { record, .. } => record,
        }
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            RecordChange::Created { .. } => "created",
            RecordChange::Updated { .. } => "updated",
            RecordChange::Deleted { .. } => "deleted",
        }
    }
}

#[derive(Debug)]
struct Entry {
    /// State before the batch; `None` if the record did not exist.
    before: Option<LocalRecord>,
    exists_now: bool,
    record: LocalRecord,
    snapshot: RemoteObject,
}

/// Records what happened to each touched record during one batch.
#[derive(Debug, Default)]
pub struct ChangeLedger {
    order: Vec<RecordKey>,
    entries: HashMap<RecordKey, Entry>,
}

impl ChangeLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// A record was inserted.
    pub fn record_created(&mut self, record: LocalRecord, snapshot: RemoteObject) {
        self.touch(None, true, record, snapshot);
    }

    /// An existing record was rewritten. `before` is its state prior to
    /// this write.
    pub fn record_updated(
        &mut self,
        before: &LocalRecord,
        record: LocalRecord,
        snapshot: RemoteObject,
    ) {
        self.touch(Some(before.clone()), true, record, snapshot);
    }

    /// A record was deleted.
    pub fn record_deleted(&mut self, record: LocalRecord, snapshot: RemoteObject) {
        self.touch(Some(record.clone()), false, record, snapshot);
    }

    /// Number of distinct records touched so far.
    pub fn touched(&self) -> usize {
        self.order.len()
    }

    /// Check if nothing was touched.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Collapse the history into notifications, in first-touch order.
    pub fn finish(mut self) -> Vec<RecordChange> {
        let mut out = Vec::with_capacity(self.order.len());
        for key in self.order {
            let Some(entry) = self.entries.remove(&key) else {
                continue;
            };
            let change = match (entry.before, entry.exists_now) {
                (None, true) => RecordChange::Created {
                    record: entry.record,
                    snapshot: entry.snapshot,
                },
                (Some(before), true) => {
                    let changes = net_changes(&before, &entry.record);
                    if changes.is_empty() {
                        continue;
                    }
                    RecordChange::Updated {
                        record: entry.record,
                        changes,
                        snapshot: entry.snapshot,
                    }
                }
                (Some(_), false) => RecordChange::Deleted {
                    record: entry.record,
                    snapshot: entry.snapshot,
                },
                (None, false) => continue,
            };
            out.push(change);
        }
        out
    }

    /// Update the entry for `record`, creating it on first touch. `before`
    /// only counts on first touch.
    fn touch(
        &mut self,
        before: Option<LocalRecord>,
        exists_now: bool,
        record: LocalRecord,
        snapshot: RemoteObject,
    ) {
        let key = record.key();
        match self.entries.get_mut(&key) {
            Some(entry) => {
                entry.exists_now = exists_now;
                entry.record = record;
                entry.snapshot = snapshot;
            }
            None => {
                self.order.push(key.clone());
                self.entries.insert(
                    key,
                    Entry {
                        before,
                        exists_now,
                        record,
                        snapshot,
                    },
                );
            }
        }
    }
}

/// Fields of `after` that differ from `before`, in declaration order.
///
/// Set-once fields are only reported when they hold a value; a record
/// recreated without one keeps the cleared state in its snapshot.
fn net_changes(before: &LocalRecord, after: &LocalRecord) -> Vec<FieldChange> {
    let mut changes = Vec::new();
    match (before, after) {
        (LocalRecord::Conversation(b), LocalRecord::Conversation(a)) => {
            if a.last_message != b.last_message {
                changes.push(FieldChange::LastMessage(a.last_message.clone()));
            }
        }
        (LocalRecord::Message(b), LocalRecord::Message(a)) => {
            if a.index != b.index {
                changes.push(FieldChange::Index(a.index));
            }
            if a.is_sent != b.is_sent {
                changes.push(FieldChange::IsSent(a.is_sent));
            }
            if let Some(at) = a.sent_at.filter(|_| a.sent_at != b.sent_at) {
                changes.push(FieldChange::SentAt(at));
            }
            if let Some(at) = a.received_at.filter(|_| a.received_at != b.received_at) {
                changes.push(FieldChange::ReceivedAt(at));
            }
            if a.sent_by_user_id != b.sent_by_user_id {
                if let Some(user) = &a.sent_by_user_id {
                    changes.push(FieldChange::SentByUserId(user.clone()));
                }
            }
        }
        // Keys include the kind, so both sides always agree.
        _ => {}
    }
    changes
}
