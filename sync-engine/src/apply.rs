//! Applying one batch of change events inside a store transaction.
//!
//! Every event is checked in full before it writes anything. An event that
//! cannot be applied is recorded as a [`MalformedEvent`] and skipped; a
//! storage failure aborts the whole batch.

use sync_core::{last_message, ChangeLedger};
use sync_store::{StorageResult, StoreTransaction};
use sync_types::{
    ChangeEvent, ChangeOperation, ConversationRecord, ConversationSnapshot, FieldChange,
    LocalRecord, MalformedEvent, MalformedReason, MessageRecord, MessageSnapshot, RecordKind,
    RemoteId, RemoteObject,
};
use tracing::warn;

/// Outcome of one event: applied (possibly as a no-op) or skipped.
type Verdict = Result<(), MalformedReason>;

/// Applies events to a transaction and records what changed.
pub(crate) struct BatchApplier<'t, T> {
    tx: &'t mut T,
    ledger: ChangeLedger,
    malformed: Vec<MalformedEvent>,
}

impl<'t, T: StoreTransaction> BatchApplier<'t, T> {
    pub(crate) fn new(tx: &'t mut T) -> Self {
        Self {
            tx,
            ledger: ChangeLedger::new(),
            malformed: Vec::new(),
        }
    }

    /// Hand back the change history and the skipped events.
    pub(crate) fn finish(self) -> (ChangeLedger, Vec<MalformedEvent>) {
        (self.ledger, self.malformed)
    }

    /// Apply one event. Only storage failures are returned as errors.
    pub(crate) async fn apply(&mut self, position: usize, event: &ChangeEvent) -> StorageResult<()> {
        let verdict = match event.check_shape() {
            Ok(()) => self.dispatch(event).await?,
            Err(reason) => Err(reason),
        };

        if let Err(reason) = verdict {
            let malformed = MalformedEvent {
                position,
                kind: event.kind,
                identifier: event.identifier.clone(),
                reason,
            };
            warn!(operation = event.operation.name(), "skipping {malformed}");
            self.malformed.push(malformed);
        }
        Ok(())
    }

    async fn dispatch(&mut self, event: &ChangeEvent) -> StorageResult<Verdict> {
        let id = &event.identifier;
        match (&event.operation, event.kind) {
            (ChangeOperation::Added { snapshot }, _) => match snapshot {
                RemoteObject::Conversation(s) => self.add_conversation(s).await,
                RemoteObject::Message(s) => self.add_message(s).await,
                RemoteObject::Unsupported => Ok(Err(MalformedReason::UnsupportedKind)),
            },
            (ChangeOperation::Updated { snapshot, .. }, RecordKind::Conversation) => {
                self.update_conversation(id, snapshot.as_ref()).await
            }
            (ChangeOperation::Updated { changes, snapshot }, RecordKind::Message) => {
                self.update_message(id, changes, snapshot.as_ref()).await
            }
            (ChangeOperation::Removed { snapshot }, RecordKind::Conversation) => {
                self.remove_conversation(id, snapshot.as_ref()).await
            }
            (ChangeOperation::Removed { snapshot }, RecordKind::Message) => {
                self.remove_message(id, snapshot.as_ref()).await
            }
            (_, RecordKind::Unsupported) => Ok(Err(MalformedReason::UnsupportedKind)),
        }
    }

    // ===========================================
    // Conversations
    // ===========================================

    async fn add_conversation(&mut self, snapshot: &ConversationSnapshot) -> StorageResult<Verdict> {
        match self.tx.find_conversation(&snapshot.identifier).await? {
            None => {
                let record = ConversationRecord::from_snapshot(snapshot);
                self.tx.put_conversation(&record).await?;
                self.ledger.record_created(
                    record.into(),
                    RemoteObject::Conversation(snapshot.clone()),
                );
                Ok(Ok(()))
            }
            // Re-announcement: nothing mutable comes from the feed.
            Some(existing) => Ok(check_created_at(&existing, snapshot.created_at)),
        }
    }

    async fn update_conversation(
        &mut self,
        id: &RemoteId,
        snapshot: Option<&RemoteObject>,
    ) -> StorageResult<Verdict> {
        let Some(existing) = self.tx.find_conversation(id).await? else {
            return Ok(Err(MalformedReason::UnknownRecord));
        };
        match snapshot {
            Some(RemoteObject::Conversation(s)) => Ok(check_created_at(&existing, s.created_at)),
            _ => Ok(Ok(())),
        }
    }

    async fn remove_conversation(
        &mut self,
        id: &RemoteId,
        snapshot: Option<&RemoteObject>,
    ) -> StorageResult<Verdict> {
        let Some(existing) = self.tx.find_conversation(id).await? else {
            return Ok(Ok(()));
        };

        for message in self.tx.messages_in(id).await? {
            self.tx.delete_message(&message.identifier).await?;
            let last_known = message.to_snapshot();
            self.ledger.record_deleted(message.into(), last_known);
        }

        self.tx.delete_conversation(id).await?;
        let last_known = snapshot.cloned().unwrap_or_else(|| existing.to_snapshot());
        self.ledger.record_deleted(existing.into(), last_known);
        Ok(Ok(()))
    }

    // ===========================================
    // Messages
    // ===========================================

    async fn add_message(&mut self, snapshot: &MessageSnapshot) -> StorageResult<Verdict> {
        let Some(conversation) = self.tx.find_conversation(&snapshot.conversation).await? else {
            return Ok(Err(MalformedReason::UnknownConversation(
                snapshot.conversation.clone(),
            )));
        };

        match self.tx.find_message(&snapshot.identifier).await? {
            None => {
                let record = MessageRecord::from_snapshot(snapshot);
                self.tx.put_message(&record).await?;
                self.ledger
                    .record_created(record.clone().into(), RemoteObject::Message(snapshot.clone()));
                self.offer_last_message(conversation, &record).await?;
                Ok(Ok(()))
            }
            Some(existing) => {
                let changes = match snapshot_delta(&existing, snapshot) {
                    Ok(changes) => changes,
                    Err(reason) => return Ok(Err(reason)),
                };
                self.apply_message_changes(existing, changes).await?;
                Ok(Ok(()))
            }
        }
    }

    async fn update_message(
        &mut self,
        id: &RemoteId,
        changes: &[FieldChange],
        snapshot: Option<&RemoteObject>,
    ) -> StorageResult<Verdict> {
        let Some(existing) = self.tx.find_message(id).await? else {
            return Ok(Err(MalformedReason::UnknownRecord));
        };

        let delta = match (changes.is_empty(), snapshot) {
            (true, Some(RemoteObject::Message(s))) => snapshot_delta(&existing, s),
            (_, Some(RemoteObject::Message(s))) if s.conversation != existing.conversation => {
                Err(MalformedReason::ImmutableField {
                    field: "conversation",
                })
            }
            _ => effective_changes(&existing, changes),
        };

        match delta {
            Ok(delta) => {
                self.apply_message_changes(existing, delta).await?;
                Ok(Ok(()))
            }
            Err(reason) => Ok(Err(reason)),
        }
    }

    async fn remove_message(
        &mut self,
        id: &RemoteId,
        snapshot: Option<&RemoteObject>,
    ) -> StorageResult<Verdict> {
        let Some(existing) = self.tx.find_message(id).await? else {
            return Ok(Ok(()));
        };

        self.tx.delete_message(id).await?;
        let last_known = snapshot.cloned().unwrap_or_else(|| existing.to_snapshot());
        let conversation_id = existing.conversation.clone();
        self.ledger.record_deleted(existing.into(), last_known);

        if let Some(conversation) = self.tx.find_conversation(&conversation_id).await? {
            if conversation.last_message.as_ref() == Some(id) {
                self.recompute_last_message(conversation).await?;
            }
        }
        Ok(Ok(()))
    }

    /// Write an already-validated delta to a message.
    async fn apply_message_changes(
        &mut self,
        existing: MessageRecord,
        changes: Vec<FieldChange>,
    ) -> StorageResult<()> {
        if changes.is_empty() {
            return Ok(());
        }

        let old_index = existing.index;
        let before = LocalRecord::Message(existing.clone());
        let mut record = existing;
        for change in &changes {
            match change {
                FieldChange::Index(index) => record.index = *index,
                FieldChange::IsSent(sent) => record.is_sent = *sent,
                FieldChange::SentAt(at) => record.sent_at = Some(*at),
                FieldChange::ReceivedAt(at) => record.received_at = Some(*at),
                FieldChange::SentByUserId(user) => record.sent_by_user_id = Some(user.clone()),
                FieldChange::LastMessage(_) | FieldChange::Unsupported(_) => {}
            }
        }

        self.tx.put_message(&record).await?;
        let snapshot = record.to_snapshot();
        self.ledger
            .record_updated(&before, record.clone().into(), snapshot);

        if record.index != old_index {
            self.reconsider_last_message(&record, old_index).await?;
        }
        Ok(())
    }

    // ===========================================
    // Last message
    // ===========================================

    /// A new message may become its conversation's last message.
    async fn offer_last_message(
        &mut self,
        conversation: ConversationRecord,
        message: &MessageRecord,
    ) -> StorageResult<()> {
        let current = self.current_last(&conversation).await?;
        if last_message::supersedes(message, current.as_ref()) {
            self.set_last_message(conversation, Some(message.identifier.clone()))
                .await?;
        }
        Ok(())
    }

    /// A message's index moved from `old_index` to `message.index`.
    async fn reconsider_last_message(
        &mut self,
        message: &MessageRecord,
        old_index: i64,
    ) -> StorageResult<()> {
        let Some(conversation) = self.tx.find_conversation(&message.conversation).await? else {
            return Ok(());
        };

        if conversation.last_message.as_ref() == Some(&message.identifier) {
            if message.index < old_index {
                self.recompute_last_message(conversation).await?;
            }
            Ok(())
        } else {
            self.offer_last_message(conversation, message).await
        }
    }

    async fn recompute_last_message(&mut self, conversation: ConversationRecord) -> StorageResult<()> {
        let messages = self.tx.messages_in(&conversation.identifier).await?;
        let highest = last_message::highest(&messages).map(|m| m.identifier.clone());
        self.set_last_message(conversation, highest).await
    }

    async fn current_last(
        &mut self,
        conversation: &ConversationRecord,
    ) -> StorageResult<Option<MessageRecord>> {
        match &conversation.last_message {
            Some(id) => self.tx.find_message(id).await,
            None => Ok(None),
        }
    }

    async fn set_last_message(
        &mut self,
        mut conversation: ConversationRecord,
        last: Option<RemoteId>,
    ) -> StorageResult<()> {
        if conversation.last_message == last {
            return Ok(());
        }
        let before = LocalRecord::Conversation(conversation.clone());
        conversation.last_message = last;
        self.tx.put_conversation(&conversation).await?;
        let snapshot = conversation.to_snapshot();
        self.ledger
            .record_updated(&before, conversation.into(), snapshot);
        Ok(())
    }
}

fn check_created_at(existing: &ConversationRecord, created_at: i64) -> Verdict {
    if existing.created_at != created_at {
        return Err(MalformedReason::ImmutableField { field: "createdAt" });
    }
    Ok(())
}

/// The delta a full snapshot implies for an existing message.
///
/// Absent optional fields never clear stored values.
fn snapshot_delta(
    existing: &MessageRecord,
    snapshot: &MessageSnapshot,
) -> Result<Vec<FieldChange>, MalformedReason> {
    if snapshot.conversation != existing.conversation {
        return Err(MalformedReason::ImmutableField {
            field: "conversation",
        });
    }

    let mut requested = vec![
        FieldChange::Index(snapshot.index),
        FieldChange::IsSent(snapshot.is_sent),
    ];
    if let Some(at) = snapshot.sent_at {
        requested.push(FieldChange::SentAt(at));
    }
    if let Some(at) = snapshot.received_at {
        requested.push(FieldChange::ReceivedAt(at));
    }
    if let Some(user) = &snapshot.sent_by_user_id {
        requested.push(FieldChange::SentByUserId(user.clone()));
    }
    effective_changes(existing, &requested)
}

/// Drop changes that match the stored value; reject set-once overwrites.
fn effective_changes(
    existing: &MessageRecord,
    requested: &[FieldChange],
) -> Result<Vec<FieldChange>, MalformedReason> {
    let mut effective = Vec::new();
    for change in requested {
        let differs = match change {
            FieldChange::Index(index) => existing.index != *index,
            FieldChange::IsSent(sent) => existing.is_sent != *sent,
            FieldChange::SentAt(at) => set_once("sentAt", existing.sent_at.as_ref(), at)?,
            FieldChange::ReceivedAt(at) => {
                set_once("receivedAt", existing.received_at.as_ref(), at)?
            }
            FieldChange::SentByUserId(user) => {
                set_once("sentByUserID", existing.sent_by_user_id.as_ref(), user)?
            }
            FieldChange::LastMessage(_) => {
                return Err(MalformedReason::FieldNotApplicable {
                    kind: RecordKind::Message,
                    field: change.field_name(),
                })
            }
            FieldChange::Unsupported(field) => {
                return Err(MalformedReason::UnsupportedField(field.clone()))
            }
        };
        if differs {
            effective.push(change.clone());
        }
    }
    Ok(effective)
}

/// True when a set-once field is being set for the first time.
fn set_once<V: PartialEq>(
    field: &'static str,
    current: Option<&V>,
    new: &V,
) -> Result<bool, MalformedReason> {
    match current {
        None => Ok(true),
        Some(current) if current == new => Ok(false),
        Some(_) => Err(MalformedReason::ImmutableField { field }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sync_types::UserId;

    fn stored() -> MessageRecord {
        MessageRecord {
            identifier: RemoteId::new("m1"),
            conversation: RemoteId::new("c1"),
            index: 2,
            is_sent: false,
            sent_at: None,
            received_at: Some(100),
            sent_by_user_id: Some(UserId::new("u1")),
        }
    }

    #[test]
    fn unchanged_fields_are_dropped() {
        let changes = effective_changes(
            &stored(),
            &[
                FieldChange::Index(2),
                FieldChange::IsSent(true),
                FieldChange::ReceivedAt(100),
            ],
        )
        .unwrap();
        assert_eq!(changes, vec![FieldChange::IsSent(true)]);
    }

    #[test]
    fn set_once_field_can_be_set_first_time() {
        let changes = effective_changes(&stored(), &[FieldChange::SentAt(7)]).unwrap();
        assert_eq!(changes, vec![FieldChange::SentAt(7)]);
    }

    #[test]
    fn set_once_field_cannot_be_overwritten() {
        let err = effective_changes(&stored(), &[FieldChange::ReceivedAt(101)]).unwrap_err();
        assert_eq!(err, MalformedReason::ImmutableField { field: "receivedAt" });

        let err = effective_changes(&stored(), &[FieldChange::SentByUserId(UserId::new("u2"))])
            .unwrap_err();
        assert_eq!(
            err,
            MalformedReason::ImmutableField {
                field: "sentByUserID"
            }
        );
    }

    #[test]
    fn snapshot_never_clears_fields() {
        let snapshot = MessageSnapshot {
            identifier: RemoteId::new("m1"),
            conversation: RemoteId::new("c1"),
            index: 2,
            is_sent: false,
            sent_at: None,
            received_at: None,
            sent_by_user_id: None,
        };
        assert!(snapshot_delta(&stored(), &snapshot).unwrap().is_empty());
    }

    #[test]
    fn snapshot_cannot_move_message() {
        let mut snapshot = match stored().to_snapshot() {
            RemoteObject::Message(s) => s,
            RemoteObject::Conversation(_) | RemoteObject::Unsupported => unreachable!(),
        };
        snapshot.conversation = RemoteId::new("c2");
        assert_eq!(
            snapshot_delta(&stored(), &snapshot).unwrap_err(),
            MalformedReason::ImmutableField {
                field: "conversation"
            }
        );
    }
}
