//! Remote object snapshots and change events.
//!
//! These are the values the messaging provider's feed delivers. A
//! [`ChangeBatch`] is an ordered group of [`ChangeEvent`]s that the engine
//! applies and commits as one unit.

use serde::{Deserialize, Deserializer, Serialize};

use crate::{BatchId, MalformedReason, RecordKind, RemoteId, UserId};

/// Snapshot of a remote conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSnapshot {
    /// Remote identifier.
    pub identifier: RemoteId,
    /// Creation time (Unix milliseconds).
    pub created_at: i64,
}

/// Snapshot of a remote message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageSnapshot {
    /// Remote identifier.
    pub identifier: RemoteId,
    /// Identifier of the owning conversation.
    pub conversation: RemoteId,
    /// Ordering position within the conversation.
    pub index: i64,
    /// Delivery state.
    #[serde(default)]
    pub is_sent: bool,
    /// When the message was sent (Unix milliseconds).
    #[serde(default)]
    pub sent_at: Option<i64>,
    /// When the message was received (Unix milliseconds).
    #[serde(default)]
    pub received_at: Option<i64>,
    /// Originating user.
    #[serde(default)]
    pub sent_by_user_id: Option<UserId>,
}

/// A full snapshot of a remote object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RemoteObject {
    /// A conversation snapshot.
    Conversation(ConversationSnapshot),
    /// A message snapshot.
    Message(MessageSnapshot),
    /// A snapshot of some other object kind. Its contents are not read.
    #[serde(other)]
    Unsupported,
}

impl RemoteObject {
    /// The kind of object this snapshot describes.
    pub fn kind(&self) -> RecordKind {
        match self {
            RemoteObject::Conversation(_) => RecordKind::Conversation,
            RemoteObject::Message(_) => RecordKind::Message,
            RemoteObject::Unsupported => RecordKind::Unsupported,
        }
    }

    /// The remote identifier of the object, if its kind is known.
    pub fn identifier(&self) -> Option<&RemoteId> {
        match self {
            RemoteObject::Conversation(c) => Some(&c.identifier),
            RemoteObject::Message(m) => Some(&m.identifier),
            RemoteObject::Unsupported => None,
        }
    }
}

/// A single changed property of a remote object.
///
/// `LastMessage` is never accepted from the feed; the engine emits it when
/// it moves a conversation's last-message pointer. `Unsupported` stands in
/// for a feed change this crate cannot decode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "snake_case")]
pub enum FieldChange {
    /// New ordering position.
    Index(i64),
    /// New delivery state.
    IsSent(bool),
    /// Send time became known.
    SentAt(i64),
    /// Receive time became known.
    ReceivedAt(i64),
    /// Originating user became known.
    SentByUserId(UserId),
    /// Conversation's last message moved.
    LastMessage(Option<RemoteId>),
    /// A field name (or value) the feed sent that is not understood.
    #[serde(skip_deserializing)]
    Unsupported(String),
}

impl FieldChange {
    /// Schema name of the attribute or relationship this change touches.
    pub fn field_name(&self) -> &'static str {
        match self {
            FieldChange::Index(_) => "index",
            FieldChange::IsSent(_) => "isSent",
            FieldChange::SentAt(_) => "sentAt",
            FieldChange::ReceivedAt(_) => "receivedAt",
            FieldChange::SentByUserId(_) => "sentByUserID",
            FieldChange::LastMessage(_) => "lastMessage",
            FieldChange::Unsupported(_) => "unsupported",
        }
    }

    /// Whether the feed may deliver this change for the given kind.
    pub fn accepted_from_feed(&self, kind: RecordKind) -> bool {
        match self {
            FieldChange::LastMessage(_) | FieldChange::Unsupported(_) => false,
            _ => kind == RecordKind::Message,
        }
    }
}

/// Feed form of one field change, decoded per element so that one
/// unrecognized field does not reject the whole batch.
#[derive(Deserialize)]
#[serde(untagged)]
enum FeedFieldChange {
    Known(FieldChange),
    Other { field: String },
}

fn tolerant_changes<'de, D>(deserializer: D) -> Result<Vec<FieldChange>, D::Error>
where
    D: Deserializer<'de>,
{
    let changes = Vec::<FeedFieldChange>::deserialize(deserializer)?;
    Ok(changes
        .into_iter()
        .map(|change| match change {
            FeedFieldChange::Known(change) => change,
            FeedFieldChange::Other { field } => FieldChange::Unsupported(field),
        })
        .collect())
}

/// What happened to a remote object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ChangeOperation {
    /// The object appeared (or was re-announced) with the given state.
    Added {
        /// Full object state.
        snapshot: RemoteObject,
    },
    /// Some properties of the object changed.
    Updated {
        /// The changed properties only.
        #[serde(default, deserialize_with = "tolerant_changes")]
        changes: Vec<FieldChange>,
        /// Object state after the change, when the feed provides it.
        #[serde(default)]
        snapshot: Option<RemoteObject>,
    },
    /// The object was deleted remotely.
    Removed {
        /// Last known object state, when the feed provides it.
        #[serde(default)]
        snapshot: Option<RemoteObject>,
    },
}

impl ChangeOperation {
    /// Short name for diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            ChangeOperation::Added { .. } => "added",
            ChangeOperation::Updated { .. } => "updated",
            ChangeOperation::Removed { .. } => "removed",
        }
    }

    fn snapshot(&self) -> Option<&RemoteObject> {
        match self {
            ChangeOperation::Added { snapshot } => Some(snapshot),
            ChangeOperation::Updated { snapshot, .. } | ChangeOperation::Removed { snapshot } => {
                snapshot.as_ref()
            }
        }
    }
}

/// One change notification for one remote object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Kind of the remote object.
    pub kind: RecordKind,
    /// Identifier of the remote object.
    pub identifier: RemoteId,
    /// The change itself.
    pub operation: ChangeOperation,
}

impl ChangeEvent {
    /// An `Added` event for the given snapshot.
    pub fn added(snapshot: RemoteObject) -> Self {
        Self {
            kind: snapshot.kind(),
            identifier: snapshot.identifier().cloned().unwrap_or_else(|| RemoteId::new("")),
            operation: ChangeOperation::Added { snapshot },
        }
    }

    /// An `Updated` event carrying only a delta.
    pub fn updated(kind: RecordKind, identifier: impl Into<RemoteId>, changes: Vec<FieldChange>) -> Self {
        Self {
            kind,
            identifier: identifier.into(),
            operation: ChangeOperation::Updated {
                changes,
                snapshot: None,
            },
        }
    }

    /// A `Removed` event without a snapshot.
    pub fn removed(kind: RecordKind, identifier: impl Into<RemoteId>) -> Self {
        Self {
            kind,
            identifier: identifier.into(),
            operation: ChangeOperation::Removed { snapshot: None },
        }
    }

    /// The snapshot carried by the event, if any.
    pub fn snapshot(&self) -> Option<&RemoteObject> {
        self.operation.snapshot()
    }

    /// Check the event is well-formed on its own, without consulting a store.
    ///
    /// Store-dependent checks (unknown record, set-once overwrite, unknown
    /// parent conversation) happen in the engine.
    pub fn check_shape(&self) -> Result<(), MalformedReason> {
        if self.kind == RecordKind::Unsupported {
            return Err(MalformedReason::UnsupportedKind);
        }
        if self.identifier.is_empty() {
            return Err(MalformedReason::EmptyIdentifier);
        }

        if let Some(snapshot) = self.snapshot() {
            let Some(snapshot_id) = snapshot.identifier() else {
                return Err(MalformedReason::UnsupportedKind);
            };
            if snapshot.kind() != self.kind {
                return Err(MalformedReason::KindMismatch {
                    event: self.kind,
                    snapshot: snapshot.kind(),
                });
            }
            if snapshot_id != &self.identifier {
                return Err(MalformedReason::IdentifierMismatch {
                    snapshot: snapshot_id.clone(),
                });
            }
            if let RemoteObject::Message(m) = snapshot {
                if m.conversation.is_empty() {
                    return Err(MalformedReason::EmptyIdentifier);
                }
                if m.index < 0 {
                    return Err(MalformedReason::NegativeIndex(m.index));
                }
            }
        }

        if let ChangeOperation::Updated { changes, .. } = &self.operation {
            for change in changes {
                if let FieldChange::Unsupported(field) = change {
                    return Err(MalformedReason::UnsupportedField(field.clone()));
                }
                if !change.accepted_from_feed(self.kind) {
                    return Err(MalformedReason::FieldNotApplicable {
                        kind: self.kind,
                        field: change.field_name(),
                    });
                }
                if let FieldChange::Index(index) = change {
                    if *index < 0 {
                        return Err(MalformedReason::NegativeIndex(*index));
                    }
                }
            }
        }

        Ok(())
    }
}

/// An ordered group of change events, applied and committed atomically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeBatch {
    /// Batch identifier.
    #[serde(default)]
    pub id: BatchId,
    /// Events in feed order.
    pub events: Vec<ChangeEvent>,
}

impl ChangeBatch {
    /// Create a batch with a fresh identifier.
    pub fn new(events: Vec<ChangeEvent>) -> Self {
        Self {
            id: BatchId::new(),
            events,
        }
    }

    /// Number of events in the batch.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// True when the batch carries no events.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
