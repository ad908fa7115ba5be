//! Local records: the persisted mirrors of remote objects.

use serde::{Deserialize, Serialize};

use crate::{
    ConversationSnapshot, MessageSnapshot, RecordKind, RemoteId, RemoteObject, UserId,
};

/// Local mirror of a remote conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationRecord {
    /// Remote identifier (immutable).
    pub identifier: RemoteId,
    /// Creation time (Unix milliseconds, immutable).
    pub created_at: i64,
    /// Message with the highest index, if any.
    pub last_message: Option<RemoteId>,
}

impl ConversationRecord {
    /// Build a fresh record from a remote snapshot.
    pub fn from_snapshot(snapshot: &ConversationSnapshot) -> Self {
        Self {
            identifier: snapshot.identifier.clone(),
            created_at: snapshot.created_at,
            last_message: None,
        }
    }

    /// Describe this record as a remote snapshot.
    pub fn to_snapshot(&self) -> RemoteObject {
        RemoteObject::Conversation(ConversationSnapshot {
            identifier: self.identifier.clone(),
            created_at: self.created_at,
        })
    }
}

/// Local mirror of a remote message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Remote identifier (immutable).
    pub identifier: RemoteId,
    /// Owning conversation, set at creation and never reassigned.
    pub conversation: RemoteId,
    /// Ordering position within the conversation.
    pub index: i64,
    /// Delivery state.
    pub is_sent: bool,
    /// Set once when the message is sent.
    pub sent_at: Option<i64>,
    /// Set once when the message is received.
    pub received_at: Option<i64>,
    /// Set once; the originating user.
    pub sent_by_user_id: Option<UserId>,
}

impl MessageRecord {
    /// Build a fresh record from a remote snapshot.
    pub fn from_snapshot(snapshot: &MessageSnapshot) -> Self {
        Self {
            identifier: snapshot.identifier.clone(),
            conversation: snapshot.conversation.clone(),
            index: snapshot.index,
            is_sent: snapshot.is_sent,
            sent_at: snapshot.sent_at,
            received_at: snapshot.received_at,
            sent_by_user_id: snapshot.sent_by_user_id.clone(),
        }
    }

    /// Describe this record as a remote snapshot.
    pub fn to_snapshot(&self) -> RemoteObject {
        RemoteObject::Message(MessageSnapshot {
            identifier: self.identifier.clone(),
            conversation: self.conversation.clone(),
            index: self.index,
            is_sent: self.is_sent,
            sent_at: self.sent_at,
            received_at: self.received_at,
            sent_by_user_id: self.sent_by_user_id.clone(),
        })
    }
}

/// Either kind of local record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LocalRecord {
    /// A conversation record.
    Conversation(ConversationRecord),
    /// A message record.
    Message(MessageRecord),
}

impl LocalRecord {
    /// Kind of the record.
    pub fn kind(&self) -> RecordKind {
        match self {
            LocalRecord::Conversation(_) => RecordKind::Conversation,
            LocalRecord::Message(_) => RecordKind::Message,
        }
    }

    /// Remote identifier of the record.
    pub fn identifier(&self) -> &RemoteId {
        match self {
            LocalRecord::Conversation(c) => &c.identifier,
            LocalRecord::Message(m) => &m.identifier,
        }
    }

    /// Key under which the record is tracked.
    pub fn key(&self) -> RecordKey {
        RecordKey::new(self.kind(), self.identifier().clone())
    }

    /// Describe this record as a remote snapshot.
    pub fn to_snapshot(&self) -> RemoteObject {
        match self {
            LocalRecord::Conversation(c) => c.to_snapshot(),
            LocalRecord::Message(m) => m.to_snapshot(),
        }
    }
}

impl From<ConversationRecord> for LocalRecord {
    fn from(record: ConversationRecord) -> Self {
        LocalRecord::Conversation(record)
    }
}

impl From<MessageRecord> for LocalRecord {
    fn from(record: MessageRecord) -> Self {
        LocalRecord::Message(record)
    }
}

/// Kind plus identifier; unique across the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey {
    /// Record kind.
    pub kind: RecordKind,
    /// Remote identifier.
    pub identifier: RemoteId,
}

impl RecordKey {
    /// Create a key.
    pub fn new(kind: RecordKind, identifier: RemoteId) -> Self {
        Self { kind, identifier }
    }
}
