//! Diagnostics for change events the engine cannot apply.

use thiserror::Error;

use crate::{RecordKind, RemoteId};

/// Why a change event was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedReason {
    /// The feed named an object kind that is not synchronized.
    #[error("unsupported object kind")]
    UnsupportedKind,

    /// The event or its snapshot carries a blank identifier.
    #[error("empty identifier")]
    EmptyIdentifier,

    /// The snapshot describes a different kind than the event.
    #[error("snapshot kind {snapshot} does not match event kind {event}")]
    KindMismatch {
        /// Kind named by the event.
        event: RecordKind,
        /// Kind of the attached snapshot.
        snapshot: RecordKind,
    },

    /// The snapshot describes a different object than the event.
    #[error("snapshot identifier {snapshot} does not match event")]
    IdentifierMismatch {
        /// Identifier carried by the snapshot.
        snapshot: RemoteId,
    },

    /// A changed field does not exist on this kind, or is engine-derived.
    #[error("field {field} cannot be changed on a {kind}")]
    FieldNotApplicable {
        /// Kind of the object.
        kind: RecordKind,
        /// Schema name of the offending field.
        field: &'static str,
    },

    /// A changed field the feed sent is not recognized.
    #[error("unsupported field {0}")]
    UnsupportedField(String),

    /// Message indexes are positions and cannot be negative.
    #[error("negative message index {0}")]
    NegativeIndex(i64),

    /// An immutable or set-once field would be overwritten.
    #[error("field {field} is already set and cannot change")]
    ImmutableField {
        /// Schema name of the offending field.
        field: &'static str,
    },

    /// An update arrived for a record that does not exist locally.
    #[error("no local record to update")]
    UnknownRecord,

    /// A message names a conversation that does not exist locally.
    #[error("unknown conversation {0}")]
    UnknownConversation(RemoteId),
}

/// A skipped event together with its position in the batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed {kind} event #{position} ({identifier}): {reason}")]
pub struct MalformedEvent {
    /// Position of the event in its batch.
    pub position: usize,
    /// Kind named by the event.
    pub kind: RecordKind,
    /// Identifier named by the event.
    pub identifier: RemoteId,
    /// Why it was skipped.
    pub reason: MalformedReason,
}
