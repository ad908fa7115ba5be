//! # sync-types
//!
//! Feed and record types for convo-sync.
//!
//! This crate provides the foundational types used across all convo-sync crates:
//! - [`RemoteId`], [`UserId`], [`BatchId`], [`RecordKind`] - Identity types
//! - [`RemoteObject`], [`ChangeEvent`], [`ChangeBatch`] - What the feed delivers
//! - [`ConversationRecord`], [`MessageRecord`] - What the store holds
//! - [`MalformedEvent`] - Diagnostics for events that cannot be applied

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod ids;
mod objects;
mod records;

pub use error::{MalformedEvent, MalformedReason};
pub use ids::{BatchId, RecordKind, RemoteId, UserId};
pub use objects::{
    ChangeBatch, ChangeEvent, ChangeOperation, ConversationSnapshot, FieldChange,
    MessageSnapshot, RemoteObject,
};
pub use records::{ConversationRecord, LocalRecord, MessageRecord, RecordKey};
