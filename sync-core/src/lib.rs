//! # sync-core
//!
//! Pure logic for convo-sync (no I/O, instant tests).
//!
//! This crate implements the state machine and algorithms behind the
//! reconciliation engine without touching a store or a feed.
//!
//! ## Design Philosophy
//!
//! All modules in this crate are **pure** - they take input and produce output
//! without side effects. This enables:
//! - Instant unit tests (no mocks, no async)
//! - Deterministic behavior (same input → same output)
//! - Easy reasoning about state transitions
//!
//! The actual I/O (store transactions, listener fan-out) is performed by
//! `sync-engine`, which interprets the actions and changes produced here.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod buffer;
pub mod last_message;
pub mod ledger;
pub mod schema;
pub mod state;

pub use buffer::PendingQueue;
pub use ledger::{ChangeLedger, RecordChange};
pub use schema::{
    validate, Cardinality, EntityDescriptor, EntitySchema, RelationshipDescriptor, SchemaError,
    StoreSchema, CONVERSATION_ENTITY, MESSAGE_ENTITY,
};
pub use state::{ControlAction, ControlEvent, ControllerState};
