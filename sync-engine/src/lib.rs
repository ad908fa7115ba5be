//! # sync-engine
//!
//! Reconciliation engine for convo-sync.
//!
//! Mirrors a remote messaging system's conversations and messages into a
//! local store by applying batches of change events.
//!
//! ## Features
//!
//! - **Atomic batches**: each batch commits in one store transaction or not at all
//! - **Last-message tracking**: every conversation points at its highest-index message
//! - **Suspend/resume**: batches queue while suspended and apply in order on resume
//! - **Coalesced notifications**: one change per record per batch, after commit
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use sync_engine::{channel_feed, spawn_engine, EngineConfig, SyncEngine};
//! use sync_store::SqliteStore;
//!
//! let store = SqliteStore::new(path).await?;
//! let engine = Arc::new(SyncEngine::new(store, EngineConfig::default()).await?);
//!
//! let (sender, feed) = channel_feed(64);
//! let handle = spawn_engine(Arc::clone(&engine), feed);
//! sender.send(batch).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod apply;
pub mod config;
pub mod engine;
pub mod feed;
pub mod notifier;
pub mod runner;

pub use config::{EngineConfig, DEFAULT_RETRY_INTERVAL};
pub use engine::{BatchReport, EngineError, SyncEngine};
pub use feed::{channel_feed, ChangeFeed, ChannelFeed, FeedError, FeedSender, MockFeed};
pub use notifier::{ChangeListener, ChannelListener, ListenerError, ListenerId, Notifier, NotifierStats};
pub use runner::spawn_engine;
pub use sync_core::RecordChange;
