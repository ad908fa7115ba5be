//! Change feed abstraction for convo-sync.
//!
//! A feed delivers [`ChangeBatch`]es from the remote messaging system, in
//! order, to a single consumer (the processing loop).
//!
//! - `next_batch()` waits for the next batch
//! - `Ok(None)` means the feed closed and no more batches will come

mod channel;
mod mock;

pub use channel::{channel_feed, ChannelFeed, FeedSender};
pub use mock::MockFeed;

use async_trait::async_trait;
use sync_types::ChangeBatch;
use thiserror::Error;

/// Feed errors.
#[derive(Debug, Error)]
pub enum FeedError {
    /// The other side of the feed is gone.
    #[error("feed closed")]
    Closed,

    /// Receiving the next batch failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    /// A batch could not be decoded.
    #[error("decode failed: {0}")]
    DecodeFailed(String),
}

/// Source of change batches.
#[async_trait]
pub trait ChangeFeed: Send {
    /// Wait for the next batch. `Ok(None)` means the feed is closed.
    async fn next_batch(&mut self) -> Result<Option<ChangeBatch>, FeedError>;
}
