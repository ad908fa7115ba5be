//! Feed backed by a tokio channel.

use super::{ChangeFeed, FeedError};
use async_trait::async_trait;
use sync_types::ChangeBatch;
use tokio::sync::mpsc;

/// Create a connected sender and feed with the given buffer capacity.
pub fn channel_feed(capacity: usize) -> (FeedSender, ChannelFeed) {
    let (tx, rx) = mpsc::channel(capacity);
    (FeedSender { tx }, ChannelFeed { rx })
}

/// Producer side of a [`ChannelFeed`].
#[derive(Debug, Clone)]
pub struct FeedSender {
    tx: mpsc::Sender<ChangeBatch>,
}

impl FeedSender {
    /// Send a batch, waiting for buffer space.
    pub async fn send(&self, batch: ChangeBatch) -> Result<(), FeedError> {
        self.tx.send(batch).await.map_err(|_| FeedError::Closed)
    }
}

/// Feed that receives batches from a [`FeedSender`].
///
/// Closes once every sender is dropped and the buffer is drained.
#[derive(Debug)]
pub struct ChannelFeed {
    rx: mpsc::Receiver<ChangeBatch>,
}

#[async_trait]
impl ChangeFeed for ChannelFeed {
    async fn next_batch(&mut self) -> Result<Option<ChangeBatch>, FeedError> {
        Ok(self.rx.recv().await)
    }
}
