//! Mock feed for testing.
//!
//! Allows queueing batches and injecting receive failures.

use super::{ChangeFeed, FeedError};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use sync_types::ChangeBatch;

/// Mock feed for testing.
///
/// Returns queued batches in order, then reports the feed closed.
/// Clones share the same queue.
#[derive(Debug, Default, Clone)]
pub struct MockFeed {
    inner: Arc<Mutex<MockFeedInner>>,
}

#[derive(Debug, Default)]
struct MockFeedInner {
    queue: VecDeque<ChangeBatch>,
    delivered: usize,
    fail_next: Option<String>,
}

impl MockFeed {
    /// Create an empty mock feed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock feed preloaded with batches.
    pub fn with_batches(batches: impl IntoIterator<Item = ChangeBatch>) -> Self {
        let feed = Self::new();
        for batch in batches {
            feed.push_batch(batch);
        }
        feed
    }

    /// Queue a batch to be returned by a later `next_batch()` call.
    pub fn push_batch(&self, batch: ChangeBatch) {
        self.lock().queue.push_back(batch);
    }

    /// Cause the next `next_batch()` call to fail with the given error.
    pub fn fail_next_batch(&self, error: &str) {
        self.lock().fail_next = Some(error.to_string());
    }

    /// Number of batches handed out so far.
    pub fn delivered(&self) -> usize {
        self.lock().delivered
    }

    /// Number of batches still queued.
    pub fn remaining(&self) -> usize {
        self.lock().queue.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockFeedInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ChangeFeed for MockFeed {
    async fn next_batch(&mut self) -> Result<Option<ChangeBatch>, FeedError> {
        let mut inner = self.lock();

        // Check for forced failure
        if let Some(error) = inner.fail_next.take() {
            return Err(FeedError::ReceiveFailed(error));
        }

        let batch = inner.queue.pop_front();
        if batch.is_some() {
            inner.delivered += 1;
        }
        Ok(batch)
    }
}
