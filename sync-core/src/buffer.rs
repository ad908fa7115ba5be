//! Pending batch queue for convo-sync.
//!
//! This module provides the queue every incoming batch passes through:
//! - FIFO ordering, so batches are applied in arrival order
//! - An in-flight slot (the batch currently being applied)
//! - Requeue-at-front when a commit fails, so nothing is lost or reordered
//!
//! The queue is unbounded. It lives in memory only; queued batches are lost
//! on process restart.

use std::collections::VecDeque;
use sync_types::{BatchId, ChangeBatch};

/// Pending batch queue with in-flight tracking.
///
/// Batches flow through the queue in this order:
/// 1. `enqueue()` - add to the back of the queue
/// 2. `dequeue()` - take the front batch, mark it in flight
/// 3. `ack()` - drop the in-flight batch (commit succeeded)
///
/// If the commit fails, call `nack()` to move the batch back to the front.
/// Only one batch is in flight at a time; `dequeue()` returns `None` until
/// the current one is acked or nacked.
#[derive(Debug, Default)]
pub struct PendingQueue {
    /// Batches waiting to be applied.
    queue: VecDeque<ChangeBatch>,
    /// Batch being applied right now.
    in_flight: Option<ChangeBatch>,
}

impl PendingQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a batch to the back of the queue.
    pub fn enqueue(&mut self, batch: ChangeBatch) {
        self.queue.push_back(batch);
    }

    /// Take the next batch off the queue and mark it in flight.
    ///
    /// Returns `None` if the queue is empty or a batch is already in flight.
    pub fn dequeue(&mut self) -> Option<ChangeBatch> {
        if self.in_flight.is_some() {
            return None;
        }
        let batch = self.queue.pop_front()?;
        self.in_flight = Some(batch.clone());
        Some(batch)
    }

    /// Acknowledge that the in-flight batch committed.
    ///
    /// Ignored if `batch_id` is not the in-flight batch.
    pub fn ack(&mut self, batch_id: &BatchId) {
        if self.is_in_flight(batch_id) {
            self.in_flight = None;
        }
    }

    /// Negative acknowledge - move the in-flight batch back to the front.
    ///
    /// Ignored if `batch_id` is not the in-flight batch.
    pub fn nack(&mut self, batch_id: &BatchId) {
        if self.is_in_flight(batch_id) {
            if let Some(batch) = self.in_flight.take() {
                self.queue.push_front(batch);
            }
        }
    }

    /// Check if the given batch is in flight.
    pub fn is_in_flight(&self, batch_id: &BatchId) -> bool {
        self.in_flight.as_ref().is_some_and(|b| &b.id == batch_id)
    }

    /// Check if any batch is in flight.
    pub fn has_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Number of batches waiting (not including the in-flight one).
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Check if nothing is waiting.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Total number of batches (waiting + in flight).
    pub fn total_count(&self) -> usize {
        self.queue.len() + usize::from(self.in_flight.is_some())
    }

    /// Identifiers of waiting batches, front first.
    pub fn queued_ids(&self) -> Vec<BatchId> {
        self.queue.iter().map(|b| b.id).collect()
    }
}
