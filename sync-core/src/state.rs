//! Suspend/resume state machine for convo-sync.
//!
//! This module provides a pure, side-effect-free state machine that decides
//! whether incoming batches are processed now or held back. It takes events
//! as input and produces a new state plus a list of actions to execute.
//!
//! The actual work (queueing, applying batches, committing) is performed by
//! sync-engine, not by this module.

/// Controller state - NO I/O, just state transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControllerState {
    /// Batches are applied as they arrive.
    #[default]
    Running,
    /// Batches are queued and not applied until resumed.
    Suspended,
}

impl ControllerState {
    /// Create a new state machine in the Running state.
    pub fn new() -> Self {
        Self::Running
    }

    /// Process an event and return the new state plus actions to execute.
    ///
    /// This is a pure function - no side effects. The caller (sync-engine)
    /// is responsible for executing the returned actions.
    pub fn on_event(self, event: ControlEvent) -> (Self, Vec<ControlAction>) {
        match (self, event) {
            (Self::Running, ControlEvent::SuspendRequested) => {
                (Self::Suspended, vec![ControlAction::HoldBatches])
            }
            (Self::Suspended, ControlEvent::ResumeRequested) => {
                (Self::Running, vec![ControlAction::DrainQueue])
            }

            // Every batch goes through the queue so arrival order is the
            // processing order, whatever the state.
            (Self::Running, ControlEvent::BatchArrived) => (
                Self::Running,
                vec![ControlAction::Enqueue, ControlAction::DrainQueue],
            ),
            (Self::Suspended, ControlEvent::BatchArrived) => {
                (Self::Suspended, vec![ControlAction::Enqueue])
            }

            (state, ControlEvent::BatchCommitted) => (state, vec![ControlAction::Ack]),
            (state, ControlEvent::BatchFailed) => (state, vec![ControlAction::Requeue]),

            // Retry only makes progress while running.
            (Self::Running, ControlEvent::RetryRequested) => {
                (Self::Running, vec![ControlAction::DrainQueue])
            }

            // Suspend while suspended, resume while running, retry while
            // suspended: no-ops.
            (state, _) => (state, vec![]),
        }
    }

    /// Check if currently suspended.
    pub fn is_suspended(&self) -> bool {
        matches!(self, Self::Suspended)
    }

    /// Check if batches may be applied right now.
    pub fn may_process(&self) -> bool {
        matches!(self, Self::Running)
    }
}

/// Events that drive the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEvent {
    /// Caller asked to suspend processing.
    SuspendRequested,
    /// Caller asked to resume processing.
    ResumeRequested,
    /// The feed delivered a batch.
    BatchArrived,
    /// The in-flight batch committed.
    BatchCommitted,
    /// The in-flight batch failed to commit.
    BatchFailed,
    /// A retry pass was requested (timer or caller).
    RetryRequested,
}

/// Actions to be executed by the sync-engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    /// Append the arriving batch to the pending queue.
    Enqueue,
    /// Apply queued batches in order until the queue is empty, the state
    /// leaves Running, or a commit fails.
    DrainQueue,
    /// Stop taking batches off the queue after the in-flight one.
    HoldBatches,
    /// Drop the in-flight batch from the queue.
    Ack,
    /// Put the in-flight batch back at the front of the queue.
    Requeue,
}
