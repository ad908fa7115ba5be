//! SyncEngine - the main interface for convo-sync.
//!
//! This module provides [`SyncEngine`], which applies batches of remote
//! change events to a local [`RecordStore`].
//!
//! # Architecture
//!
//! SyncEngine uses a pure state machine and queue (from sync-core) to decide
//! when batches run, and interprets the resulting actions against the store.
//!
//! ```text
//! ChangeFeed → SyncEngine → StoreTransaction → RecordStore
//!                  ↓                ↓
//!       sync-core (state, queue)   Notifier → ChangeListeners
//! ```
//!
//! # Example
//!
//! ```ignore
//! use sync_engine::{EngineConfig, SyncEngine};
//! use sync_store::MemoryStore;
//!
//! let engine = SyncEngine::new(MemoryStore::new(), EngineConfig::default()).await?;
//! engine.notifier().register(listener);
//!
//! let reports = engine.on_batch(batch).await?;
//! engine.suspend().await;
//! engine.on_batch(another).await?; // queued
//! engine.resume().await?;          // applied now
//! ```

use sync_core::{
    validate, ControlAction, ControlEvent, ControllerState, PendingQueue, RecordChange,
    SchemaError, CONVERSATION_ENTITY, MESSAGE_ENTITY,
};
use sync_store::{RecordStore, StorageError, StoreTransaction};
use sync_types::{BatchId, ChangeBatch, MalformedEvent};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::apply::BatchApplier;
use crate::config::EngineConfig;
use crate::notifier::Notifier;

/// Engine errors.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The store handle is closed, read-only, or cannot be inspected.
    #[error("invalid store handle: {0}")]
    InvalidStoreHandle(#[source] StorageError),

    /// The store does not provide the entities the engine needs.
    #[error("store schema mismatch: {0}")]
    SchemaMismatch(#[from] SchemaError),

    /// A batch could not be committed. It stays queued for retry.
    #[error("batch {batch_id} failed to commit: {source}")]
    BatchCommitFailed {
        /// The batch that failed.
        batch_id: BatchId,
        /// The store failure.
        #[source]
        source: StorageError,
    },
}

/// Summary of one committed batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    /// The batch.
    pub batch_id: BatchId,
    /// Records created.
    pub created: usize,
    /// Records updated.
    pub updated: usize,
    /// Records deleted.
    pub deleted: usize,
    /// Events skipped as malformed.
    pub malformed: Vec<MalformedEvent>,
}

impl BatchReport {
    fn new(batch_id: BatchId, changes: &[RecordChange], malformed: Vec<MalformedEvent>) -> Self {
        let mut report = Self {
            batch_id,
            created: 0,
            updated: 0,
            deleted: 0,
            malformed,
        };
        for change in changes {
            match change {
                RecordChange::Created { .. } => report.created += 1,
                RecordChange::Updated { .. } => report.updated += 1,
                RecordChange::Deleted { .. } => report.deleted += 1,
            }
        }
        report
    }
}

/// Controller state plus the queue it governs.
#[derive(Debug, Default)]
struct Controller {
    state: ControllerState,
    queue: PendingQueue,
}

impl Controller {
    /// Feed an event to the state machine and carry out its actions.
    ///
    /// Returns true when the queue should be drained.
    fn handle(
        &mut self,
        event: ControlEvent,
        mut arriving: Option<ChangeBatch>,
        in_flight: Option<&BatchId>,
    ) -> bool {
        let (state, actions) = self.state.on_event(event);
        self.state = state;

        let mut drain = false;
        for action in actions {
            match action {
                ControlAction::Enqueue => {
                    if let Some(batch) = arriving.take() {
                        self.queue.enqueue(batch);
                    }
                }
                ControlAction::DrainQueue => drain = true,
                ControlAction::HoldBatches => {
                    debug!(queued = self.queue.len(), "holding batches");
                }
                ControlAction::Ack => {
                    if let Some(id) = in_flight {
                        self.queue.ack(id);
                    }
                }
                ControlAction::Requeue => {
                    if let Some(id) = in_flight {
                        self.queue.nack(id);
                    }
                }
            }
        }
        drain
    }
}

/// The reconciliation engine.
///
/// Applies change batches to a store, one at a time, in arrival order.
pub struct SyncEngine<S: RecordStore> {
    store: S,
    config: EngineConfig,
    controller: Mutex<Controller>,
    /// Held while batches are applied; one drain at a time.
    drain_gate: Mutex<()>,
    notifier: Notifier,
}

impl<S: RecordStore> SyncEngine<S> {
    /// Create an engine over a store.
    ///
    /// Fails if the store handle is unusable or its schema lacks a required
    /// entity, attribute, or relationship.
    pub async fn new(store: S, config: EngineConfig) -> Result<Self, EngineError> {
        store
            .check_handle()
            .map_err(EngineError::InvalidStoreHandle)?;
        let schema = store
            .schema()
            .await
            .map_err(EngineError::InvalidStoreHandle)?;
        validate(&CONVERSATION_ENTITY, &config.conversation_entity, &schema)?;
        validate(&MESSAGE_ENTITY, &config.message_entity, &schema)?;

        let state = if config.start_suspended {
            ControllerState::Suspended
        } else {
            ControllerState::Running
        };

        info!(
            conversation_entity = %config.conversation_entity,
            message_entity = %config.message_entity,
            suspended = state.is_suspended(),
            "sync engine ready"
        );

        Ok(Self {
            store,
            config,
            controller: Mutex::new(Controller {
                state,
                queue: PendingQueue::new(),
            }),
            drain_gate: Mutex::new(()),
            notifier: Notifier::new(),
        })
    }

    /// The store the engine writes to.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The listener registry.
    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Accept a batch from the feed.
    ///
    /// The batch is queued behind any earlier ones. When running, the queue
    /// is drained and a report is returned for each batch this call
    /// committed. When suspended, the batch waits for [`resume`](Self::resume).
    pub async fn on_batch(&self, batch: ChangeBatch) -> Result<Vec<BatchReport>, EngineError> {
        debug!(batch = %batch.id, events = batch.len(), "batch arrived");
        let drain = self
            .controller
            .lock()
            .await
            .handle(ControlEvent::BatchArrived, Some(batch), None);

        if drain {
            self.drain().await
        } else {
            Ok(Vec::new())
        }
    }

    /// Stop applying batches. Arriving batches queue until resumed.
    ///
    /// A batch already being applied finishes first. Suspending twice is a
    /// no-op.
    pub async fn suspend(&self) {
        let mut controller = self.controller.lock().await;
        if !controller.state.is_suspended() {
            info!("suspending sync engine");
        }
        controller.handle(ControlEvent::SuspendRequested, None, None);
    }

    /// Resume and apply every queued batch in arrival order.
    ///
    /// Resuming while running is a no-op.
    pub async fn resume(&self) -> Result<Vec<BatchReport>, EngineError> {
        let drain = {
            let mut controller = self.controller.lock().await;
            let drain = controller.handle(ControlEvent::ResumeRequested, None, None);
            if drain {
                info!(queued = controller.queue.len(), "resuming sync engine");
            }
            drain
        };

        if drain {
            self.drain().await
        } else {
            Ok(Vec::new())
        }
    }

    /// Try the queued batches again (after a failed commit).
    pub async fn retry(&self) -> Result<Vec<BatchReport>, EngineError> {
        let drain = self
            .controller
            .lock()
            .await
            .handle(ControlEvent::RetryRequested, None, None);

        if drain {
            self.drain().await
        } else {
            Ok(Vec::new())
        }
    }

    /// Check if the engine is suspended.
    pub async fn is_suspended(&self) -> bool {
        self.controller.lock().await.state.is_suspended()
    }

    /// Number of batches not yet committed.
    pub async fn pending_count(&self) -> usize {
        self.controller.lock().await.queue.total_count()
    }

    /// Apply queued batches until the queue is empty, the engine is
    /// suspended, or a commit fails.
    async fn drain(&self) -> Result<Vec<BatchReport>, EngineError> {
        let _gate = self.drain_gate.lock().await;
        let mut reports = Vec::new();

        loop {
            let batch = {
                let mut controller = self.controller.lock().await;
                if !controller.state.may_process() {
                    break;
                }
                match controller.queue.dequeue() {
                    Some(batch) => batch,
                    None => break,
                }
            };

            match self.apply(&batch).await {
                Ok((report, changes)) => {
                    self.controller.lock().await.handle(
                        ControlEvent::BatchCommitted,
                        None,
                        Some(&batch.id),
                    );
                    debug!(
                        batch = %batch.id,
                        created = report.created,
                        updated = report.updated,
                        deleted = report.deleted,
                        malformed = report.malformed.len(),
                        "batch committed"
                    );
                    self.notifier.dispatch(&changes);
                    reports.push(report);
                }
                Err(e) => {
                    self.controller.lock().await.handle(
                        ControlEvent::BatchFailed,
                        None,
                        Some(&batch.id),
                    );
                    error!(batch = %batch.id, error = %e, "batch requeued");
                    return Err(e);
                }
            }
        }

        Ok(reports)
    }

    /// Apply one batch in a transaction and commit it.
    async fn apply(
        &self,
        batch: &ChangeBatch,
    ) -> Result<(BatchReport, Vec<RecordChange>), EngineError> {
        let failed = |source| EngineError::BatchCommitFailed {
            batch_id: batch.id,
            source,
        };

        let mut tx = self.store.begin().await.map_err(failed)?;

        let mut applier = BatchApplier::new(&mut tx);
        let mut outcome = Ok(());
        for (position, event) in batch.events.iter().enumerate() {
            if let Err(e) = applier.apply(position, event).await {
                outcome = Err(e);
                break;
            }
        }
        let (ledger, malformed) = applier.finish();

        if let Err(e) = outcome {
            if let Err(rollback) = tx.rollback().await {
                warn!(batch = %batch.id, error = %rollback, "rollback failed");
            }
            return Err(failed(e));
        }

        tx.commit().await.map_err(failed)?;

        let changes = ledger.finish();
        let report = BatchReport::new(batch.id, &changes, malformed);
        Ok((report, changes))
    }
}
