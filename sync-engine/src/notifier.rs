//! Change listeners and fan-out.
//!
//! After a batch commits, the engine hands its coalesced [`RecordChange`]s to
//! the [`Notifier`], which calls every registered [`ChangeListener`]. A
//! listener that fails or panics is logged and skipped; the other listeners
//! and the committed data are unaffected.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use sync_core::RecordChange;
use sync_types::{FieldChange, LocalRecord, RemoteObject};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::warn;

/// Errors a listener may report.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// The listener refused the change.
    #[error("listener rejected change: {0}")]
    Rejected(String),

    /// The listener's downstream channel is gone.
    #[error("listener channel closed")]
    ChannelClosed,
}

/// Receives committed record changes.
///
/// All methods are optional; the defaults ignore the change.
pub trait ChangeListener: Send + Sync {
    /// A record was created.
    fn on_created(
        &self,
        _record: &LocalRecord,
        _snapshot: &RemoteObject,
    ) -> Result<(), ListenerError> {
        Ok(())
    }

    /// Fields of a record changed.
    fn on_updated(
        &self,
        _record: &LocalRecord,
        _changes: &[FieldChange],
        _snapshot: &RemoteObject,
    ) -> Result<(), ListenerError> {
        Ok(())
    }

    /// A record was deleted.
    fn on_deleted(
        &self,
        _record: &LocalRecord,
        _snapshot: &RemoteObject,
    ) -> Result<(), ListenerError> {
        Ok(())
    }
}

/// Handle returned by [`Notifier::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Delivery counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotifierStats {
    /// Calls that returned `Ok`.
    pub delivered: u64,
    /// Calls that returned an error.
    pub failed: u64,
    /// Calls that panicked.
    pub panicked: u64,
}

/// Registry of change listeners.
#[derive(Default)]
pub struct Notifier {
    listeners: RwLock<Vec<(ListenerId, Arc<dyn ChangeListener>)>>,
    next_id: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    panicked: AtomicU64,
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("listeners", &self.len())
            .field("stats", &self.stats())
            .finish()
    }
}

impl Notifier {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a listener.
    pub fn register(&self, listener: Arc<dyn ChangeListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, listener));
        id
    }

    /// Remove a listener. Returns false if it was not registered.
    pub fn unregister(&self, id: ListenerId) -> bool {
        let mut listeners = self
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Check if no listener is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Delivery counters so far.
    pub fn stats(&self) -> NotifierStats {
        NotifierStats {
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            panicked: self.panicked.load(Ordering::Relaxed),
        }
    }

    /// Deliver changes, in order, to every listener.
    pub fn dispatch(&self, changes: &[RecordChange]) {
        if changes.is_empty() {
            return;
        }

        // Callbacks may register or unregister listeners.
        let listeners: Vec<_> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for change in changes {
            for (id, listener) in &listeners {
                self.deliver(*id, listener.as_ref(), change);
            }
        }
    }

    fn deliver(&self, id: ListenerId, listener: &dyn ChangeListener, change: &RecordChange) {
        let outcome = catch_unwind(AssertUnwindSafe(|| match change {
            RecordChange::Created { record, snapshot } => listener.on_created(record, snapshot),
            RecordChange::Updated {
                record,
                changes,
                snapshot,
            } => listener.on_updated(record, changes, snapshot),
            RecordChange::Deleted { record, snapshot } => listener.on_deleted(record, snapshot),
        }));

        let record = change.record();
        match outcome {
            Ok(Ok(())) => {
                self.delivered.fetch_add(1, Ordering::Relaxed);
            }
            Ok(Err(e)) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                warn!(
                    listener = id.0,
                    kind = %record.kind(),
                    identifier = %record.identifier(),
                    change = change.name(),
                    error = %e,
                    "listener failed"
                );
            }
            Err(_) => {
                self.panicked.fetch_add(1, Ordering::Relaxed);
                warn!(
                    listener = id.0,
                    kind = %record.kind(),
                    identifier = %record.identifier(),
                    change = change.name(),
                    "listener panicked"
                );
            }
        }
    }
}

/// Listener that forwards every change into a channel.
#[derive(Debug, Clone)]
pub struct ChannelListener {
    tx: mpsc::UnboundedSender<RecordChange>,
}

impl ChannelListener {
    /// Create a listener and the receiving end of its channel.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<RecordChange>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn forward(&self, change: RecordChange) -> Result<(), ListenerError> {
        self.tx
            .send(change)
            .map_err(|_| ListenerError::ChannelClosed)
    }
}

impl ChangeListener for ChannelListener {
    fn on_created(&self, record: &LocalRecord, snapshot: &RemoteObject) -> Result<(), ListenerError> {
        self.forward(RecordChange::Created {
            record: record.clone(),
            snapshot: snapshot.clone(),
        })
    }

    fn on_updated(
        &self,
        record: &LocalRecord,
        changes: &[FieldChange],
        snapshot: &RemoteObject,
    ) -> Result<(), ListenerError> {
        self.forward(RecordChange::Updated {
            record: record.clone(),
            changes: changes.to_vec(),
            snapshot: snapshot.clone(),
        })
    }

    fn on_deleted(&self, record: &LocalRecord, snapshot: &RemoteObject) -> Result<(), ListenerError> {
        self.forward(RecordChange::Deleted {
            record: record.clone(),
            snapshot: snapshot.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use sync_types::{ConversationRecord, RemoteId};

    fn created(id: &str) -> RecordChange {
        let record = LocalRecord::Conversation(ConversationRecord {
            identifier: RemoteId::new(id),
            created_at: 0,
            last_message: None,
        });
        let snapshot = record.to_snapshot();
        RecordChange::Created { record, snapshot }
    }

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<String>>,
    }

    impl ChangeListener for Recorder {
        fn on_created(&self, record: &LocalRecord, _: &RemoteObject) -> Result<(), ListenerError> {
            self.seen
                .lock()
                .unwrap()
                .push(record.identifier().to_string());
            Ok(())
        }
    }

    struct Failing;

    impl ChangeListener for Failing {
        fn on_created(&self, _: &LocalRecord, _: &RemoteObject) -> Result<(), ListenerError> {
            Err(ListenerError::Rejected("nope".into()))
        }
    }

    struct Panicking;

    impl ChangeListener for Panicking {
        fn on_created(&self, _: &LocalRecord, _: &RemoteObject) -> Result<(), ListenerError> {
            panic!("listener bug");
        }
    }

    struct Silent;

    impl ChangeListener for Silent {}

    #[test]
    fn delivers_in_order() {
        let notifier = Notifier::new();
        let recorder = Arc::new(Recorder::default());
        notifier.register(recorder.clone());

        notifier.dispatch(&[created("c1"), created("c2")]);

        assert_eq!(*recorder.seen.lock().unwrap(), vec!["c1", "c2"]);
        assert_eq!(notifier.stats().delivered, 2);
    }

    #[test]
    fn failing_and_panicking_listeners_are_isolated() {
        let notifier = Notifier::new();
        let recorder = Arc::new(Recorder::default());
        notifier.register(Arc::new(Failing));
        notifier.register(Arc::new(Panicking));
        notifier.register(recorder.clone());

        notifier.dispatch(&[created("c1")]);

        assert_eq!(*recorder.seen.lock().unwrap(), vec!["c1"]);
        assert_eq!(
            notifier.stats(),
            NotifierStats {
                delivered: 1,
                failed: 1,
                panicked: 1,
            }
        );
    }

    #[test]
    fn default_methods_ignore_changes() {
        let notifier = Notifier::new();
        notifier.register(Arc::new(Silent));
        notifier.dispatch(&[created("c1")]);
        assert_eq!(notifier.stats().delivered, 1);
    }

    #[test]
    fn unregister_stops_delivery() {
        let notifier = Notifier::new();
        let recorder = Arc::new(Recorder::default());
        let id = notifier.register(recorder.clone());
        assert_eq!(notifier.len(), 1);

        assert!(notifier.unregister(id));
        assert!(!notifier.unregister(id));
        assert!(notifier.is_empty());

        notifier.dispatch(&[created("c1")]);
        assert!(recorder.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn channel_listener_forwards() {
        let notifier = Notifier::new();
        let (listener, mut rx) = ChannelListener::new();
        notifier.register(Arc::new(listener));

        notifier.dispatch(&[created("c1")]);

        let change = rx.recv().await.unwrap();
        assert_eq!(change, created("c1"));
    }

    #[test]
    fn closed_channel_counts_as_failure() {
        let notifier = Notifier::new();
        let (listener, rx) = ChannelListener::new();
        drop(rx);
        notifier.register(Arc::new(listener));

        notifier.dispatch(&[created("c1")]);
        assert_eq!(notifier.stats().failed, 1);
    }
}
