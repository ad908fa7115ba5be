//! Processing loop: feed → engine.

use std::sync::Arc;
use sync_store::RecordStore;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::engine::{BatchReport, EngineError, SyncEngine};
use crate::feed::ChangeFeed;

/// Run the engine over a feed on a tokio task.
///
/// Batches are handed to [`SyncEngine::on_batch`] one at a time, in feed
/// order. After a failed commit the loop keeps consuming the feed and retries
/// every `retry_interval` until the queue drains. The task ends when the feed
/// closes.
pub fn spawn_engine<S, F>(engine: Arc<SyncEngine<S>>, mut feed: F) -> JoinHandle<()>
where
    S: RecordStore + 'static,
    F: ChangeFeed + 'static,
{
    tokio::spawn(async move {
        let mut retry = interval(engine.config().retry_interval);
        retry.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut retry_pending = false;

        info!("sync loop started");

        loop {
            tokio::select! {
                next = feed.next_batch() => match next {
                    Ok(Some(batch)) => {
                        retry_pending = log_outcome(engine.on_batch(batch).await);
                    }
                    Ok(None) => {
                        info!("feed closed");
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "feed error");
                    }
                },
                _ = retry.tick(), if retry_pending => {
                    debug!("retrying queued batches");
                    retry_pending = log_outcome(engine.retry().await);
                }
            }
        }

        if retry_pending {
            log_outcome(engine.retry().await);
        }
        let pending = engine.pending_count().await;
        info!(pending, "sync loop stopped");
    })
}

/// Log a drain result. Returns true if a retry is needed.
fn log_outcome(result: Result<Vec<BatchReport>, EngineError>) -> bool {
    match result {
        Ok(reports) => {
            for report in reports {
                for malformed in &report.malformed {
                    debug!(batch = %report.batch_id, "{malformed}");
                }
            }
            false
        }
        Err(e @ EngineError::BatchCommitFailed { .. }) => {
            error!(error = %e, "will retry");
            true
        }
        Err(e) => {
            error!(error = %e, "engine error");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::feed::{channel_feed, MockFeed};
    use std::time::Duration;
    use sync_store::MemoryStore;
    use sync_types::{ChangeBatch, ChangeEvent, ConversationSnapshot, RemoteId, RemoteObject};

    fn conversation_batch(id: &str) -> ChangeBatch {
        ChangeBatch::new(vec![ChangeEvent::added(RemoteObject::Conversation(
            ConversationSnapshot {
                identifier: RemoteId::new(id),
                created_at: 0,
            },
        ))])
    }

    #[tokio::test]
    async fn drains_feed_until_closed() {
        let engine = Arc::new(
            SyncEngine::new(MemoryStore::new(), EngineConfig::default())
                .await
                .unwrap(),
        );
        let feed = MockFeed::with_batches([conversation_batch("c1"), conversation_batch("c2")]);

        spawn_engine(Arc::clone(&engine), feed).await.unwrap();

        assert_eq!(engine.store().counts().await.unwrap().conversations, 2);
    }

    #[tokio::test]
    async fn feed_error_does_not_stop_loop() {
        let engine = Arc::new(
            SyncEngine::new(MemoryStore::new(), EngineConfig::default())
                .await
                .unwrap(),
        );
        let feed = MockFeed::with_batches([conversation_batch("c1")]);
        feed.fail_next_batch("hiccup");

        spawn_engine(Arc::clone(&engine), feed).await.unwrap();

        assert_eq!(engine.store().counts().await.unwrap().conversations, 1);
    }

    #[tokio::test]
    async fn retries_failed_commit_on_interval() {
        let config = EngineConfig::new().with_retry_interval(Duration::from_millis(10));
        let engine = Arc::new(SyncEngine::new(MemoryStore::new(), config).await.unwrap());
        engine.store().fail_next_commit("busy");

        let (sender, feed) = channel_feed(4);
        let handle = spawn_engine(Arc::clone(&engine), feed);
        sender.send(conversation_batch("c1")).await.unwrap();

        // Keep the feed open so only the retry timer can apply the batch.
        let mut applied = false;
        for _ in 0..100 {
            if engine.store().counts().await.unwrap().conversations == 1 {
                applied = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(applied);
        assert_eq!(engine.pending_count().await, 0);

        drop(sender);
        handle.await.unwrap();
    }
}
