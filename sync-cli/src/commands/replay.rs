//! Replay a recorded change feed into the local store.
//!
//! The feed file holds one JSON-encoded `ChangeBatch` per line. Blank lines
//! are ignored.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use sync_engine::{BatchReport, ChannelListener, RecordChange, SyncEngine};
use sync_store::SqliteStore;
use sync_types::{ChangeBatch, FieldChange};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::info;

use crate::config::Config;

/// Totals over all replayed batches.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReplaySummary {
    /// Batches committed.
    pub batches: usize,
    /// Records created.
    pub created: usize,
    /// Records updated.
    pub updated: usize,
    /// Records deleted.
    pub deleted: usize,
    /// Events skipped as malformed.
    pub malformed: usize,
}

impl ReplaySummary {
    fn add(&mut self, reports: &[BatchReport]) {
        for report in reports {
            self.batches += 1;
            self.created += report.created;
            self.updated += report.updated;
            self.deleted += report.deleted;
            self.malformed += report.malformed.len();
            for malformed in &report.malformed {
                println!("skipped   {malformed}");
            }
        }
    }
}

/// Run the replay command.
pub async fn run(
    data_dir: &Path,
    config: &Config,
    feed: &Path,
    suspended: bool,
) -> Result<ReplaySummary> {
    let contents = tokio::fs::read_to_string(feed)
        .await
        .with_context(|| format!("Failed to read feed {}", feed.display()))?;
    let batches = parse_feed(&contents)?;

    let database = config.database_path(data_dir);
    let store = SqliteStore::new(&database)
        .await
        .with_context(|| format!("Failed to open database {}", database.display()))?
        .with_entity_names(&config.engine.conversation_entity, &config.engine.message_entity);
    let engine = SyncEngine::new(store, config.engine_config()).await?;

    let (listener, mut changes) = ChannelListener::new();
    engine.notifier().register(Arc::new(listener));

    info!(batches = batches.len(), suspended, "replaying feed");
    let mut summary = ReplaySummary::default();

    if suspended {
        engine.suspend().await;
        for batch in batches {
            engine.on_batch(batch).await?;
        }
        println!("queued    {} batches", engine.pending_count().await);
        summary.add(&engine.resume().await?);
        print_changes(&mut changes);
    } else {
        for batch in batches {
            let batch_id = batch.id;
            let reports = engine
                .on_batch(batch)
                .await
                .with_context(|| format!("Batch {batch_id} was not applied"))?;
            summary.add(&reports);
            print_changes(&mut changes);
        }
    }

    engine.store().close().await;

    println!();
    println!(
        "Replayed {} batches: {} created, {} updated, {} deleted, {} malformed",
        summary.batches, summary.created, summary.updated, summary.deleted, summary.malformed
    );

    Ok(summary)
}

/// Parse a JSON-lines feed.
fn parse_feed(contents: &str) -> Result<Vec<ChangeBatch>> {
    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            serde_json::from_str(line).with_context(|| format!("Invalid batch on line {}", n + 1))
        })
        .collect()
}

fn print_changes(changes: &mut UnboundedReceiver<RecordChange>) {
    while let Ok(change) = changes.try_recv() {
        println!("{}", describe(&change));
    }
}

fn describe(change: &RecordChange) -> String {
    let record = change.record();
    let line = format!(
        "{:<9} {} {}",
        change.name(),
        record.kind(),
        record.identifier()
    );
    match change {
        RecordChange::Updated { changes, .. } => {
            let fields: Vec<String> = changes.iter().map(describe_field).collect();
            format!("{line} [{}]", fields.join(", "))
        }
        _ => line,
    }
}

fn describe_field(change: &FieldChange) -> String {
    match change {
        FieldChange::LastMessage(Some(id)) => format!("lastMessage={id}"),
        FieldChange::LastMessage(None) => "lastMessage=none".to_string(),
        other => other.field_name().to_string(),
    }
}
