//! Show store status.

use anyhow::{Context, Result};
use std::path::Path;
use sync_core::{validate, SchemaError, CONVERSATION_ENTITY, MESSAGE_ENTITY};
use sync_store::{RecordStore, SqliteStore};

use crate::config::Config;

/// What `status` found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreStatus {
    /// No database at the configured path.
    Missing,
    /// Database present.
    Present {
        /// Conversation records.
        conversations: u64,
        /// Message records.
        messages: u64,
        /// First schema problem, if any.
        schema_error: Option<SchemaError>,
    },
}

/// Run the status command.
pub async fn run(data_dir: &Path, config_path: &Path, config: &Config) -> Result<StoreStatus> {
    println!("=== convo-sync status ===");
    println!();

    if config_path.exists() {
        println!("Config:   {}", config_path.display());
    } else {
        println!("Config:   NOT FOUND (using defaults)");
    }

    let database = config.database_path(data_dir);
    if !database.exists() {
        println!("Database: NOT INITIALIZED");
        println!();
        println!("Run 'convo-sync init' to initialize.");
        return Ok(StoreStatus::Missing);
    }
    println!("Database: {}", database.display());
    println!();

    let store = SqliteStore::new(&database)
        .await
        .with_context(|| format!("Failed to open database {}", database.display()))?
        .with_entity_names(&config.engine.conversation_entity, &config.engine.message_entity);

    let counts = store.counts().await?;
    let schema = store.schema().await?;
    store.close().await;

    let schema_error = validate(
        &CONVERSATION_ENTITY,
        &config.engine.conversation_entity,
        &schema,
    )
    .and_then(|()| validate(&MESSAGE_ENTITY, &config.engine.message_entity, &schema))
    .err();

    let status = StoreStatus::Present {
        conversations: counts.conversations,
        messages: counts.messages,
        schema_error,
    };
    status.print();
    Ok(status)
}

impl StoreStatus {
    fn print(&self) {
        let StoreStatus::Present {
            conversations,
            messages,
            schema_error,
        } = self
        else {
            return;
        };

        println!("Records:");
        println!("  Conversations: {conversations}");
        println!("  Messages:      {messages}");
        println!();
        match schema_error {
            None => println!("Schema:   compatible"),
            Some(e) => println!("Schema:   INCOMPATIBLE ({e})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CONFIG_FILE;
    use sqlx::sqlite::SqliteConnectOptions;
    use sqlx::{ConnectOptions, Connection};
    use tempfile::tempdir;

    #[tokio::test]
    async fn status_without_init() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join(CONFIG_FILE);

        // Succeeds but reports the missing database
        let status = run(dir.path(), &config_path, &Config::default())
            .await
            .unwrap();
        assert_eq!(status, StoreStatus::Missing);
    }

    #[tokio::test]
    async fn status_after_init() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join(CONFIG_FILE);
        crate::commands::init::run(dir.path(), &config_path)
            .await
            .unwrap();

        let status = run(dir.path(), &config_path, &Config::default())
            .await
            .unwrap();
        assert_eq!(
            status,
            StoreStatus::Present {
                conversations: 0,
                messages: 0,
                schema_error: None,
            }
        );
    }

    #[tokio::test]
    async fn status_reports_broken_schema() {
        let dir = tempdir().unwrap();
        let config = Config::default();
        let database = config.database_path(dir.path());

        SqliteStore::new(&database).await.unwrap().close().await;

        // Strip a required column behind the store's back.
        let mut conn = SqliteConnectOptions::new()
            .filename(&database)
            .connect()
            .await
            .unwrap();
        sqlx::query("ALTER TABLE messages DROP COLUMN is_sent")
            .execute(&mut conn)
            .await
            .unwrap();
        conn.close().await.unwrap();

        let status = run(dir.path(), &dir.path().join(CONFIG_FILE), &config)
            .await
            .unwrap();
        match status {
            StoreStatus::Present {
                schema_error: Some(SchemaError::MissingAttribute { attribute, .. }),
                ..
            } => assert_eq!(attribute, "isSent"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
