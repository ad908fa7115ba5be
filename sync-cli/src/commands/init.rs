//! Initialize configuration and database.

use anyhow::{Context, Result};
use std::path::Path;
use sync_store::SqliteStore;

use crate::config::Config;

/// Run the init command.
pub async fn run(data_dir: &Path, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        anyhow::bail!(
            "Already initialized. Delete {} to reinitialize.",
            config_path.display()
        );
    }

    if let Some(parent) = config_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .context("Failed to create config directory")?;
    }

    let config = Config::default();
    config.save(config_path)?;

    let database = config.database_path(data_dir);
    let store = SqliteStore::new(&database)
        .await
        .with_context(|| format!("Failed to create database {}", database.display()))?;
    store.close().await;

    println!("Initialized successfully!");
    println!();
    println!("  Config:   {}", config_path.display());
    println!("  Database: {}", database.display());
    println!();
    println!("Next steps:");
    println!("  convo-sync replay <feed.jsonl>");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CONFIG_FILE;
    use tempfile::tempdir;

    #[tokio::test]
    async fn init_creates_config_and_database() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join(CONFIG_FILE);
        run(dir.path(), &config_path).await.unwrap();

        assert!(config_path.exists());
        assert!(dir.path().join("convo.db").exists());
        assert_eq!(Config::from_file(&config_path).unwrap(), Config::default());
    }

    #[tokio::test]
    async fn init_fails_if_already_initialized() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join(CONFIG_FILE);

        run(dir.path(), &config_path).await.unwrap();

        let result = run(dir.path(), &config_path).await;
        assert!(result.is_err());
    }
}
