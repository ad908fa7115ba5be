//! Configuration management for convo-sync.
//!
//! Configuration is loaded from a TOML file (default: `config.toml` in the
//! data directory).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use sync_engine::EngineConfig;

/// File name of the configuration inside the data directory.
pub const CONFIG_FILE: &str = "config.toml";

/// Root configuration for convo-sync.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Store configuration.
    #[serde(default)]
    pub store: StoreConfig,
    /// Engine configuration.
    #[serde(default)]
    pub engine: EngineSection,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Store configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path to the SQLite database (relative paths resolve against the data dir).
    #[serde(default = "default_database_path")]
    pub database: PathBuf,
}

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSection {
    /// Store entity holding conversations (default: Conversation).
    #[serde(default = "default_conversation_entity")]
    pub conversation_entity: String,
    /// Store entity holding messages (default: Message).
    #[serde(default = "default_message_entity")]
    pub message_entity: String,
    /// Delay before retrying a failed commit, in milliseconds (default: 5000).
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is unset (default: info).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("convo.db")
}

fn default_conversation_entity() -> String {
    "Conversation".to_string()
}

fn default_message_entity() -> String {
    "Message".to_string()
}

fn default_retry_interval_ms() -> u64 {
    5_000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database: default_database_path(),
        }
    }
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            conversation_entity: default_conversation_entity(),
            message_entity: default_message_entity(),
            retry_interval_ms: default_retry_interval_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Load the file if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Write configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| ConfigError::WriteError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Database path, resolved against the data directory.
    pub fn database_path(&self, data_dir: &Path) -> PathBuf {
        if self.store.database.is_absolute() {
            self.store.database.clone()
        } else {
            data_dir.join(&self.store.database)
        }
    }

    /// Engine settings from the `[engine]` section.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig::new()
            .with_entity_names(&self.engine.conversation_entity, &self.engine.message_entity)
            .with_retry_interval(Duration::from_millis(self.engine.retry_interval_ms))
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
    /// Failed to write configuration file.
    #[error("failed to write config file {path}: {source}")]
    WriteError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to serialize configuration.
    #[error("failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert_eq!(config.store.database, PathBuf::from("convo.db"));
        assert_eq!(config.engine.conversation_entity, "Conversation");
        assert_eq!(config.engine.retry_interval_ms, 5_000);
        assert_eq!(config.logging.log_level, "info");
    }

    #[test]
    fn config_from_toml_string() {
        let toml = r#"
[store]
database = "/data/convo.db"

[engine]
conversation_entity = "Thread"
message_entity = "Post"
retry_interval_ms = 250

[logging]
log_level = "debug"
"#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.store.database, PathBuf::from("/data/convo.db"));
        assert_eq!(config.engine.message_entity, "Post");
        assert_eq!(config.logging.log_level, "debug");

        let engine = config.engine_config();
        assert_eq!(engine.conversation_entity, "Thread");
        assert_eq!(engine.retry_interval, Duration::from_millis(250));
    }

    #[test]
    fn config_missing_sections_use_defaults() {
        let config: Config = toml::from_str("[engine]\nretry_interval_ms = 10\n").unwrap();
        assert_eq!(config.store, StoreConfig::default());
        assert_eq!(config.engine.message_entity, "Message");
        assert_eq!(config.engine.retry_interval_ms, 10);
    }

    #[test]
    fn relative_database_resolves_against_data_dir() {
        let config = Config::default();
        assert_eq!(
            config.database_path(Path::new("/var/lib/convo")),
            PathBuf::from("/var/lib/convo/convo.db")
        );

        let mut absolute = Config::default();
        absolute.store.database = PathBuf::from("/tmp/other.db");
        assert_eq!(
            absolute.database_path(Path::new("/var/lib/convo")),
            PathBuf::from("/tmp/other.db")
        );
    }

    #[test]
    fn save_then_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);

        let mut config = Config::default();
        config.engine.retry_interval_ms = 42;
        config.save(&path).unwrap();

        assert_eq!(Config::from_file(&path).unwrap(), config);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::load_or_default(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn invalid_toml_is_parse_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "[engine\n").unwrap();

        assert!(matches!(
            Config::from_file(&path),
            Err(ConfigError::ParseError { .. })
        ));
    }
}
