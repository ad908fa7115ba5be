//! Engine configuration.

use std::time::Duration;

/// Default interval between retries of a batch whose commit failed.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// Configuration for [`SyncEngine`](crate::SyncEngine).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Store entity holding conversations.
    pub conversation_entity: String,
    /// Store entity holding messages.
    pub message_entity: String,
    /// How often the processing loop retries a failed batch.
    pub retry_interval: Duration,
    /// Start in the suspended state.
    pub start_suspended: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            conversation_entity: "Conversation".to_string(),
            message_entity: "Message".to_string(),
            retry_interval: DEFAULT_RETRY_INTERVAL,
            start_suspended: false,
        }
    }
}

impl EngineConfig {
    /// Create a configuration with default entity names.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the entity names the store uses.
    pub fn with_entity_names(mut self, conversation: &str, message: &str) -> Self {
        self.conversation_entity = conversation.to_string();
        self.message_entity = message.to_string();
        self
    }

    /// Set the retry interval.
    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    /// Start suspended: batches queue until `resume()`.
    pub fn suspended(mut self) -> Self {
        self.start_suspended = true;
        self
    }
}
