//! Identity types for convo-sync.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier assigned to a remote object by the messaging provider.
///
/// Opaque to the engine; the only requirement is that it is non-empty.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteId(String);

impl RemoteId {
    /// Create a RemoteId from any string-like value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Get the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when the identifier is empty (never valid on the feed).
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl From<&str> for RemoteId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RemoteId({})", self.0)
    }
}

/// Identifier of the user who sent a message.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Create a UserId from any string-like value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Get the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UserId({})", self.0)
    }
}

/// A unique identifier for a batch of change events.
///
/// UUID v4 format (16 bytes). Assigned when the batch is built, used for
/// queue bookkeeping and diagnostics only.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatchId(uuid::Uuid);

impl BatchId {
    /// Create a new random BatchId.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Create a BatchId from raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        uuid::Uuid::from_slice(bytes).ok().map(Self)
    }

    /// Get the inner UUID.
    pub fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl Default for BatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BatchId({})", self.0)
    }
}

/// The kind of remote object a change event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// A conversation.
    Conversation,
    /// A message within a conversation.
    Message,
    /// Any other object kind the feed reports. Never synchronized.
    #[serde(other)]
    Unsupported,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::Conversation => f.write_str("conversation"),
            RecordKind::Message => f.write_str("message"),
            RecordKind::Unsupported => f.write_str("unsupported"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_id_display_is_raw_value() {
        let id = RemoteId::new("layer:///conversations/c1");
        assert_eq!(id.to_string(), "layer:///conversations/c1");
        assert_eq!(format!("{:?}", id), "RemoteId(layer:///conversations/c1)");
    }

    #[test]
    fn remote_id_blank_is_empty() {
        assert!(RemoteId::new("").is_empty());
        assert!(RemoteId::new("   ").is_empty());
        assert!(!RemoteId::new("c1").is_empty());
    }

    #[test]
    fn remote_id_serializes_as_plain_string() {
        let json = serde_json::to_string(&RemoteId::new("m1")).unwrap();
        assert_eq!(json, "\"m1\"");
    }

    #[test]
    fn batch_id_is_uuid_v4() {
        let id = BatchId::new();
        assert_eq!(id.as_uuid().get_version_num(), 4);
        assert_ne!(id, BatchId::new());
    }

    #[test]
    fn batch_id_from_bytes() {
        let original = BatchId::new();
        let restored = BatchId::from_bytes(original.as_uuid().as_bytes()).unwrap();
        assert_eq!(original, restored);
        assert!(BatchId::from_bytes(&[0u8; 3]).is_none());
    }

    #[test]
    fn unknown_kind_deserializes_as_unsupported() {
        let kind: RecordKind = serde_json::from_str("\"announcement\"").unwrap();
        assert_eq!(kind, RecordKind::Unsupported);

        let kind: RecordKind = serde_json::from_str("\"message\"").unwrap();
        assert_eq!(kind, RecordKind::Message);
    }
}
