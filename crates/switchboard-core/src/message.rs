//! Chat message model.
//!
//! A message is created once by the router at send time and never mutated.
//! The same serialized body is published to every channel it fans out to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A unique message identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    /// Generate a fresh identifier (random v4 UUID).
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for MessageId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message identifier.
    pub id: MessageId,
    /// Topic the message was sent to.
    pub topic: String,
    /// Message text.
    pub content: String,
    /// Display name of the sender.
    pub author: String,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Create a new message stamped with a fresh id and the current time.
    #[must_use]
    pub fn new(
        topic: impl Into<String>,
        content: impl Into<String>,
        author: impl Into<String>,
    ) -> Self {
        Self {
            id: MessageId::generate(),
            topic: topic.into(),
            content: content.into(),
            author: author.into(),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_creation() {
        let before = Utc::now();
        let msg = Message::new("general", "hi", "alice");

        assert_eq!(msg.topic, "general");
        assert_eq!(msg.content, "hi");
        assert_eq!(msg.author, "alice");
        assert!(!msg.id.as_str().is_empty());
        assert!(msg.timestamp >= before);
    }

    #[test]
    fn test_unique_message_ids() {
        let id1 = MessageId::generate();
        let id2 = MessageId::generate();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_wire_field_names() {
        let msg = Message::new("tech", "rust", "bob");
        let value = serde_json::to_value(&msg).unwrap();
        let obj = value.as_object().unwrap();

        let mut keys: Vec<&str> = obj.keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(keys, vec!["author", "content", "id", "timestamp", "topic"]);

        let parsed: Message = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, msg);
    }
}
