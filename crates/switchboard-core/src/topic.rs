//! Topic and channel naming for switchboard.
//!
//! Every topic maps to exactly one broker channel named `topic:<name>`. The
//! topic `all` is reserved: its channel mirrors every other topic.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// The reserved aggregate topic.
pub const AGGREGATE_TOPIC: &str = "all";

/// Prefix shared by all topic channels.
pub const CHANNEL_PREFIX: &str = "topic:";

/// Maximum topic name length.
pub const MAX_TOPIC_NAME_LENGTH: usize = 256;

/// Topics served when no catalog is configured.
pub const DEFAULT_TOPICS: [&str; 5] = ["all", "general", "tech", "random", "announcements"];

/// Validate a topic name for use in the catalog.
///
/// # Errors
///
/// Returns an error message if the topic name is invalid.
pub fn validate_topic_name(name: &str) -> Result<(), &'static str> {
    if name.is_empty() {
        return Err("Topic name cannot be empty");
    }
    if name.len() > MAX_TOPIC_NAME_LENGTH {
        return Err("Topic name too long");
    }
    if name.chars().any(char::is_control) {
        return Err("Topic name contains control characters");
    }
    Ok(())
}

/// Whether a topic is the aggregate topic.
#[must_use]
pub fn is_aggregate(topic: &str) -> bool {
    topic == AGGREGATE_TOPIC
}

/// A broker channel name derived from a topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChannelName(String);

impl ChannelName {
    /// The channel for a topic.
    #[must_use]
    pub fn for_topic(topic: &str) -> Self {
        Self(format!("{CHANNEL_PREFIX}{topic}"))
    }

    /// The aggregate channel, `topic:all`.
    #[must_use]
    pub fn aggregate() -> Self {
        Self::for_topic(AGGREGATE_TOPIC)
    }

    /// Parse a raw channel name. Returns `None` unless it carries the topic prefix.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        raw.strip_prefix(CHANNEL_PREFIX)
            .map(|_| Self(raw.to_string()))
    }

    /// The topic this channel belongs to.
    #[must_use]
    pub fn topic(&self) -> &str {
        self.0.strip_prefix(CHANNEL_PREFIX).unwrap_or(&self.0)
    }

    /// Whether this is the aggregate channel.
    #[must_use]
    pub fn is_aggregate(&self) -> bool {
        is_aggregate(self.topic())
    }

    /// The full channel name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ChannelName {
    type Error = String;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        if raw.starts_with(CHANNEL_PREFIX) {
            Ok(Self(raw))
        } else {
            Err(format!("channel '{raw}' lacks the '{CHANNEL_PREFIX}' prefix"))
        }
    }
}

impl From<ChannelName> for String {
    fn from(channel: ChannelName) -> Self {
        channel.0
    }
}

impl AsRef<str> for ChannelName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Catalog errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    /// The aggregate topic is missing.
    #[error("Topic catalog must include the aggregate topic '{AGGREGATE_TOPIC}'")]
    MissingAggregate,

    /// A topic is listed twice.
    #[error("Duplicate topic in catalog: {0}")]
    Duplicate(String),

    /// A topic name is invalid.
    #[error("Invalid topic '{topic}': {reason}")]
    InvalidTopic {
        /// Offending name.
        topic: String,
        /// Why it was rejected.
        reason: &'static str,
    },
}

/// The fixed, ordered list of topics served by the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicCatalog {
    topics: Vec<String>,
}

impl TopicCatalog {
    /// Build a catalog from a list of topics.
    ///
    /// # Errors
    ///
    /// Returns an error if a name is invalid, repeated, or the aggregate topic is absent.
    pub fn new(topics: Vec<String>) -> Result<Self, CatalogError> {
        for (i, topic) in topics.iter().enumerate() {
            validate_topic_name(topic).map_err(|reason| CatalogError::InvalidTopic {
                topic: topic.clone(),
                reason,
            })?;
            if topics[..i].contains(topic) {
                return Err(CatalogError::Duplicate(topic.clone()));
            }
        }
        if !topics.iter().any(|t| is_aggregate(t)) {
            return Err(CatalogError::MissingAggregate);
        }
        Ok(Self { topics })
    }

    /// Topic names in catalog order.
    #[must_use]
    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    /// Channels of every catalog topic, aggregate included, in catalog order.
    pub fn channels(&self) -> impl Iterator<Item = ChannelName> + '_ {
        self.topics.iter().map(|t| ChannelName::for_topic(t))
    }

    /// Whether a topic is in the catalog.
    #[must_use]
    pub fn contains(&self, topic: &str) -> bool {
        self.topics.iter().any(|t| t == topic)
    }

    /// Number of topics.
    #[must_use]
    pub fn len(&self) -> usize {
        self.topics.len()
    }

    /// Whether the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }
}

impl Default for TopicCatalog {
    fn default() -> Self {
        Self {
            topics: DEFAULT_TOPICS.iter().map(|t| (*t).to_string()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_for_topic() {
        let channel = ChannelName::for_topic("general");
        assert_eq!(channel.as_str(), "topic:general");
        assert_eq!(channel.topic(), "general");
        assert!(!channel.is_aggregate());
        assert!(ChannelName::aggregate().is_aggregate());
        assert_eq!(ChannelName::aggregate().to_string(), "topic:all");
    }

    #[test]
    fn test_channel_parse() {
        assert_eq!(
            ChannelName::parse("topic:tech"),
            Some(ChannelName::for_topic("tech"))
        );
        assert_eq!(ChannelName::parse("news:tech"), None);
    }

    #[test]
    fn test_topic_name_validation() {
        assert!(validate_topic_name("general").is_ok());
        assert!(validate_topic_name("").is_err());
        assert!(validate_topic_name("bad\nname").is_err());

        let long_name = "a".repeat(MAX_TOPIC_NAME_LENGTH + 1);
        assert!(validate_topic_name(&long_name).is_err());
    }

    #[test]
    fn test_default_catalog() {
        let catalog = TopicCatalog::default();
        assert_eq!(catalog.len(), 5);
        assert!(catalog.contains(AGGREGATE_TOPIC));

        let channels: Vec<String> = catalog.channels().map(|c| c.to_string()).collect();
        assert_eq!(
            channels,
            vec![
                "topic:all",
                "topic:general",
                "topic:tech",
                "topic:random",
                "topic:announcements"
            ]
        );
    }

    #[test]
    fn test_catalog_rejects_bad_lists() {
        assert_eq!(
            TopicCatalog::new(vec!["general".into()]),
            Err(CatalogError::MissingAggregate)
        );
        assert_eq!(
            TopicCatalog::new(vec!["all".into(), "tech".into(), "tech".into()]),
            Err(CatalogError::Duplicate("tech".into()))
        );
        assert!(matches!(
            TopicCatalog::new(vec!["all".into(), String::new()]),
            Err(CatalogError::InvalidTopic { .. })
        ));
    }
}
