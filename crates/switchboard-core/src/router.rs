//! Message router for switchboard.
//!
//! The router validates a send, stamps a [`Message`], and decides which
//! channels receive it:
//!
//! - a concrete topic publishes to its own channel first. That publish is
//!   authoritative and its failure fails the send. On success the message is
//!   mirrored to the aggregate channel, best effort.
//! - the aggregate topic broadcasts down to every catalog channel, the
//!   aggregate channel included. Every branch is best effort and the send
//!   always succeeds once the message exists.

use crate::message::Message;
use crate::publisher::{PublishError, Publisher};
use crate::topic::{is_aggregate, ChannelName, TopicCatalog};
use futures_util::future::join_all;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Invalid send input.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// Topic is empty.
    #[error("Topic is required")]
    EmptyTopic,
    /// Content is empty.
    #[error("Content is required")]
    EmptyContent,
    /// Author is empty.
    #[error("Author is required")]
    EmptyAuthor,
}

/// Router errors.
#[derive(Debug, Error)]
pub enum RouteError {
    /// The send was rejected before any publish.
    #[error("Invalid message: {0}")]
    Validation(#[from] ValidationError),

    /// The authoritative publish to the topic's own channel failed.
    #[error(transparent)]
    Publish(#[from] PublishError),
}

impl RouteError {
    /// Whether the error was caused by caller input.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, RouteError::Validation(_))
    }
}

/// Check that every field of a send is present.
///
/// # Errors
///
/// Returns the first missing field, checked as topic, content, then author.
pub fn validate(topic: &str, content: &str, author: &str) -> Result<(), ValidationError> {
    if topic.is_empty() {
        return Err(ValidationError::EmptyTopic);
    }
    if content.is_empty() {
        return Err(ValidationError::EmptyContent);
    }
    if author.is_empty() {
        return Err(ValidationError::EmptyAuthor);
    }
    Ok(())
}

/// Routes messages to topic channels through a [`Publisher`].
///
/// The router holds no mutable state, so a single instance serves all
/// requests concurrently.
pub struct MessageRouter<P> {
    publisher: P,
    catalog: TopicCatalog,
}

impl<P: Publisher> MessageRouter<P> {
    /// Create a router over `publisher` serving `catalog`.
    #[must_use]
    pub fn new(publisher: P, catalog: TopicCatalog) -> Self {
        info!(topics = ?catalog.topics(), "Creating message router");
        Self { publisher, catalog }
    }

    /// The topic catalog.
    #[must_use]
    pub fn catalog(&self) -> &TopicCatalog {
        &self.catalog
    }

    /// The underlying publisher.
    #[must_use]
    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    /// Validate, stamp, and publish a message.
    ///
    /// # Errors
    ///
    /// Returns a validation error if any field is empty, or the publish error
    /// if a concrete topic's own channel rejects the message. Aggregate sends
    /// never fail after validation.
    pub async fn route(
        &self,
        topic: &str,
        content: &str,
        author: &str,
    ) -> Result<Message, RouteError> {
        validate(topic, content, author)?;

        let message = Message::new(topic, content, author);

        if is_aggregate(topic) {
            self.broadcast(&message).await;
        } else {
            self.publish_and_mirror(&message).await?;
        }

        Ok(message)
    }

    /// Fan an aggregate-topic message out to every catalog channel.
    ///
    /// Returns the number of channels that failed.
    async fn broadcast(&self, message: &Message) -> usize {
        let channels: Vec<ChannelName> = self.catalog.channels().collect();

        let results = join_all(
            channels
                .iter()
                .map(|channel| self.publisher.publish(channel, message)),
        )
        .await;

        let mut failed = 0;
        for err in results.into_iter().filter_map(Result::err) {
            failed += 1;
            warn!(
                channel = %err.channel(),
                topic = %message.topic,
                message_id = %message.id,
                error = %err,
                "Broadcast publish failed"
            );
        }

        debug!(
            message_id = %message.id,
            channels = channels.len(),
            failed,
            "Broadcast complete"
        );
        failed
    }

    /// Publish to the topic's own channel, then mirror to the aggregate channel.
    async fn publish_and_mirror(&self, message: &Message) -> Result<(), PublishError> {
        let channel = ChannelName::for_topic(&message.topic);

        if let Err(err) = self.publisher.publish(&channel, message).await {
            warn!(
                channel = %channel,
                topic = %message.topic,
                message_id = %message.id,
                error = %err,
                "Publish to topic channel failed"
            );
            return Err(err);
        }

        let aggregate = ChannelName::aggregate();
        if let Err(err) = self.publisher.publish(&aggregate, message).await {
            warn!(
                channel = %aggregate,
                topic = %message.topic,
                message_id = %message.id,
                error = %err,
                "Mirror to aggregate channel failed"
            );
        }

        debug!(channel = %channel, message_id = %message.id, "Published");
        Ok(())
    }
}
