//! Channel publishing seam.
//!
//! The router hands each fan-out branch to a [`Publisher`]. Implementations
//! deliver one message to one channel and report failure per channel; they
//! never retry.

use crate::message::Message;
use crate::topic::ChannelName;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// A failed publish to one channel.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PublishError {
    /// The broker answered with a non-success status.
    #[error("Publish to {channel} rejected with status {status}: {body}")]
    Rejected {
        /// Target channel.
        channel: ChannelName,
        /// HTTP status code.
        status: u16,
        /// Response body, for diagnosis.
        body: String,
    },

    /// The request exceeded its timeout.
    #[error("Publish to {channel} timed out")]
    Timeout {
        /// Target channel.
        channel: ChannelName,
    },

    /// The request could not be sent or its response could not be read.
    #[error("Publish to {channel} failed: {reason}")]
    Transport {
        /// Target channel.
        channel: ChannelName,
        /// Underlying cause.
        reason: String,
    },

    /// The payload could not be serialized.
    #[error("Failed to encode publish to {channel}: {reason}")]
    Encode {
        /// Target channel.
        channel: ChannelName,
        /// Underlying cause.
        reason: String,
    },
}

impl PublishError {
    /// The channel the failed publish targeted.
    #[must_use]
    pub fn channel(&self) -> &ChannelName {
        match self {
            PublishError::Rejected { channel, .. }
            | PublishError::Timeout { channel }
            | PublishError::Transport { channel, .. }
            | PublishError::Encode { channel, .. } => channel,
        }
    }
}

/// Delivers messages to broker channels.
///
/// Each call is independent: implementations must tolerate many calls in
/// quick succession and concurrent calls for different channels.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish `message` to `channel`.
    async fn publish(&self, channel: &ChannelName, message: &Message) -> Result<(), PublishError>;
}

#[async_trait]
impl<P: Publisher + ?Sized> Publisher for Arc<P> {
    async fn publish(&self, channel: &ChannelName, message: &Message) -> Result<(), PublishError> {
        (**self).publish(channel, message).await
    }
}

#[async_trait]
impl<P: Publisher + ?Sized> Publisher for Box<P> {
    async fn publish(&self, channel: &ChannelName, message: &Message) -> Result<(), PublishError> {
        (**self).publish(channel, message).await
    }
}
