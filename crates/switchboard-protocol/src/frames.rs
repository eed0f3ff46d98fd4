//! Realtime frame definitions.
//!
//! Clients send [`Command`]s, each tagged with a connection-unique id, and the
//! broker answers with [`Reply`] frames carrying the same id. Deliveries for
//! subscribed channels arrive as id-less replies with a `push` body, and an
//! entirely empty reply is a keepalive ping that must be echoed back.

use serde::{Deserialize, Serialize};

/// A client-to-broker command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    /// Request id, echoed in the matching reply.
    pub id: u32,
    /// The requested method and its parameters.
    #[serde(flatten)]
    pub method: Method,
}

/// Command methods.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    /// Authenticate the connection.
    Connect(ConnectRequest),
    /// Join a channel.
    Subscribe(ChannelRequest),
    /// Leave a channel.
    Unsubscribe(ChannelRequest),
    /// Publish to a channel over the realtime connection.
    Publish(PublishParams),
}

/// Parameters of a `connect` command.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectRequest {
    /// Signed credential. Absent for anonymous connections.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Client name reported to the broker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Parameters of `subscribe` and `unsubscribe`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelRequest {
    /// Channel name.
    pub channel: String,
}

/// Parameters of a realtime `publish`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishParams {
    /// Channel name.
    pub channel: String,
    /// Payload.
    pub data: serde_json::Value,
}

impl Command {
    /// Create a `connect` command.
    #[must_use]
    pub fn connect(id: u32, token: Option<String>) -> Self {
        Self {
            id,
            method: Method::Connect(ConnectRequest {
                token,
                name: Some("switchboard".to_string()),
            }),
        }
    }

    /// Create a `subscribe` command.
    #[must_use]
    pub fn subscribe(id: u32, channel: impl Into<String>) -> Self {
        Self {
            id,
            method: Method::Subscribe(ChannelRequest {
                channel: channel.into(),
            }),
        }
    }

    /// Create an `unsubscribe` command.
    #[must_use]
    pub fn unsubscribe(id: u32, channel: impl Into<String>) -> Self {
        Self {
            id,
            method: Method::Unsubscribe(ChannelRequest {
                channel: channel.into(),
            }),
        }
    }

    /// Create a `publish` command.
    #[must_use]
    pub fn publish(id: u32, channel: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            id,
            method: Method::Publish(PublishParams {
                channel: channel.into(),
                data,
            }),
        }
    }

    /// Name of the method, for logging.
    #[must_use]
    pub fn method_name(&self) -> &'static str {
        match self.method {
            Method::Connect(_) => "connect",
            Method::Subscribe(_) => "subscribe",
            Method::Unsubscribe(_) => "unsubscribe",
            Method::Publish(_) => "publish",
        }
    }
}

/// Error body of a reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyError {
    /// Broker error code.
    pub code: u32,
    /// Human-readable message.
    pub message: String,
}

/// Result of a successful `connect`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectResult {
    /// Broker-assigned client id.
    #[serde(default)]
    pub client: String,
    /// Broker version string.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    /// Server ping interval in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ping: Option<u32>,
}

/// Empty result body for `subscribe`, `unsubscribe`, and `publish`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmptyResult {}

/// An asynchronous push for a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Push {
    /// Channel the push belongs to.
    pub channel: String,
    /// Publication body. Other push kinds (join, leave) carry no publication.
    #[serde(rename = "pub", default, skip_serializing_if = "Option::is_none")]
    pub publication: Option<Publication>,
}

/// A publication inside a push.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Publication {
    /// Payload as published.
    pub data: serde_json::Value,
}

/// A broker-to-client frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    /// Id of the command this replies to, 0 for pushes and pings.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub id: u32,
    /// Error, if the command failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ReplyError>,
    /// Result of `connect`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect: Option<ConnectResult>,
    /// Result of `subscribe`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscribe: Option<EmptyResult>,
    /// Result of `unsubscribe`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unsubscribe: Option<EmptyResult>,
    /// Result of `publish`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish: Option<EmptyResult>,
    /// Asynchronous push.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push: Option<Push>,
}

fn is_zero(id: &u32) -> bool {
    *id == 0
}

/// Classification of a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    /// Keepalive ping, answer with an empty frame.
    Ping,
    /// Channel push.
    Push,
    /// Error for a pending command.
    Error,
    /// Success for a pending command.
    Result,
}

impl Reply {
    /// Classify the reply.
    #[must_use]
    pub fn kind(&self) -> ReplyKind {
        if self.error.is_some() {
            ReplyKind::Error
        } else if self.push.is_some() {
            ReplyKind::Push
        } else if self.id == 0 {
            ReplyKind::Ping
        } else {
            ReplyKind::Result
        }
    }

    /// An empty frame, used both as ping and pong.
    #[must_use]
    pub fn ping() -> Self {
        Self::default()
    }

    /// Successful `connect` reply.
    #[must_use]
    pub fn connected(id: u32, client: impl Into<String>) -> Self {
        Self {
            id,
            connect: Some(ConnectResult {
                client: client.into(),
                ..ConnectResult::default()
            }),
            ..Self::default()
        }
    }

    /// Successful `subscribe` reply.
    #[must_use]
    pub fn subscribed(id: u32) -> Self {
        Self {
            id,
            subscribe: Some(EmptyResult {}),
            ..Self::default()
        }
    }

    /// Successful `unsubscribe` reply.
    #[must_use]
    pub fn unsubscribed(id: u32) -> Self {
        Self {
            id,
            unsubscribe: Some(EmptyResult {}),
            ..Self::default()
        }
    }

    /// Successful `publish` reply.
    #[must_use]
    pub fn published(id: u32) -> Self {
        Self {
            id,
            publish: Some(EmptyResult {}),
            ..Self::default()
        }
    }

    /// Error reply.
    #[must_use]
    pub fn error(id: u32, code: u32, message: impl Into<String>) -> Self {
        Self {
            id,
            error: Some(ReplyError {
                code,
                message: message.into(),
            }),
            ..Self::default()
        }
    }

    /// Publication push for a channel.
    #[must_use]
    pub fn push(channel: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            push: Some(Push {
                channel: channel.into(),
                publication: Some(Publication { data }),
            }),
            ..Self::default()
        }
    }
}
