//! Connection abstraction traits for switchboard clients.
//!
//! A client holds exactly one realtime connection to the broker and
//! multiplexes every channel subscription over it. These traits let the
//! client logic stay independent of the concrete transport.

use async_trait::async_trait;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::sync::mpsc;

/// Counter mixed into generated ids so two connections opened in the same
/// nanosecond still differ.
static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Unique identifier for a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub String);

impl ConnectionId {
    /// Create a new connection ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a unique connection ID.
    #[must_use]
    pub fn generate() -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let counter = ID_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(format!("conn_{:x}_{:x}", timestamp, counter))
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ConnectionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Lifecycle of a realtime connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No live connection.
    Disconnected,
    /// Handshake in progress.
    Connecting,
    /// Connected and able to subscribe.
    Connected,
}

impl ConnectionState {
    pub(crate) fn as_u8(self) -> u8 {
        match self {
            ConnectionState::Disconnected => 0,
            ConnectionState::Connecting => 1,
            ConnectionState::Connected => 2,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            _ => ConnectionState::Disconnected,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        };
        f.write_str(name)
    }
}

/// A payload delivered on a subscribed channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Publication {
    /// Channel the payload was published to.
    pub channel: String,
    /// The published payload.
    pub data: serde_json::Value,
}

/// Receiving side of one channel subscription.
///
/// Deliveries arrive in broker order. The receiver closes when the channel
/// is unsubscribed or the connection ends.
pub type Deliveries = mpsc::UnboundedReceiver<Publication>;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection was closed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// A request timed out.
    #[error("Request timed out")]
    Timeout,

    /// The broker refused the request.
    #[error("Broker rejected request ({code}): {message}")]
    Rejected {
        /// Broker error code.
        code: u32,
        /// Broker error message.
        message: String,
    },

    /// The channel is already subscribed on this connection.
    #[error("Already subscribed to channel: {0}")]
    AlreadySubscribed(String),

    /// The channel is not subscribed on this connection.
    #[error("Not subscribed to channel: {0}")]
    NotSubscribed(String),

    /// Failed to send data.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Failed to receive data.
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    /// Protocol error.
    #[error("Protocol error: {0}")]
    Protocol(#[from] switchboard_protocol::ProtocolError),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

/// Opens realtime connections to the broker.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a connection, authenticating with `token` when present.
    ///
    /// Returns once the broker has accepted the connection.
    async fn connect(&self, token: Option<String>) -> Result<Arc<dyn Connection>, TransportError>;

    /// Get the transport name (e.g., "websocket", "loopback").
    fn name(&self) -> &'static str;
}

/// An open realtime connection multiplexing many channels.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Get the connection's unique identifier.
    fn id(&self) -> &ConnectionId;

    /// Current lifecycle state.
    fn state(&self) -> ConnectionState;

    /// Join a channel. Returns the stream of its deliveries.
    async fn subscribe(&self, channel: &str) -> Result<Deliveries, TransportError>;

    /// Leave a channel. Its delivery stream closes.
    async fn unsubscribe(&self, channel: &str) -> Result<(), TransportError>;

    /// Publish a payload to a channel over this connection.
    async fn publish(&self, channel: &str, data: serde_json::Value) -> Result<(), TransportError>;

    /// Close the connection. Calling this on a closed connection is a no-op.
    async fn disconnect(&self);

    /// Check if the connection is still open.
    fn is_open(&self) -> bool {
        self.state() == ConnectionState::Connected
    }
}
