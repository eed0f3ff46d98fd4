//! In-process loopback broker.
//!
//! Implements [`Connector`] and [`Connection`] entirely in memory: each
//! channel is a broadcast sender, and every subscription forwards its
//! broadcast receiver into the per-channel delivery queue handed to the
//! client. Useful for local demos and for exercising client logic without a
//! network.

use crate::traits::{
    Connection, ConnectionId, ConnectionState, Connector, Deliveries, Publication, TransportError,
};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Default broadcast channel capacity.
const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Broker error code for a refused credential.
pub const CODE_INVALID_TOKEN: u32 = 109;

struct BrokerInner {
    channels: DashMap<String, broadcast::Sender<serde_json::Value>>,
    connect_attempts: Mutex<Vec<Option<String>>>,
    reject_authenticated: AtomicBool,
    unavailable: AtomicBool,
    capacity: usize,
}

impl BrokerInner {
    fn sender(&self, channel: &str) -> broadcast::Sender<serde_json::Value> {
        self.channels
            .entry(channel.to_string())
            .or_insert_with(|| {
                debug!(channel = %channel, "Creating loopback channel");
                broadcast::channel(self.capacity).0
            })
            .clone()
    }

    fn publish(&self, channel: &str, data: serde_json::Value) -> usize {
        match self.channels.get(channel) {
            Some(sender) => {
                let count = sender.send(data).unwrap_or_default();
                trace!(channel = %channel, recipients = count, "Loopback publish");
                count
            }
            None => 0,
        }
    }
}

/// An in-memory broker shared by any number of loopback connections.
#[derive(Clone)]
pub struct LoopbackBroker {
    inner: Arc<BrokerInner>,
}

impl LoopbackBroker {
    /// Create a new broker.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a broker whose channels buffer `capacity` payloads.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                channels: DashMap::new(),
                connect_attempts: Mutex::new(Vec::new()),
                reject_authenticated: AtomicBool::new(false),
                unavailable: AtomicBool::new(false),
                capacity,
            }),
        }
    }

    /// Publish from the broker side.
    ///
    /// Returns the number of subscriptions that received the payload.
    pub fn publish(&self, channel: &str, data: serde_json::Value) -> usize {
        self.inner.publish(channel, data)
    }

    /// Refuse every connect that presents a token.
    pub fn set_reject_authenticated(&self, reject: bool) {
        self.inner
            .reject_authenticated
            .store(reject, Ordering::SeqCst);
    }

    /// Refuse every connect.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Tokens presented by every connect attempt so far, in order.
    #[must_use]
    pub fn connect_attempts(&self) -> Vec<Option<String>> {
        self.inner
            .connect_attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of live subscriptions on a channel.
    #[must_use]
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.inner
            .channels
            .get(channel)
            .map(|s| s.receiver_count())
            .unwrap_or(0)
    }
}

impl Default for LoopbackBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for LoopbackBroker {
    async fn connect(&self, token: Option<String>) -> Result<Arc<dyn Connection>, TransportError> {
        self.inner
            .connect_attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(token.clone());

        if self.inner.unavailable.load(Ordering::SeqCst) {
            return Err(TransportError::Other("Loopback broker unavailable".into()));
        }
        if token.is_some() && self.inner.reject_authenticated.load(Ordering::SeqCst) {
            return Err(TransportError::Rejected {
                code: CODE_INVALID_TOKEN,
                message: "invalid token".into(),
            });
        }

        let connection = LoopbackConnection::new(Arc::clone(&self.inner));
        debug!(connection = %connection.id, authenticated = token.is_some(), "Loopback connected");
        Ok(Arc::new(connection))
    }

    fn name(&self) -> &'static str {
        "loopback"
    }
}

/// A connection to a [`LoopbackBroker`].
pub struct LoopbackConnection {
    id: ConnectionId,
    state: AtomicU8,
    broker: Arc<BrokerInner>,
    forwards: DashMap<String, JoinHandle<()>>,
}

impl LoopbackConnection {
    fn new(broker: Arc<BrokerInner>) -> Self {
        Self {
            id: ConnectionId::generate(),
            state: AtomicU8::new(ConnectionState::Connected.as_u8()),
            broker,
            forwards: DashMap::new(),
        }
    }

    fn ensure_connected(&self) -> Result<(), TransportError> {
        if self.state() == ConnectionState::Connected {
            Ok(())
        } else {
            Err(TransportError::ConnectionClosed)
        }
    }

    fn abort_all(&self) {
        for entry in self.forwards.iter() {
            entry.value().abort();
        }
        self.forwards.clear();
    }
}

#[async_trait]
impl Connection for LoopbackConnection {
    fn id(&self) -> &ConnectionId {
        &self.id
    }

    fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    async fn subscribe(&self, channel: &str) -> Result<Deliveries, TransportError> {
        self.ensure_connected()?;
        if self.forwards.contains_key(channel) {
            return Err(TransportError::AlreadySubscribed(channel.to_string()));
        }

        let mut rx = self.broker.sender(channel).subscribe();
        let (tx, deliveries) = mpsc::unbounded_channel();

        let channel_name = channel.to_string();
        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(data) => {
                        let publication = Publication {
                            channel: channel_name.clone(),
                            data,
                        };
                        if tx.send(publication).is_err() {
                            break; // Receiver dropped
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                }
            }
        });
        self.forwards.insert(channel.to_string(), handle);

        debug!(connection = %self.id, channel = %channel, "Loopback subscribed");
        Ok(deliveries)
    }

    async fn unsubscribe(&self, channel: &str) -> Result<(), TransportError> {
        self.ensure_connected()?;
        match self.forwards.remove(channel) {
            Some((_, handle)) => {
                handle.abort();
                debug!(connection = %self.id, channel = %channel, "Loopback unsubscribed");
                Ok(())
            }
            None => Err(TransportError::NotSubscribed(channel.to_string())),
        }
    }

    async fn publish(&self, channel: &str, data: serde_json::Value) -> Result<(), TransportError> {
        self.ensure_connected()?;
        self.broker.publish(channel, data);
        Ok(())
    }

    async fn disconnect(&self) {
        let previous = self
            .state
            .swap(ConnectionState::Disconnected.as_u8(), Ordering::SeqCst);
        if ConnectionState::from_u8(previous) != ConnectionState::Disconnected {
            self.abort_all();
            debug!(connection = %self.id, "Loopback disconnected");
        }
    }
}

impl Drop for LoopbackConnection {
    fn drop(&mut self) {
        self.abort_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_subscribe_and_deliver() {
        let broker = LoopbackBroker::new();
        let conn = broker.connect(None).await.unwrap();

        let mut rx = conn.subscribe("topic:general").await.unwrap();
        assert_eq!(broker.subscriber_count("topic:general"), 1);

        assert_eq!(broker.publish("topic:general", json!({"n": 1})), 1);
        assert_eq!(broker.publish("topic:general", json!({"n": 2})), 1);

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.channel, "topic:general");
        assert_eq!(first.data, json!({"n": 1}));
        assert_eq!(second.data, json!({"n": 2}));
    }

    #[tokio::test]
    async fn test_double_subscribe_rejected() {
        let broker = LoopbackBroker::new();
        let conn = broker.connect(None).await.unwrap();

        let _rx = conn.subscribe("topic:tech").await.unwrap();
        assert!(matches!(
            conn.subscribe("topic:tech").await,
            Err(TransportError::AlreadySubscribed(_))
        ));
    }

    #[tokio::test]
    async fn test_unsubscribe_closes_deliveries() {
        let broker = LoopbackBroker::new();
        let conn = broker.connect(None).await.unwrap();

        let mut rx = conn.subscribe("topic:tech").await.unwrap();
        conn.unsubscribe("topic:tech").await.unwrap();

        assert!(rx.recv().await.is_none());
        assert!(matches!(
            conn.unsubscribe("topic:tech").await,
            Err(TransportError::NotSubscribed(_))
        ));
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let broker = LoopbackBroker::new();
        let conn = broker.connect(Some("jwt".into())).await.unwrap();
        let mut rx = conn.subscribe("topic:all").await.unwrap();

        conn.disconnect().await;
        conn.disconnect().await;

        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert!(rx.recv().await.is_none());
        assert!(matches!(
            conn.subscribe("topic:all").await,
            Err(TransportError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_connect_attempts_and_rejection() {
        let broker = LoopbackBroker::new();
        broker.set_reject_authenticated(true);

        assert!(matches!(
            broker.connect(Some("jwt".into())).await,
            Err(TransportError::Rejected { code: CODE_INVALID_TOKEN, .. })
        ));
        assert!(broker.connect(None).await.is_ok());

        assert_eq!(broker.connect_attempts(), vec![Some("jwt".to_string()), None]);
    }
}
