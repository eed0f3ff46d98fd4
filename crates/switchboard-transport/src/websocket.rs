//! WebSocket transport implementation.
//!
//! This module provides a WebSocket client connection to the broker using
//! tokio-tungstenite. One reader task routes replies to pending requests by
//! id and pushes to per-channel delivery queues; one writer task owns the
//! sink so any caller can enqueue frames without locking.

use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use switchboard_protocol::{codec, Command, Reply, ReplyKind};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{Error as WsError, Message},
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, error, trace, warn};

use crate::traits::{
    Connection, ConnectionId, ConnectionState, Connector, Deliveries, Publication, TransportError,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket transport configuration.
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// Broker realtime endpoint, e.g. `ws://localhost:8000/connection/websocket`.
    pub url: String,
    /// Timeout for the handshake and for each request/reply exchange.
    pub request_timeout: Duration,
    /// Maximum inbound message size in bytes.
    pub max_message_size: usize,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8000/connection/websocket".to_string(),
            request_timeout: Duration::from_secs(10),
            max_message_size: 64 * 1024, // 64 KB
        }
    }
}

/// Opens WebSocket connections to the broker.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    config: WebSocketConfig,
}

impl WebSocketConnector {
    /// Create a connector for `url` with default settings.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_config(WebSocketConfig {
            url: url.into(),
            ..Default::default()
        })
    }

    /// Create a connector with custom settings.
    #[must_use]
    pub fn with_config(config: WebSocketConfig) -> Self {
        Self { config }
    }

    /// The connector's settings.
    #[must_use]
    pub fn config(&self) -> &WebSocketConfig {
        &self.config
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, token: Option<String>) -> Result<Arc<dyn Connection>, TransportError> {
        let (ws_stream, _) = tokio::time::timeout(
            self.config.request_timeout,
            connect_async(self.config.url.as_str()),
        )
        .await
        .map_err(|_| TransportError::Timeout)?
        .map_err(|e| {
            error!(url = %self.config.url, "WebSocket handshake failed: {}", e);
            TransportError::Other(format!("WebSocket handshake failed: {}", e))
        })?;

        debug!(url = %self.config.url, "WebSocket handshake completed");

        let conn = WebSocketConnection::start(ws_stream, &self.config);
        let authenticated = token.is_some();

        match conn.request(|id| Command::connect(id, token)).await {
            Ok(reply) => {
                conn.shared.set_state(ConnectionState::Connected);
                let client = reply.connect.map(|c| c.client).unwrap_or_default();
                debug!(
                    connection = %conn.id,
                    client = %client,
                    authenticated,
                    "Connected to broker"
                );
                Ok(Arc::new(conn))
            }
            Err(e) => {
                warn!(connection = %conn.id, error = %e, authenticated, "Broker refused connect");
                conn.disconnect().await;
                Err(e)
            }
        }
    }

    fn name(&self) -> &'static str {
        "websocket"
    }
}

/// State shared between a connection handle and its reader task.
struct Shared {
    state: AtomicU8,
    next_id: AtomicU32,
    pending: DashMap<u32, oneshot::Sender<Reply>>,
    subscriptions: DashMap<String, mpsc::UnboundedSender<Publication>>,
}

impl Shared {
    fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.store(state.as_u8(), Ordering::SeqCst);
    }

    /// Mark the connection closed and release every waiter and delivery queue.
    fn close(&self) {
        self.set_state(ConnectionState::Disconnected);
        self.pending.clear();
        self.subscriptions.clear();
    }
}

/// A WebSocket connection to the broker.
pub struct WebSocketConnection {
    id: ConnectionId,
    shared: Arc<Shared>,
    outbound: mpsc::UnboundedSender<Message>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
    request_timeout: Duration,
}

impl WebSocketConnection {
    fn start(stream: WsStream, config: &WebSocketConfig) -> Self {
        let shared = Arc::new(Shared {
            state: AtomicU8::new(ConnectionState::Connecting.as_u8()),
            next_id: AtomicU32::new(1),
            pending: DashMap::new(),
            subscriptions: DashMap::new(),
        });
        let id = ConnectionId::generate();

        let (sink, stream) = stream.split();
        let (outbound, outbound_rx) = mpsc::unbounded_channel();

        let writer = tokio::spawn(write_loop(sink, outbound_rx, id.clone()));
        let reader = tokio::spawn(read_loop(
            stream,
            Arc::clone(&shared),
            outbound.clone(),
            id.clone(),
            config.max_message_size,
        ));

        Self {
            id,
            shared,
            outbound,
            reader,
            writer,
            request_timeout: config.request_timeout,
        }
    }

    /// Send a command and wait for its reply.
    async fn request(&self, build: impl FnOnce(u32) -> Command) -> Result<Reply, TransportError> {
        if self.shared.state() == ConnectionState::Disconnected {
            return Err(TransportError::ConnectionClosed);
        }

        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let command = build(id);
        let data = codec::encode(&command)?;

        let (tx, rx) = oneshot::channel();
        self.shared.pending.insert(id, tx);

        trace!(connection = %self.id, id, method = command.method_name(), "Sending command");
        if self.outbound.send(Message::Text(data)).is_err() {
            self.shared.pending.remove(&id);
            return Err(TransportError::SendFailed("writer task stopped".into()));
        }

        let reply = match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => return Err(TransportError::ConnectionClosed),
            Err(_) => {
                self.shared.pending.remove(&id);
                return Err(TransportError::Timeout);
            }
        };

        match reply.error {
            Some(err) => Err(TransportError::Rejected {
                code: err.code,
                message: err.message,
            }),
            None => Ok(reply),
        }
    }
}

#[async_trait]
impl Connection for WebSocketConnection {
    fn id(&self) -> &ConnectionId {
        &self.id
    }

    fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    async fn subscribe(&self, channel: &str) -> Result<Deliveries, TransportError> {
        if self.shared.subscriptions.contains_key(channel) {
            return Err(TransportError::AlreadySubscribed(channel.to_string()));
        }

        // Register before the request so pushes racing the reply are kept.
        let (tx, deliveries) = mpsc::unbounded_channel();
        self.shared.subscriptions.insert(channel.to_string(), tx);

        let channel_name = channel.to_string();
        if let Err(e) = self
            .request(|id| Command::subscribe(id, channel_name))
            .await
        {
            self.shared.subscriptions.remove(channel);
            return Err(e);
        }

        debug!(connection = %self.id, channel = %channel, "Subscribed");
        Ok(deliveries)
    }

    async fn unsubscribe(&self, channel: &str) -> Result<(), TransportError> {
        if self.shared.subscriptions.remove(channel).is_none() {
            return Err(TransportError::NotSubscribed(channel.to_string()));
        }

        let channel_name = channel.to_string();
        self.request(|id| Command::unsubscribe(id, channel_name))
            .await?;

        debug!(connection = %self.id, channel = %channel, "Unsubscribed");
        Ok(())
    }

    async fn publish(&self, channel: &str, data: serde_json::Value) -> Result<(), TransportError> {
        let channel_name = channel.to_string();
        self.request(|id| Command::publish(id, channel_name, data))
            .await?;
        Ok(())
    }

    async fn disconnect(&self) {
        let previous = self
            .shared
            .state
            .swap(ConnectionState::Disconnected.as_u8(), Ordering::SeqCst);
        if ConnectionState::from_u8(previous) == ConnectionState::Disconnected {
            return; // Already closed
        }

        // The writer exits after flushing the close frame.
        let _ = self.outbound.send(Message::Close(None));
        self.shared.close();
        self.reader.abort();
        debug!(connection = %self.id, "Disconnected");
    }
}

impl Drop for WebSocketConnection {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
    }
}

async fn write_loop(
    mut sink: SplitSink<WsStream, Message>,
    mut outbound: mpsc::UnboundedReceiver<Message>,
    id: ConnectionId,
) {
    while let Some(message) = outbound.recv().await {
        let closing = matches!(message, Message::Close(_));
        if let Err(e) = sink.send(message).await {
            warn!(connection = %id, "Failed to send frame: {}", e);
            break;
        }
        if closing {
            break;
        }
    }
    let _ = sink.close().await;
}

async fn read_loop(
    mut stream: SplitStream<WsStream>,
    shared: Arc<Shared>,
    outbound: mpsc::UnboundedSender<Message>,
    id: ConnectionId,
    max_message_size: usize,
) {
    loop {
        let text = match stream.next().await {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Binary(data))) => match String::from_utf8(data) {
                Ok(text) => text,
                Err(_) => {
                    warn!(connection = %id, "Ignoring non-UTF-8 binary frame");
                    continue;
                }
            },
            Some(Ok(Message::Ping(data))) => {
                let _ = outbound.send(Message::Pong(data));
                continue;
            }
            Some(Ok(Message::Pong(_))) | Some(Ok(Message::Frame(_))) => continue,
            Some(Ok(Message::Close(_))) => {
                debug!(connection = %id, "Received close frame");
                break;
            }
            Some(Err(WsError::ConnectionClosed)) | None => {
                debug!(connection = %id, "WebSocket stream ended");
                break;
            }
            Some(Err(e)) => {
                error!(connection = %id, "WebSocket error: {}", e);
                break;
            }
        };

        if text.len() > max_message_size {
            warn!(
                connection = %id,
                "Message too large: {} bytes (max: {})",
                text.len(),
                max_message_size
            );
            continue;
        }

        let replies = match codec::decode(&text) {
            Ok(replies) => replies,
            Err(e) => {
                warn!(connection = %id, error = %e, "Failed to decode broker frame");
                continue;
            }
        };

        for reply in replies {
            dispatch(reply, &shared, &outbound, &id);
        }
    }

    shared.close();
}

fn dispatch(
    reply: Reply,
    shared: &Shared,
    outbound: &mpsc::UnboundedSender<Message>,
    id: &ConnectionId,
) {
    match reply.kind() {
        ReplyKind::Ping => {
            if let Ok(pong) = codec::encode_reply(&Reply::ping()) {
                let _ = outbound.send(Message::Text(pong));
            }
        }
        ReplyKind::Push => {
            let Some(push) = reply.push else { return };
            let Some(publication) = push.publication else {
                trace!(connection = %id, channel = %push.channel, "Non-publication push");
                return;
            };
            match shared.subscriptions.get(&push.channel) {
                Some(tx) => {
                    let _ = tx.send(Publication {
                        channel: push.channel.clone(),
                        data: publication.data,
                    });
                }
                None => {
                    trace!(channel = %push.channel, "Push for unsubscribed channel");
                }
            }
        }
        ReplyKind::Error | ReplyKind::Result => match shared.pending.remove(&reply.id) {
            Some((_, waiter)) => {
                let _ = waiter.send(reply);
            }
            None => {
                debug!(connection = %id, reply_id = reply.id, "Reply without pending request");
            }
        },
    }
}
