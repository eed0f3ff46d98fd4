//! Subscription multiplexer.
//!
//! Owns one realtime connection and a registry of channel subscription
//! handles. Exactly one topic is active at a time; its deliveries are
//! appended to the visible message log, everything else is dropped.
//!
//! Handles are created lazily on first use and reused on every later switch
//! to the same topic. They belong to one connection generation: attaching a
//! new connection invalidates all of them.

use parking_lot::Mutex;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use switchboard_core::{ChannelName, Message};
use switchboard_transport::{Connection, ConnectionState, Deliveries, TransportError};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Capacity of the log update stream.
const UPDATE_CAPACITY: usize = 256;

/// A change to the visible message log.
#[derive(Debug, Clone, PartialEq)]
pub enum LogEvent {
    /// A delivered message was accepted into the log.
    Appended(Message),
    /// The log was emptied by a topic switch.
    Cleared,
}

/// Membership in one channel.
#[derive(Debug)]
pub struct SubscriptionHandle {
    channel: ChannelName,
    generation: u64,
    subscribed: AtomicBool,
    forwarder: Mutex<Option<JoinHandle<()>>>,
}

impl SubscriptionHandle {
    fn new(channel: ChannelName, generation: u64) -> Self {
        Self {
            channel,
            generation,
            subscribed: AtomicBool::new(false),
            forwarder: Mutex::new(None),
        }
    }

    /// The handle's channel.
    pub fn channel(&self) -> &ChannelName {
        &self.channel
    }

    /// The topic of the handle's channel.
    pub fn topic(&self) -> &str {
        self.channel.topic()
    }

    /// Connection generation the handle belongs to.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether the handle is currently subscribed.
    pub fn is_subscribed(&self) -> bool {
        self.subscribed.load(Ordering::SeqCst)
    }

    fn mark_subscribed(&self) {
        self.subscribed.store(true, Ordering::SeqCst);
    }

    fn set_forwarder(&self, forwarder: JoinHandle<()>) {
        if let Some(previous) = self.forwarder.lock().replace(forwarder) {
            previous.abort();
        }
    }

    fn stop(&self) {
        self.subscribed.store(false, Ordering::SeqCst);
        if let Some(forwarder) = self.forwarder.lock().take() {
            forwarder.abort();
        }
    }
}

/// State visible to the UI and to delivery forwarders.
#[derive(Debug, Default)]
struct View {
    active: Option<String>,
    log: Vec<Message>,
    generation: u64,
}

/// Multiplexes topic subscriptions over a single connection.
pub struct Multiplexer {
    connection: Option<Arc<dyn Connection>>,
    handles: HashMap<String, Arc<SubscriptionHandle>>,
    handles_created: usize,
    view: Arc<Mutex<View>>,
    updates: broadcast::Sender<LogEvent>,
}

impl Multiplexer {
    /// Create a multiplexer with no connection and no active topic.
    pub fn new() -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CAPACITY);
        Self {
            connection: None,
            handles: HashMap::new(),
            handles_created: 0,
            view: Arc::new(Mutex::new(View::default())),
            updates,
        }
    }

    /// Adopt a new connection, starting a new handle generation.
    ///
    /// Handles from the previous connection are invalidated. The active
    /// topic is kept but not resubscribed; call [`switch_topic`] for that.
    ///
    /// [`switch_topic`]: Multiplexer::switch_topic
    pub fn attach(&mut self, connection: Arc<dyn Connection>) {
        self.invalidate_handles();
        let generation = {
            let mut view = self.view.lock();
            view.generation += 1;
            view.generation
        };
        debug!(connection = %connection.id(), generation, "Attached connection");
        self.connection = Some(connection);
    }

    /// Drop the current connection and every handle built on it.
    ///
    /// Returns the connection so the caller can close it.
    pub fn detach(&mut self) -> Option<Arc<dyn Connection>> {
        self.invalidate_handles();
        let connection = self.connection.take();
        if let Some(conn) = &connection {
            debug!(connection = %conn.id(), "Detached connection");
        }
        connection
    }

    /// The current connection, if any.
    pub fn connection(&self) -> Option<&Arc<dyn Connection>> {
        self.connection.as_ref()
    }

    /// State of the current connection.
    pub fn state(&self) -> ConnectionState {
        self.connection
            .as_ref()
            .map_or(ConnectionState::Disconnected, |c| c.state())
    }

    /// The active topic.
    pub fn active_topic(&self) -> Option<String> {
        self.view.lock().active.clone()
    }

    /// Snapshot of the visible message log, in delivery order.
    pub fn messages(&self) -> Vec<Message> {
        self.view.lock().log.clone()
    }

    /// The handle for `topic` in the current generation, if one was created.
    pub fn handle(&self, topic: &str) -> Option<Arc<SubscriptionHandle>> {
        self.handles
            .get(ChannelName::for_topic(topic).as_str())
            .cloned()
    }

    /// Total number of handles created over the multiplexer's life.
    pub fn handles_created(&self) -> usize {
        self.handles_created
    }

    /// Current connection generation.
    pub fn generation(&self) -> u64 {
        self.view.lock().generation
    }

    /// Stream of log changes.
    pub fn subscribe_updates(&self) -> broadcast::Receiver<LogEvent> {
        self.updates.subscribe()
    }

    /// Make `topic` the active topic.
    ///
    /// Unsubscribes the previously active topic, clears the log, then, when
    /// connected, subscribes the handle for `topic`.
    ///
    /// # Errors
    ///
    /// Returns the transport error if subscribing to the new channel fails.
    /// The topic is active either way.
    pub async fn switch_topic(&mut self, topic: &str) -> Result<(), TransportError> {
        let previous = self.active_topic();
        if let Some(handle) = previous.as_deref().and_then(|t| self.handle(t)) {
            if handle.is_subscribed() {
                self.unsubscribe_handle(&handle).await;
            }
        }

        {
            let mut view = self.view.lock();
            view.log.clear();
            view.active = Some(topic.to_string());
        }
        let _ = self.updates.send(LogEvent::Cleared);
        debug!(from = ?previous, to = %topic, "Switched topic");

        let Some(connection) = self.connection.clone() else {
            return Ok(());
        };
        if connection.state() != ConnectionState::Connected {
            trace!(topic = %topic, "Not connected, deferring subscribe");
            return Ok(());
        }

        let handle = self.handle_for(ChannelName::for_topic(topic));
        if handle.is_subscribed() {
            return Ok(());
        }

        let deliveries = connection.subscribe(handle.channel().as_str()).await?;
        // Deliveries may already be queued; the forwarder must see the
        // handle as subscribed from its first poll.
        handle.mark_subscribed();
        let forwarder = spawn_forwarder(
            Arc::clone(&self.view),
            self.updates.clone(),
            Arc::clone(&handle),
            deliveries,
        );
        handle.set_forwarder(forwarder);
        Ok(())
    }

    /// Offer a delivered message to the log through `handle`.
    ///
    /// The message is accepted only if the handle belongs to the current
    /// generation, is subscribed, and its topic is the active topic. Returns
    /// whether the message was appended.
    pub fn deliver(&self, handle: &SubscriptionHandle, message: Message) -> bool {
        apply(&self.view, &self.updates, handle, message)
    }

    fn handle_for(&mut self, channel: ChannelName) -> Arc<SubscriptionHandle> {
        match self.handles.entry(channel.as_str().to_string()) {
            Entry::Occupied(entry) => Arc::clone(entry.get()),
            Entry::Vacant(entry) => {
                let generation = self.view.lock().generation;
                debug!(channel = %channel, generation, "Creating subscription handle");
                self.handles_created += 1;
                Arc::clone(entry.insert(Arc::new(SubscriptionHandle::new(channel, generation))))
            }
        }
    }

    async fn unsubscribe_handle(&self, handle: &SubscriptionHandle) {
        handle.stop();
        if let Some(connection) = &self.connection {
            if let Err(e) = connection.unsubscribe(handle.channel().as_str()).await {
                warn!(channel = %handle.channel(), error = %e, "Unsubscribe failed");
            }
        }
    }

    fn invalidate_handles(&mut self) {
        for handle in self.handles.values() {
            handle.stop();
        }
        self.handles.clear();
    }
}

impl Default for Multiplexer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Multiplexer {
    fn drop(&mut self) {
        self.invalidate_handles();
    }
}

fn apply(
    view: &Mutex<View>,
    updates: &broadcast::Sender<LogEvent>,
    handle: &SubscriptionHandle,
    message: Message,
) -> bool {
    let mut view = view.lock();

    if view.generation != handle.generation() || !handle.is_subscribed() {
        trace!(channel = %handle.channel(), "Dropping delivery from stale handle");
        return false;
    }
    if view.active.as_deref() != Some(handle.topic()) {
        trace!(channel = %handle.channel(), "Dropping delivery for inactive topic");
        return false;
    }
    if !handle.channel().is_aggregate() && message.topic != handle.topic() {
        trace!(channel = %handle.channel(), topic = %message.topic, "Dropping mismatched delivery");
        return false;
    }

    view.log.push(message.clone());
    let _ = updates.send(LogEvent::Appended(message));
    true
}

fn spawn_forwarder(
    view: Arc<Mutex<View>>,
    updates: broadcast::Sender<LogEvent>,
    handle: Arc<SubscriptionHandle>,
    mut deliveries: Deliveries,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(publication) = deliveries.recv().await {
            match serde_json::from_value::<Message>(publication.data) {
                Ok(message) => {
                    apply(&view, &updates, &handle, message);
                }
                Err(e) => {
                    warn!(channel = %publication.channel, error = %e, "Undecodable delivery");
                }
            }
        }
        trace!(channel = %handle.channel(), "Delivery stream closed");
    })
}
