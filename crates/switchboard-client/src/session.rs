//! Session reconnect controller.
//!
//! Ties the multiplexer's connection to the caller's identity. When the
//! identity changes after the initial mount, the session tears down the
//! connection, waits for the broker to observe the disconnect, fetches a
//! credential for the new identity, reconnects and restores the active
//! topic.

use std::sync::Arc;
use std::time::Duration;
use switchboard_transport::{Connection, Connector, TransportError};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::api::CredentialSource;
use crate::multiplexer::Multiplexer;

/// Session settings.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Pause between disconnecting and reconnecting on an identity change.
    pub settle_delay: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(500),
        }
    }
}

/// Session errors.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Neither an authenticated nor an anonymous connection could be opened,
    /// or the active topic could not be resubscribed.
    #[error("Connection failed: {0}")]
    Transport(#[from] TransportError),
}

/// A client session bound to one identity at a time.
pub struct Session<C, S> {
    connector: C,
    credentials: S,
    config: SessionConfig,
    multiplexer: Multiplexer,
    applied_identity: Option<String>,
}

impl<C: Connector, S: CredentialSource> Session<C, S> {
    /// Create an idle session.
    pub fn new(connector: C, credentials: S, config: SessionConfig) -> Self {
        Self {
            connector,
            credentials,
            config,
            multiplexer: Multiplexer::new(),
            applied_identity: None,
        }
    }

    /// The session's multiplexer.
    pub fn multiplexer(&self) -> &Multiplexer {
        &self.multiplexer
    }

    /// The identity the current connection was opened under.
    pub fn identity(&self) -> Option<&str> {
        self.applied_identity.as_deref()
    }

    /// Initial mount: connect under `user` without a reconnect cycle.
    pub async fn start(&mut self, user: &str) -> Result<(), SessionError> {
        info!(user = %user, transport = self.connector.name(), "Starting session");
        self.open(user).await
    }

    /// React to an identity change.
    ///
    /// Runs one disconnect, settle, credential, reconnect, resubscribe cycle
    /// when `user` differs from a previously applied identity. An identity
    /// arriving before any was applied is only recorded. Returns whether a
    /// cycle ran.
    ///
    /// The new identity is applied only once a connection is open under it,
    /// so a failed cycle can be retried with the same identity.
    pub async fn on_identity_change(&mut self, user: &str) -> Result<bool, SessionError> {
        match self.applied_identity.as_deref() {
            None => {
                debug!(user = %user, "Recording initial identity");
                self.applied_identity = Some(user.to_string());
                return Ok(false);
            }
            Some(current) if current == user => return Ok(false),
            Some(_) => {}
        }

        info!(user = %user, "Identity changed, reconnecting");

        if let Some(connection) = self.multiplexer.detach() {
            connection.disconnect().await;
        }
        tokio::time::sleep(self.config.settle_delay).await;

        self.open(user).await?;
        Ok(true)
    }

    /// Make `topic` the active topic.
    pub async fn switch_topic(&mut self, topic: &str) -> Result<(), SessionError> {
        self.multiplexer.switch_topic(topic).await?;
        Ok(())
    }

    /// Close the connection.
    pub async fn shutdown(&mut self) {
        if let Some(connection) = self.multiplexer.detach() {
            connection.disconnect().await;
            info!("Session closed");
        }
    }

    async fn open(&mut self, user: &str) -> Result<(), SessionError> {
        let connection = self.connect(user).await?;
        self.multiplexer.attach(connection);
        self.applied_identity = Some(user.to_string());

        if let Some(topic) = self.multiplexer.active_topic() {
            self.multiplexer.switch_topic(&topic).await?;
        }
        Ok(())
    }

    /// Connect with a fresh credential, falling back to an anonymous
    /// connection.
    async fn connect(&self, user: &str) -> Result<Arc<dyn Connection>, TransportError> {
        match self.credentials.fetch_credential(user).await {
            Ok(token) => match self.connector.connect(Some(token)).await {
                Ok(connection) => return Ok(connection),
                Err(e) => {
                    warn!(user = %user, error = %e, "Authenticated connect failed");
                }
            },
            Err(e) => {
                warn!(user = %user, error = %e, "Credential fetch failed");
            }
        }

        debug!(user = %user, "Connecting anonymously");
        self.connector.connect(None).await
    }
}
