//! # switchboard-client
//!
//! Client side of the switchboard relay.
//!
//! - **RelayClient** - HTTP calls to the relay (tokens, sends, topics)
//! - **Multiplexer** - One connection, one handle per channel, one active topic
//! - **Session** - Reconnects under a fresh credential when the identity changes
//!
//! ```rust,ignore
//! use switchboard_client::{RelayClient, Session, SessionConfig};
//! use switchboard_transport::WebSocketConnector;
//!
//! let relay = RelayClient::new("http://localhost:8080")?;
//! let connector = WebSocketConnector::new("ws://localhost:8000/connection/websocket");
//! let mut session = Session::new(connector, relay, SessionConfig::default());
//!
//! session.start("alice").await?;
//! session.switch_topic("general").await?;
//! ```

pub mod api;
pub mod multiplexer;
pub mod session;

pub use api::{ApiError, CredentialSource, RelayClient};
pub use multiplexer::{LogEvent, Multiplexer, SubscriptionHandle};
pub use session::{Session, SessionConfig, SessionError};
