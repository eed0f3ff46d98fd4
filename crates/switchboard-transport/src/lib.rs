//! # switchboard-transport
//!
//! Client-side connection layer for the switchboard relay.
//!
//! This crate provides a unified interface for reaching the broker:
//!
//! - **WebSocket** - A real broker over the JSON realtime protocol
//! - **Loopback** - An in-process broker for demos and tests
//!
//! ## Connection Abstraction
//!
//! All transports implement the `Connector` and `Connection` traits. One
//! connection carries every channel subscription of a client.
//!
//! ```rust,ignore
//! use switchboard_transport::{Connector, WebSocketConnector};
//!
//! async fn follow(connector: WebSocketConnector, token: String) {
//!     let conn = connector.connect(Some(token)).await?;
//!     let mut deliveries = conn.subscribe("topic:general").await?;
//!     while let Some(publication) = deliveries.recv().await {
//!         // Process publication
//!     }
//! }
//! ```

pub mod loopback;
pub mod traits;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use loopback::{LoopbackBroker, LoopbackConnection};
pub use traits::{
    Connection, ConnectionId, ConnectionState, Connector, Deliveries, Publication, TransportError,
};

#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConfig, WebSocketConnector};
