//! # switchboard-core
//!
//! Core types and message routing for the switchboard relay.
//!
//! This crate provides the fundamental building blocks:
//!
//! - **Topic** - Topic names, their broker channels, and the topic catalog
//! - **Message** - The immutable chat message model
//! - **Credential** - Signed, time-boxed connection credentials
//! - **Publisher** - The seam through which messages reach broker channels
//! - **Router** - Per-send channel selection and fan-out
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   Caller    │────▶│   Router    │────▶│  Publisher  │────▶ broker
//! └─────────────┘     └─────────────┘     └─────────────┘
//!                            │
//!                            ▼
//!                     ┌─────────────┐
//!                     │   Catalog   │
//!                     └─────────────┘
//! ```

pub mod credential;
pub mod message;
pub mod publisher;
pub mod router;
pub mod topic;

pub use credential::{Claims, Credential, CredentialError, CredentialIssuer};
pub use message::{Message, MessageId};
pub use publisher::{PublishError, Publisher};
pub use router::{MessageRouter, RouteError, ValidationError};
pub use topic::{ChannelName, TopicCatalog, AGGREGATE_TOPIC};
