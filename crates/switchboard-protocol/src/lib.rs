//! # switchboard-protocol
//!
//! Wire types spoken between the switchboard relay, its clients, and the
//! external realtime broker.
//!
//! Two surfaces are covered:
//!
//! - **Publish API** - the server-side HTTP call that pushes one payload to a
//!   broker channel (`POST /api/publish` with `{channel, data}`)
//! - **Realtime frames** - the JSON command/reply protocol a client uses over
//!   its single multiplexed connection (`connect`, `subscribe`, `unsubscribe`,
//!   `publish`, and asynchronous `push` deliveries)
//!
//! ## Example
//!
//! ```rust
//! use switchboard_protocol::{codec, Command};
//!
//! let frame = Command::subscribe(1, "topic:general");
//! let encoded = codec::encode(&frame).unwrap();
//! assert_eq!(encoded, r#"{"id":1,"subscribe":{"channel":"topic:general"}}"#);
//! ```

pub mod api;
pub mod codec;
pub mod frames;

pub use api::PublishRequest;
pub use codec::{decode, encode, ProtocolError};
pub use frames::{Command, Method, Reply, ReplyError, ReplyKind};
