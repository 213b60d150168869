//! Resilient console client for remotely administered game servers.
//!
//! A [`ProtocolClient`] keeps one authenticated WebSocket connection to one
//! server console alive indefinitely, correlates commands with their replies,
//! and publishes everything else it hears as typed [`ClientEvent`]s.
//!
//! ```rust,ignore
//! let config = ClientConfig::new("10.0.0.5", 28016, "hunter2");
//! let client = ProtocolClient::new(config)?;
//! let mut events = client.subscribe();
//! let reply = client.command("status").await?;
//! println!("{}", reply.message);
//! ```

pub mod backoff;
pub mod client;
pub mod config;
pub mod error;
pub mod event;
pub mod handshake;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use client::{CommandOptions, ProtocolClient};
pub use config::{BackoffConfig, ClientConfig, HeartbeatConfig, Scheme, TransportMode};
pub use error::{ClientError, ConfigError, TransportError};
pub use event::{ClientEvent, CloseReason};
pub use frames::{Category, ChatMessage, Reply, ReplyKind};
pub use handshake::{HandshakeFailure, HandshakeSignatures};
pub use transport::{Connector, Socket, TungsteniteConnector};
