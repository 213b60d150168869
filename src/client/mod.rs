//! Protocol client for a single remote console endpoint.
//!
//! DESIGN
//! ======
//! One `ProtocolClient` owns one logical connection. Four concerns share a
//! single per-instance `ConnectionState` behind one mutex:
//! - `connection`: single-flight connect, scheme self-correction, socket I/O
//! - `correlator`: sequence ids, pending-command table, inbound dispatch
//! - `heartbeat`: liveness probes and the watchdog that kills dead sockets
//! - `reconnect`: backoff-driven reconnection after unexpected closes
//!
//! The lock is never held across an `.await`. The socket itself lives inside
//! one I/O task; everything else reaches it through an outbound channel.
//!
//! LIFECYCLE
//! =========
//! 1. `connect()`/`ensure()` → shared handshake attempt
//! 2. Open → spawn I/O task (reader, writer, heartbeat)
//! 3. `command()` → send request, await reply matched by sequence id
//! 4. Unexpected close → reject pending commands, schedule reconnect
//! 5. `close()`/`destroy()` → cancel timers, drop socket, reject pending

mod connection;
mod correlator;
mod heartbeat;
mod reconnect;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::{BoxFuture, Shared};
use tokio::sync::broadcast;
use tokio::time::Instant;

use frames::Reply;

use crate::backoff::Backoff;
use crate::config::{ClientConfig, Scheme};
use crate::error::{ClientError, ConfigError};
use crate::event::ClientEvent;
use crate::transport::{Connector, TungsteniteConnector};

use self::connection::{ConnectOrigin, SocketHandle};
use self::correlator::PendingTable;
use self::reconnect::ReconnectState;

pub use self::reconnect::ReconnectPhase;

const EVENT_CHANNEL_CAPACITY: usize = 1024;

type SharedConnect = Shared<BoxFuture<'static, Result<(), ClientError>>>;

/// Per-call command options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommandOptions {
    /// Overrides the configured default command timeout.
    pub timeout: Option<Duration>,
}

impl CommandOptions {
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout: Some(timeout) }
    }
}

// =============================================================================
// STATE
// =============================================================================

struct Inner {
    config: ClientConfig,
    connector: Arc<dyn Connector>,
    state: Mutex<ConnectionState>,
}

struct ConnectionState {
    socket: Option<SocketHandle>,
    connected: bool,
    manual_close: bool,
    destroyed: bool,
    /// Scheme currently in use; may differ from config under auto-detect.
    scheme: Scheme,
    /// Set when auto-detect upgraded plaintext to TLS.
    auto_upgraded: bool,
    backoff: Backoff,
    reconnect: ReconnectState,
    connecting: Option<SharedConnect>,
    pending: PendingTable,
    last_ack: Option<Instant>,
    generation: u64,
    events: Option<broadcast::Sender<ClientEvent>>,
}

impl ConnectionState {
    fn emit(&self, event: ClientEvent) {
        if let Some(events) = &self.events {
            // No subscribers is fine.
            let _ = events.send(event);
        }
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, ConnectionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// =============================================================================
// PUBLIC CLIENT
// =============================================================================

/// Resilient, self-reconnecting client for one console endpoint.
///
/// Dropping the client destroys it: timers stop, the socket closes, and
/// pending commands fail with [`ClientError::ConnectionClosed`].
pub struct ProtocolClient {
    inner: Arc<Inner>,
}

impl ProtocolClient {
    /// Build a client using the tokio-tungstenite transport.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the config fails validation.
    pub fn new(config: ClientConfig) -> Result<Self, ConfigError> {
        let connector = TungsteniteConnector::new(config.connect_timeout);
        Self::with_connector(config, Arc::new(connector))
    }

    /// Build a client over a custom transport.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the config fails validation.
    pub fn with_connector(config: ClientConfig, connector: Arc<dyn Connector>) -> Result<Self, ConfigError> {
        config.validate()?;
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let state = ConnectionState {
            socket: None,
            connected: false,
            manual_close: false,
            destroyed: false,
            scheme: config.transport.initial_scheme(),
            auto_upgraded: false,
            backoff: Backoff::new(config.backoff),
            reconnect: ReconnectState::default(),
            connecting: None,
            pending: PendingTable::default(),
            last_ack: None,
            generation: 0,
            events: Some(events),
        };
        Ok(Self { inner: Arc::new(Inner { config, connector, state: Mutex::new(state) }) })
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Subscribe to notifications. After [`destroy`](Self::destroy) the
    /// returned receiver is already closed.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        if let Some(events) = &self.inner.lock().events {
            return events.subscribe();
        }
        let (_, closed) = broadcast::channel(1);
        closed
    }

    /// Open the connection. No-op if already open; concurrent callers share
    /// one in-flight attempt.
    ///
    /// A failed attempt is returned to the caller and also handed to the
    /// reconnection scheduler. Calling `connect()` after `close()` re-arms
    /// automatic reconnection.
    ///
    /// # Errors
    ///
    /// Returns the handshake failure, [`ClientError::ConnectionClosed`] if the
    /// client was closed mid-attempt, or [`ClientError::Destroyed`].
    pub async fn connect(&self) -> Result<(), ClientError> {
        self.inner.connect(ConnectOrigin::Caller).await
    }

    /// Connect only if not already connected.
    ///
    /// # Errors
    ///
    /// Same as [`connect`](Self::connect).
    pub async fn ensure(&self) -> Result<(), ClientError> {
        self.inner.ensure().await
    }

    /// Send a command with the default timeout and await its reply.
    ///
    /// # Errors
    ///
    /// See [`command_with`](Self::command_with).
    pub async fn command(&self, text: &str) -> Result<Reply, ClientError> {
        self.inner.command(text, CommandOptions::default()).await
    }

    /// Send a command and await the reply carrying its sequence id.
    ///
    /// # Errors
    ///
    /// - [`ClientError::Capacity`] when the in-flight limit is reached (never queued)
    /// - [`ClientError::Timeout`] when no reply arrives in time; the connection stays open
    /// - [`ClientError::Remote`] when the server answers with an error-typed reply
    /// - connection errors when the socket is lost or the client closed
    pub async fn command_with(&self, text: &str, options: CommandOptions) -> Result<Reply, ClientError> {
        self.inner.command(text, options).await
    }

    /// Close the connection and stop reconnecting. Pending commands fail with
    /// [`ClientError::ConnectionClosed`].
    pub fn close(&self) {
        self.inner.shutdown(false);
    }

    /// [`close`](Self::close), then detach every subscriber. The client is
    /// inert afterwards.
    pub fn destroy(&self) {
        self.inner.shutdown(true);
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.lock().connected
    }

    /// Number of commands awaiting a reply.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Transport scheme currently selected.
    #[must_use]
    pub fn scheme(&self) -> Scheme {
        self.inner.lock().scheme
    }

    /// When the last liveness acknowledgment was received.
    #[must_use]
    pub fn last_liveness_ack(&self) -> Option<Instant> {
        self.inner.lock().last_ack
    }

    /// Un-jittered delay the next scheduled reconnect will be based on.
    #[must_use]
    pub fn current_backoff(&self) -> Duration {
        self.inner.lock().backoff.current()
    }

    #[must_use]
    pub fn reconnect_phase(&self) -> ReconnectPhase {
        self.inner.lock().reconnect.phase()
    }
}

impl Drop for ProtocolClient {
    fn drop(&mut self) {
        self.inner.shutdown(true);
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
