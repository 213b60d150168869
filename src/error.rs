//! Error types for the protocol client.
//!
//! ERROR HANDLING
//! ==============
//! Capacity, timeout and remote errors are local to one `command()` call and
//! never touch the connection. Transport and connection-lost errors are both
//! returned to callers and broadcast as events, and they drive reconnection.
//! `ClientError` is `Clone` so a single failure can be handed to every
//! waiter of a shared connect attempt and every rejected command.

/// Failure surfaced by the transport seam. Its text is what handshake
/// signatures are matched against.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct TransportError(pub String);

impl TransportError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    /// Flatten an error and its `source()` chain into one message.
    #[must_use]
    pub fn from_chain(error: &(dyn std::error::Error + 'static)) -> Self {
        let mut message = error.to_string();
        let mut source = error.source();
        while let Some(cause) = source {
            let text = cause.to_string();
            if !message.contains(&text) {
                message.push_str(": ");
                message.push_str(&text);
            }
            source = cause.source();
        }
        Self(message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// In-flight command limit reached; the command was not sent.
    #[error("too many commands in flight (limit {limit})")]
    Capacity { limit: usize },
    /// No matching reply arrived in time. The connection stays open.
    #[error("command `{command}` timed out after {elapsed_ms}ms")]
    Timeout { command: String, elapsed_ms: u64 },
    /// The client was closed by its owner.
    #[error("connection closed")]
    ConnectionClosed,
    /// The socket went away while the command was outstanding.
    #[error("connection lost: {reason}")]
    ConnectionLost { reason: String },
    /// Plaintext handshake failed in a way that suggests the server wants TLS.
    #[error("transport scheme mismatch connecting to {url}: {message} (server may require TLS; try transport=secure)")]
    SchemeMismatch { url: String, message: String },
    /// TLS handshake was rejected.
    #[error("TLS handshake failed connecting to {url}: {message} (server may not speak TLS; try transport=plain)")]
    Tls { url: String, message: String },
    #[error("websocket connect failed: {0}")]
    Transport(String),
    #[error("failed to send command: {0}")]
    Send(String),
    /// The server answered the command with an error-typed reply.
    #[error("server returned error for `{command}`: {message}")]
    Remote { command: String, message: String },
    #[error("failed to encode request: {0}")]
    Encode(String),
    #[error("client destroyed")]
    Destroyed,
}

impl ClientError {
    /// Whether the failure is about connectivity and may clear up on retry.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ConnectionLost { .. }
                | Self::SchemeMismatch { .. }
                | Self::Tls { .. }
                | Self::Transport(_)
                | Self::Send(_)
        )
    }
}

impl From<frames::CodecError> for ClientError {
    fn from(error: frames::CodecError) -> Self {
        Self::Encode(error.to_string())
    }
}

impl From<ConfigError> for ClientError {
    fn from(error: ConfigError) -> Self {
        Self::Transport(error.to_string())
    }
}

/// Invalid or missing configuration.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingVar(&'static str),
    #[error("host must not be empty")]
    EmptyHost,
    #[error("invalid host '{host}': {reason}")]
    InvalidHost { host: String, reason: String },
    #[error("invalid port: {0}")]
    InvalidPort(String),
    #[error("unknown transport mode '{0}' (expected 'plain', 'secure' or 'auto')")]
    UnknownTransport(String),
    #[error("backoff factor must be finite and >= 1, got {0}")]
    InvalidBackoffFactor(f64),
    #[error("backoff jitter must be within 0..=1, got {0}")]
    InvalidJitter(f64),
    #[error("backoff max ({max_ms}ms) is below base ({base_ms}ms)")]
    InvalidBackoffRange { base_ms: u64, max_ms: u64 },
    #[error("max in-flight commands must be at least 1")]
    ZeroInFlight,
    #[error("command timeout must be non-zero")]
    ZeroCommandTimeout,
    #[error("heartbeat timeout must be non-zero while probes are enabled")]
    ZeroHeartbeatTimeout,
}

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;
