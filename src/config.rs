//! Client configuration, parsed once at construction.
//!
//! DESIGN
//! ======
//! `ClientConfig` is immutable after `ProtocolClient::new`. Defaults favour a
//! long-lived admin connection: slow exponential backoff with jitter, a probe
//! every 15s, and a bounded in-flight command window.

use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

use url::Url;

use crate::error::ConfigError;
use crate::handshake::HandshakeSignatures;

pub const DEFAULT_BACKOFF_BASE_MS: u64 = 1_000;
pub const DEFAULT_BACKOFF_MAX_MS: u64 = 30_000;
pub const DEFAULT_BACKOFF_FACTOR: f64 = 2.0;
pub const DEFAULT_BACKOFF_JITTER: f64 = 0.2;
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 15_000;
pub const DEFAULT_HEARTBEAT_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_MAX_IN_FLIGHT: usize = 64;
pub const DEFAULT_SCHEME_FLIP_DELAY_MS: u64 = 250;
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;

// =============================================================================
// TRANSPORT
// =============================================================================

/// Configured transport policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    /// Always `ws://`.
    ForcedPlain,
    /// Always `wss://`.
    ForcedSecure,
    /// Start with `ws://` and self-correct on scheme-mismatch errors.
    AutoDetect,
}

impl TransportMode {
    /// Parse `plain`, `secure`, or `auto`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownTransport`] for any other name.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "plain" | "ws" => Ok(Self::ForcedPlain),
            "secure" | "wss" | "tls" => Ok(Self::ForcedSecure),
            "auto" => Ok(Self::AutoDetect),
            other => Err(ConfigError::UnknownTransport(other.to_owned())),
        }
    }

    /// Scheme used for the first attempt under this mode.
    #[must_use]
    pub fn initial_scheme(self) -> Scheme {
        match self {
            Self::ForcedSecure => Scheme::Secure,
            Self::ForcedPlain | Self::AutoDetect => Scheme::Plain,
        }
    }
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ForcedPlain => "plain",
            Self::ForcedSecure => "secure",
            Self::AutoDetect => "auto",
        })
    }
}

/// Transport scheme actually used by a connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Plain,
    Secure,
}

impl Scheme {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Plain => "ws",
            Self::Secure => "wss",
        }
    }

    #[must_use]
    pub fn flipped(self) -> Self {
        match self {
            Self::Plain => Self::Secure,
            Self::Secure => Self::Plain,
        }
    }
}

// =============================================================================
// TUNABLES
// =============================================================================

/// Reconnection backoff parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffConfig {
    /// Floor delay; the delay resets here on every successful open.
    pub base: Duration,
    /// Ceiling for the grown delay.
    pub max: Duration,
    /// Multiplier applied after each failed reconnection attempt.
    pub factor: f64,
    /// Fraction of the delay randomly added or subtracted (`0.0..=1.0`).
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(DEFAULT_BACKOFF_BASE_MS),
            max: Duration::from_millis(DEFAULT_BACKOFF_MAX_MS),
            factor: DEFAULT_BACKOFF_FACTOR,
            jitter: DEFAULT_BACKOFF_JITTER,
        }
    }
}

/// Liveness probe parameters. A zero interval disables the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatConfig {
    pub interval: Duration,
    /// How long a probe may go unacknowledged before the socket is killed.
    pub timeout: Duration,
}

impl HeartbeatConfig {
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        !self.interval.is_zero()
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(DEFAULT_HEARTBEAT_INTERVAL_MS),
            timeout: Duration::from_millis(DEFAULT_HEARTBEAT_TIMEOUT_MS),
        }
    }
}

// =============================================================================
// CLIENT CONFIG
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub secret: String,
    pub transport: TransportMode,
    pub backoff: BackoffConfig,
    pub heartbeat: HeartbeatConfig,
    pub command_timeout: Duration,
    pub max_in_flight: usize,
    /// One-shot retry delay used right after a transport-scheme flip.
    pub scheme_flip_delay: Duration,
    /// Upper bound on a single handshake attempt.
    pub connect_timeout: Duration,
    pub signatures: HandshakeSignatures,
}

impl ClientConfig {
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16, secret: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            secret: secret.into(),
            transport: TransportMode::AutoDetect,
            backoff: BackoffConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            command_timeout: Duration::from_millis(DEFAULT_COMMAND_TIMEOUT_MS),
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            scheme_flip_delay: Duration::from_millis(DEFAULT_SCHEME_FLIP_DELAY_MS),
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
            signatures: HandshakeSignatures::default(),
        }
    }

    #[must_use]
    pub fn with_transport(mut self, transport: TransportMode) -> Self {
        self.transport = transport;
        self
    }

    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    #[must_use]
    pub fn with_heartbeat(mut self, heartbeat: HeartbeatConfig) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    #[must_use]
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_max_in_flight(mut self, limit: usize) -> Self {
        self.max_in_flight = limit;
        self
    }

    #[must_use]
    pub fn with_scheme_flip_delay(mut self, delay: Duration) -> Self {
        self.scheme_flip_delay = delay;
        self
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_signatures(mut self, signatures: HandshakeSignatures) -> Self {
        self.signatures = signatures;
        self
    }

    /// Build typed config from environment variables.
    ///
    /// Required:
    /// - `RCON_HOST`, `RCON_PORT`, `RCON_SECRET`
    ///
    /// Optional:
    /// - `RCON_TRANSPORT`: `auto` (default), `plain`, or `secure`
    /// - `RCON_BACKOFF_BASE_MS` / `RCON_BACKOFF_MAX_MS`: default 1000 / 30000
    /// - `RCON_BACKOFF_FACTOR` / `RCON_BACKOFF_JITTER`: default 2.0 / 0.2
    /// - `RCON_HEARTBEAT_INTERVAL_MS` / `RCON_HEARTBEAT_TIMEOUT_MS`: default 15000 / 10000
    /// - `RCON_COMMAND_TIMEOUT_MS`: default 10000
    /// - `RCON_MAX_IN_FLIGHT`: default 64
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a required variable is missing, the port or
    /// transport is unparsable, or the assembled config fails validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = require_env("RCON_HOST")?;
        let port_raw = require_env("RCON_PORT")?;
        let port = port_raw.parse::<u16>().map_err(|_| ConfigError::InvalidPort(port_raw))?;
        let secret = require_env("RCON_SECRET")?;

        let transport = match std::env::var("RCON_TRANSPORT") {
            Ok(raw) => TransportMode::parse(&raw)?,
            Err(_) => TransportMode::AutoDetect,
        };

        let backoff = BackoffConfig {
            base: Duration::from_millis(env_parse("RCON_BACKOFF_BASE_MS", DEFAULT_BACKOFF_BASE_MS)),
            max: Duration::from_millis(env_parse("RCON_BACKOFF_MAX_MS", DEFAULT_BACKOFF_MAX_MS)),
            factor: env_parse("RCON_BACKOFF_FACTOR", DEFAULT_BACKOFF_FACTOR),
            jitter: env_parse("RCON_BACKOFF_JITTER", DEFAULT_BACKOFF_JITTER),
        };
        let heartbeat = HeartbeatConfig {
            interval: Duration::from_millis(env_parse("RCON_HEARTBEAT_INTERVAL_MS", DEFAULT_HEARTBEAT_INTERVAL_MS)),
            timeout: Duration::from_millis(env_parse("RCON_HEARTBEAT_TIMEOUT_MS", DEFAULT_HEARTBEAT_TIMEOUT_MS)),
        };

        let config = Self::new(host, port, secret)
            .with_transport(transport)
            .with_backoff(backoff)
            .with_heartbeat(heartbeat)
            .with_command_timeout(Duration::from_millis(env_parse(
                "RCON_COMMAND_TIMEOUT_MS",
                DEFAULT_COMMAND_TIMEOUT_MS,
            )))
            .with_max_in_flight(env_parse("RCON_MAX_IN_FLIGHT", DEFAULT_MAX_IN_FLIGHT));
        config.validate()?;
        Ok(config)
    }

    /// Check invariants the client relies on.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::EmptyHost);
        }
        if self.port == 0 {
            return Err(ConfigError::InvalidPort("0".to_owned()));
        }
        self.endpoint(Scheme::Plain, "")?;
        if !self.backoff.factor.is_finite() || self.backoff.factor < 1.0 {
            return Err(ConfigError::InvalidBackoffFactor(self.backoff.factor));
        }
        if !(0.0..=1.0).contains(&self.backoff.jitter) {
            return Err(ConfigError::InvalidJitter(self.backoff.jitter));
        }
        if self.backoff.max < self.backoff.base {
            return Err(ConfigError::InvalidBackoffRange {
                base_ms: duration_ms(self.backoff.base),
                max_ms: duration_ms(self.backoff.max),
            });
        }
        if self.max_in_flight == 0 {
            return Err(ConfigError::ZeroInFlight);
        }
        if self.command_timeout.is_zero() {
            return Err(ConfigError::ZeroCommandTimeout);
        }
        if self.heartbeat.is_enabled() && self.heartbeat.timeout.is_zero() {
            return Err(ConfigError::ZeroHeartbeatTimeout);
        }
        Ok(())
    }

    /// Connection URI for the given scheme: `ws[s]://host:port/<secret>/`.
    ///
    /// The secret is percent-encoded as one path segment and IPv6 hosts are
    /// bracketed.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidHost`] when the host is not a valid
    /// domain or IP address.
    pub fn url(&self, scheme: Scheme) -> Result<String, ConfigError> {
        self.endpoint(scheme, &self.secret).map(String::from)
    }

    /// Same as [`url`](Self::url) with the secret masked, for logs.
    ///
    /// # Errors
    ///
    /// Same as [`url`](Self::url).
    pub fn redacted_url(&self, scheme: Scheme) -> Result<String, ConfigError> {
        self.endpoint(scheme, "***").map(String::from)
    }

    fn endpoint(&self, scheme: Scheme, segment: &str) -> Result<Url, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidHost { host: self.host.clone(), reason };

        let mut url = Url::parse(&format!("{}://localhost/", scheme.as_str())).map_err(|e| invalid(e.to_string()))?;
        match self.host.parse::<IpAddr>() {
            Ok(ip) => url.set_ip_host(ip).map_err(|()| invalid("cannot set ip host".to_owned()))?,
            Err(_) => url.set_host(Some(&self.host)).map_err(|e| invalid(e.to_string()))?,
        }
        url.set_port(Some(self.port)).map_err(|()| invalid("cannot set port".to_owned()))?;
        url.path_segments_mut()
            .map_err(|()| invalid("cannot set path".to_owned()))?
            .pop_if_empty()
            .push(segment)
            .push("");
        Ok(url)
    }
}

// =============================================================================
// HELPERS
// =============================================================================

fn require_env(key: &'static str) -> Result<String, ConfigError> {
    std::env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::MissingVar(key))
}

fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

pub(crate) fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
