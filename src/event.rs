//! Notifications published by a `ProtocolClient`.

use std::time::Duration;

use frames::{ChatMessage, Reply};

use crate::config::Scheme;
use crate::error::ClientError;

/// Why a socket stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The owner called `close()` or `destroy()`.
    Manual,
    /// The peer sent a close frame.
    Remote { code: Option<u16>, reason: String },
    /// The stream ended without a close frame.
    Eof,
    /// A read or write failed.
    Error(String),
    /// No liveness acknowledgment arrived within the watchdog window.
    HeartbeatTimeout,
}

impl CloseReason {
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Manual => "closed by client".to_owned(),
            Self::Remote { code: Some(code), reason } if !reason.is_empty() => {
                format!("closed by server ({code}: {reason})")
            }
            Self::Remote { code: Some(code), .. } => format!("closed by server ({code})"),
            Self::Remote { .. } => "closed by server".to_owned(),
            Self::Eof => "stream ended".to_owned(),
            Self::Error(message) => format!("socket error: {message}"),
            Self::HeartbeatTimeout => "liveness probe unanswered".to_owned(),
        }
    }
}

/// One notification. Subscribers receive every variant and match on the ones
/// they care about.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// A socket opened.
    Open { url: String, scheme: Scheme },
    /// Any structured inbound frame, including command replies.
    Message(Reply),
    /// Unsolicited chat line.
    Chat(ChatMessage),
    /// Unsolicited console or log output.
    Console(Reply),
    /// Unsolicited frame that is neither chat nor console.
    Event(Reply),
    /// Inbound text that could not be parsed as a frame.
    Raw(String),
    Error(ClientError),
    Close(CloseReason),
    /// A reconnection attempt has been scheduled.
    Reconnecting { attempt: u32, delay: Duration },
    /// A scheduled reconnection succeeded.
    Reconnect { attempts: u32 },
}
