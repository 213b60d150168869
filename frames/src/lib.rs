//! Wire model and JSON codec for the remote console protocol.
//!
//! This crate owns the record shapes exchanged with a game server's console
//! endpoint. It does no I/O: the client crate hands it text frames and gets
//! typed records back.
//!
//! WIRE FORMAT
//! ===========
//! Requests are `{"Identifier": 7, "Message": "status", "Name": "WebRcon"}`.
//! Replies echo `Identifier` when answering a command and carry free-form
//! `Message` text plus a `Type` hint used to classify unsolicited frames
//! (chat, console output, or anything else).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Client name stamped on every outbound request.
pub const DEFAULT_CLIENT_NAME: &str = "WebRcon";

/// Error returned by [`encode_request`] and [`decode_reply`].
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The text was not valid JSON or did not match the record shape.
    #[error("invalid json frame: {0}")]
    Json(#[from] serde_json::Error),
    /// The text parsed as JSON but was not an object.
    #[error("frame is not a json object")]
    NotAnObject,
}

// =============================================================================
// REQUEST
// =============================================================================

/// Outbound command record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Request {
    /// Sequence id used to correlate the reply.
    pub identifier: i64,
    /// Command text, exactly as typed at a server console.
    pub message: String,
    /// Fixed client identifier.
    pub name: String,
}

impl Request {
    /// Build a request carrying the default client name.
    #[must_use]
    pub fn new(identifier: i64, message: impl Into<String>) -> Self {
        Self { identifier, message: message.into(), name: DEFAULT_CLIENT_NAME.to_owned() }
    }
}

// =============================================================================
// REPLY
// =============================================================================

/// Server-declared type of a reply frame.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ReplyKind {
    Generic,
    Log,
    Warning,
    Error,
    Chat,
    Report,
    Subscription,
    /// Unrecognized type name, preserved verbatim.
    Other(String),
}

impl ReplyKind {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Generic => "Generic",
            Self::Log => "Log",
            Self::Warning => "Warning",
            Self::Error => "Error",
            Self::Chat => "Chat",
            Self::Report => "Report",
            Self::Subscription => "Subscription",
            Self::Other(name) => name,
        }
    }
}

impl From<String> for ReplyKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Generic" => Self::Generic,
            "Log" => Self::Log,
            "Warning" => Self::Warning,
            "Error" => Self::Error,
            "Chat" => Self::Chat,
            "Report" => Self::Report,
            "Subscription" => Self::Subscription,
            _ => Self::Other(value),
        }
    }
}

impl From<ReplyKind> for String {
    fn from(value: ReplyKind) -> Self {
        match value {
            ReplyKind::Other(name) => name,
            known => known.as_str().to_owned(),
        }
    }
}

/// Notification channel a reply belongs to when nobody is waiting on it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Category {
    Chat,
    Console,
    Event,
}

/// Inbound record. Every field is optional on the wire.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Reply {
    #[serde(default)]
    pub identifier: Option<i64>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub message: String,
    #[serde(default, rename = "Type")]
    pub kind: Option<ReplyKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stacktrace: Option<String>,
}

impl Reply {
    /// Identifier usable for command correlation.
    ///
    /// Servers stamp unsolicited output with `0` or `-1`; those never match
    /// a command.
    #[must_use]
    pub fn correlation_id(&self) -> Option<i64> {
        self.identifier.filter(|id| *id > 0)
    }

    /// Classify the reply for typed notification delivery.
    #[must_use]
    pub fn category(&self) -> Category {
        match self.kind {
            Some(ReplyKind::Chat) => Category::Chat,
            Some(ReplyKind::Generic | ReplyKind::Log | ReplyKind::Warning | ReplyKind::Error) => {
                Category::Console
            }
            _ => Category::Event,
        }
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        self.kind == Some(ReplyKind::Error)
    }
}

// =============================================================================
// CHAT
// =============================================================================

/// Chat line carried JSON-encoded inside a `Chat` reply's `Message`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ChatMessage {
    #[serde(default)]
    pub channel: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub user_id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub time: i64,
}

impl ChatMessage {
    /// Parse the chat payload of a reply.
    ///
    /// Falls back to treating the whole message as chat text when the payload
    /// is not a JSON chat object.
    #[must_use]
    pub fn from_reply(reply: &Reply) -> Self {
        serde_json::from_str::<Self>(&reply.message)
            .unwrap_or_else(|_| Self { message: reply.message.clone(), ..Self::default() })
    }
}

// Steam ids arrive as either JSON numbers or strings depending on server build,
// and some commands answer with a structured or null `Message`.
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Null => Ok(String::new()),
        other => Ok(other.to_string()),
    }
}

// =============================================================================
// CODEC
// =============================================================================

/// Serialize a request into a single text frame.
///
/// # Errors
///
/// Returns [`CodecError::Json`] if serialization fails.
pub fn encode_request(request: &Request) -> Result<String, CodecError> {
    Ok(serde_json::to_string(request)?)
}

/// Parse a text frame into a reply.
///
/// # Errors
///
/// Returns [`CodecError::Json`] for malformed JSON or mistyped fields and
/// [`CodecError::NotAnObject`] for JSON that is not an object.
pub fn decode_reply(text: &str) -> Result<Reply, CodecError> {
    let value: Value = serde_json::from_str(text)?;
    if !value.is_object() {
        return Err(CodecError::NotAnObject);
    }
    Ok(serde_json::from_value(value)?)
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;
