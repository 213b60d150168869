//! Classification of failed handshakes for transport-scheme self-correction.
//!
//! Matching lower-level error text is heuristic and runtime-dependent, so the
//! recognized signatures live in config and can be extended or replaced.

use crate::config::Scheme;
use crate::error::TransportError;

/// Substrings (case-insensitive) recognized in handshake errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeSignatures {
    /// A plaintext attempt hit a TLS-only endpoint.
    pub scheme_mismatch: Vec<String>,
    /// A TLS attempt hit a plaintext endpoint.
    pub tls_rejection: Vec<String>,
}

impl Default for HandshakeSignatures {
    fn default() -> Self {
        Self {
            scheme_mismatch: to_owned_all(&[
                "connection reset",
                "unexpected eof",
                "handshake not finished",
                "httparse",
                "invalid http version",
                "invalid status code",
                "invalid token",
                "unexpected server response",
                "socket hang up",
                "parse error",
                "400 bad request",
            ]),
            tls_rejection: to_owned_all(&[
                "invalidcontenttype",
                "corrupt message",
                "wrong version number",
                "packet length too long",
                "record overflow",
                "invalid message",
                "tls handshake eof",
                "peer is incompatible",
            ]),
        }
    }
}

impl HandshakeSignatures {
    /// Empty sets: no error ever triggers a scheme flip.
    #[must_use]
    pub fn none() -> Self {
        Self { scheme_mismatch: Vec::new(), tls_rejection: Vec::new() }
    }

    #[must_use]
    pub fn with_scheme_mismatch(mut self, signature: impl Into<String>) -> Self {
        self.scheme_mismatch.push(signature.into());
        self
    }

    #[must_use]
    pub fn with_tls_rejection(mut self, signature: impl Into<String>) -> Self {
        self.tls_rejection.push(signature.into());
        self
    }

    /// Classify a failed attempt made with `scheme`.
    ///
    /// A plaintext attempt can only be a scheme mismatch and a secure attempt
    /// can only be a TLS rejection; anything else is unknown.
    #[must_use]
    pub fn classify(&self, scheme: Scheme, error: &TransportError) -> HandshakeFailure {
        let text = error.0.to_ascii_lowercase();
        match scheme {
            Scheme::Plain if matches_any(&self.scheme_mismatch, &text) => HandshakeFailure::SchemeMismatch,
            Scheme::Secure if matches_any(&self.tls_rejection, &text) => HandshakeFailure::TlsRejected,
            Scheme::Secure if text.contains("tls") || text.contains("ssl") => HandshakeFailure::TlsHint,
            _ => HandshakeFailure::Unknown,
        }
    }
}

/// Outcome of classifying a handshake error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeFailure {
    SchemeMismatch,
    TlsRejected,
    /// Mentions TLS but matches no rejection signature; reported, never flipped.
    TlsHint,
    Unknown,
}

fn matches_any(signatures: &[String], text: &str) -> bool {
    signatures
        .iter()
        .any(|sig| !sig.is_empty() && text.contains(&sig.to_ascii_lowercase()))
}

fn to_owned_all(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_owned()).collect()
}

#[cfg(test)]
#[path = "handshake_test.rs"]
mod tests;
