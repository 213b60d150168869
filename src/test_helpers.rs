//! Scripted in-memory transport for client tests.
//!
//! Each `connect()` pops the next scripted outcome. An accepted connection
//! hands the test a [`Peer`] that plays the server side of the socket.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::channel::{mpsc, oneshot};
use futures::{SinkExt, StreamExt};
use tokio::time::Instant;

use frames::Request;

use crate::config::{BackoffConfig, ClientConfig, HeartbeatConfig, TransportMode};
use crate::error::TransportError;
use crate::transport::{Connector, Message, Socket};

/// Error text a TLS-only endpoint produces for a plaintext handshake.
pub(crate) const PLAIN_TO_TLS_ERROR: &str = "IO error: Connection reset by peer (os error 104)";
/// Error text a plaintext endpoint produces for a TLS handshake.
pub(crate) const TLS_TO_PLAIN_ERROR: &str = "IO error: received corrupt message of type InvalidContentType";

/// Deterministic config: forced plaintext, no jitter, heartbeat off.
pub(crate) fn test_config() -> ClientConfig {
    ClientConfig::new("127.0.0.1", 28016, "s3cret")
        .with_transport(TransportMode::ForcedPlain)
        .with_backoff(BackoffConfig {
            base: Duration::from_millis(100),
            max: Duration::from_millis(1_000),
            factor: 2.0,
            jitter: 0.0,
        })
        .with_heartbeat(HeartbeatConfig { interval: Duration::ZERO, timeout: Duration::ZERO })
}

pub(crate) enum Outcome {
    Accept,
    Fail(String),
}

#[derive(Debug, Clone)]
pub(crate) struct Attempt {
    pub url: String,
    pub at: Instant,
}

pub(crate) struct ScriptedConnector {
    script: Mutex<VecDeque<Outcome>>,
    attempts: Mutex<Vec<Attempt>>,
    peers: tokio::sync::mpsc::UnboundedSender<Peer>,
    auto_pong: bool,
}

impl ScriptedConnector {
    /// Connector answering pings automatically. Unscripted attempts fail
    /// with "connection refused".
    pub(crate) fn new(script: Vec<Outcome>) -> (Arc<Self>, tokio::sync::mpsc::UnboundedReceiver<Peer>) {
        Self::build(script, true)
    }

    /// Connector whose peers never answer pings.
    pub(crate) fn silent(script: Vec<Outcome>) -> (Arc<Self>, tokio::sync::mpsc::UnboundedReceiver<Peer>) {
        Self::build(script, false)
    }

    fn build(script: Vec<Outcome>, auto_pong: bool) -> (Arc<Self>, tokio::sync::mpsc::UnboundedReceiver<Peer>) {
        let (peers, rx) = tokio::sync::mpsc::unbounded_channel();
        let connector = Self {
            script: Mutex::new(script.into()),
            attempts: Mutex::new(Vec::new()),
            peers,
            auto_pong,
        };
        (Arc::new(connector), rx)
    }

    pub(crate) fn attempts(&self) -> Vec<Attempt> {
        self.attempts.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn open(&self, url: &str) -> Socket {
        let (client_tx, mut client_rx) = mpsc::unbounded::<Message>();
        let (server_tx, server_rx) = mpsc::unbounded::<Result<Message, TransportError>>();
        let (pong_tx, pong_rx) = mpsc::unbounded::<Result<Message, TransportError>>();
        let (incoming_tx, incoming_rx) = mpsc::unbounded::<Message>();
        let (alive_tx, alive_rx) = oneshot::channel::<()>();

        let auto_pong = self.auto_pong;
        tokio::spawn(async move {
            while let Some(message) = client_rx.next().await {
                match message {
                    Message::Ping(payload) => {
                        if auto_pong {
                            let _ = pong_tx.unbounded_send(Ok(Message::Pong(payload)));
                        }
                    }
                    other => {
                        let _ = incoming_tx.unbounded_send(other);
                    }
                }
            }
        });

        let _ = self.peers.send(Peer {
            url: url.to_owned(),
            incoming: incoming_rx,
            outgoing: server_tx,
            _alive: alive_tx,
        });

        let sink = client_tx.sink_map_err(|e| TransportError::new(e.to_string()));
        let stream = futures::stream::select(server_rx, pong_rx).take_until(alive_rx);
        Socket::new(Box::pin(sink), Box::pin(stream))
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, url: &str) -> Result<Socket, TransportError> {
        self.attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Attempt { url: url.to_owned(), at: Instant::now() });
        let outcome = self.script.lock().unwrap_or_else(PoisonError::into_inner).pop_front();
        match outcome {
            Some(Outcome::Accept) => Ok(self.open(url)),
            Some(Outcome::Fail(message)) => Err(TransportError::new(message)),
            None => Err(TransportError::new("IO error: Connection refused (os error 111)")),
        }
    }
}

/// Server side of one scripted socket. Dropping it ends the client's stream.
pub(crate) struct Peer {
    pub url: String,
    incoming: mpsc::UnboundedReceiver<Message>,
    outgoing: mpsc::UnboundedSender<Result<Message, TransportError>>,
    _alive: oneshot::Sender<()>,
}

impl Peer {
    /// Next command request sent by the client; `None` once the client
    /// dropped the socket.
    pub(crate) async fn next_request(&mut self) -> Option<Request> {
        while let Some(message) = self.incoming.next().await {
            if let Message::Text(text) = message {
                return Some(serde_json::from_str(text.as_str()).expect("request json"));
            }
        }
        None
    }

    pub(crate) fn reply(&self, identifier: i64, message: &str) {
        self.send_json(&serde_json::json!({
            "Identifier": identifier,
            "Message": message,
            "Type": "Generic",
            "Stacktrace": "",
        }));
    }

    pub(crate) fn send_json(&self, value: &serde_json::Value) {
        self.send_text(&value.to_string());
    }

    pub(crate) fn send_text(&self, text: &str) {
        let _ = self.outgoing.unbounded_send(Ok(Message::Text(text.to_owned().into())));
    }

    pub(crate) fn send_binary(&self, bytes: Vec<u8>) {
        let _ = self.outgoing.unbounded_send(Ok(Message::Binary(bytes.into())));
    }

    pub(crate) fn send_close(&self, code: u16, reason: &str) {
        use tokio_tungstenite::tungstenite::protocol::CloseFrame;
        let frame = CloseFrame { code: code.into(), reason: reason.to_owned().into() };
        let _ = self.outgoing.unbounded_send(Ok(Message::Close(Some(frame))));
    }

    pub(crate) fn fail(&self, message: &str) {
        let _ = self.outgoing.unbounded_send(Err(TransportError::new(message)));
    }
}

/// Next peer handed out by the connector.
pub(crate) async fn next_peer(peers: &mut tokio::sync::mpsc::UnboundedReceiver<Peer>) -> Peer {
    peers.recv().await.expect("connector dropped")
}
