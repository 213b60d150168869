//! Connection manager: single-flight connect, scheme self-correction, and the
//! per-socket I/O task.
//!
//! DESIGN
//! ======
//! A connect attempt runs in its own task and is shared through
//! `futures::future::Shared`, so any number of concurrent `connect()` and
//! `ensure()` callers await the same handshake. Under auto-detect a plaintext
//! attempt that fails with a scheme-mismatch signature is retried once over
//! TLS, and an upgraded TLS attempt the server rejects falls back to
//! plaintext once. Each flip retries after the one-shot flip delay.
//!
//! Every open socket gets a generation number. Close handling for a socket
//! whose handle was already taken (manual close, newer socket) is ignored.

use std::sync::Arc;

use futures::{FutureExt, SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use crate::config::{Scheme, TransportMode};
use crate::error::{ClientError, TransportError};
use crate::event::{ClientEvent, CloseReason};
use crate::handshake::HandshakeFailure;
use crate::transport::{Message, Socket};

use super::heartbeat::{Heartbeat, HeartbeatAction};
use super::{Inner, SharedConnect};

/// Scheme flips allowed within one connect attempt: plain→secure, then back.
const MAX_SCHEME_FLIPS: u32 = 2;

/// Who asked for a connection. Only callers re-arm reconnection after
/// `close()` and hand their failures to the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum ConnectOrigin {
    Caller,
    Scheduler,
}

/// Client-side handle to the socket owned by the I/O task.
pub(super) struct SocketHandle {
    pub(super) generation: u64,
    pub(super) outbound: mpsc::UnboundedSender<Message>,
    terminate: oneshot::Sender<()>,
}

impl SocketHandle {
    /// Drop the socket immediately, without a closing handshake.
    pub(super) fn terminate(self) {
        let _ = self.terminate.send(());
    }
}

impl Inner {
    // =========================================================================
    // CONNECT
    // =========================================================================

    pub(super) async fn connect(self: &Arc<Self>, origin: ConnectOrigin) -> Result<(), ClientError> {
        let attempt = {
            let mut state = self.lock();
            if state.destroyed {
                return Err(ClientError::Destroyed);
            }
            if origin == ConnectOrigin::Caller {
                state.manual_close = false;
            }
            if state.connected {
                return Ok(());
            }
            if let Some(attempt) = &state.connecting {
                attempt.clone()
            } else {
                let attempt = self.spawn_attempt();
                state.connecting = Some(attempt.clone());
                attempt
            }
        };

        let result = attempt.await;
        if result.is_err() && origin == ConnectOrigin::Caller {
            self.schedule_reconnect();
        }
        result
    }

    pub(super) async fn ensure(self: &Arc<Self>) -> Result<(), ClientError> {
        {
            let state = self.lock();
            if state.destroyed {
                return Err(ClientError::Destroyed);
            }
            if state.connected {
                return Ok(());
            }
        }
        self.connect(ConnectOrigin::Caller).await
    }

    fn spawn_attempt(self: &Arc<Self>) -> SharedConnect {
        let inner = Arc::clone(self);
        let task = tokio::spawn(async move {
            let result = inner.establish().await;
            inner.lock().connecting = None;
            result
        });
        async move {
            task.await
                .unwrap_or_else(|e| Err(ClientError::Transport(format!("connect task failed: {e}"))))
        }
        .boxed()
        .shared()
    }

    /// Handshake loop with bounded scheme self-correction.
    async fn establish(self: &Arc<Self>) -> Result<(), ClientError> {
        let mut flips = 0_u32;
        loop {
            let scheme = {
                let state = self.lock();
                if state.destroyed {
                    return Err(ClientError::Destroyed);
                }
                if state.manual_close {
                    return Err(ClientError::ConnectionClosed);
                }
                state.scheme
            };
            let target = self.config.url(scheme)?;
            let url = self.config.redacted_url(scheme)?;
            debug!(%url, "rcon: connecting");

            let error = match self.connector.connect(&target).await {
                Ok(socket) => return self.install(socket, scheme, url),
                Err(error) => error,
            };

            let failure = self.config.signatures.classify(scheme, &error);
            if let Some(delay) = self.try_flip(scheme, failure, &mut flips) {
                sleep(delay).await;
                continue;
            }

            let error = describe_failure(failure, url, error);
            warn!(error = %error, "rcon: connect failed");
            self.lock().emit(ClientEvent::Error(error.clone()));
            return Err(error);
        }
    }

    /// Switch scheme after a recognized mismatch. Returns the retry delay, or
    /// `None` when the failure should be surfaced instead.
    fn try_flip(&self, scheme: Scheme, failure: HandshakeFailure, flips: &mut u32) -> Option<std::time::Duration> {
        if self.config.transport != TransportMode::AutoDetect || *flips >= MAX_SCHEME_FLIPS {
            return None;
        }
        let mut state = self.lock();
        let next = match (failure, scheme) {
            (HandshakeFailure::SchemeMismatch, Scheme::Plain) => {
                state.auto_upgraded = true;
                Scheme::Secure
            }
            (HandshakeFailure::TlsRejected, Scheme::Secure) if state.auto_upgraded => {
                state.auto_upgraded = false;
                Scheme::Plain
            }
            _ => return None,
        };
        *flips += 1;
        state.scheme = next;
        let delay = self.config.scheme_flip_delay;
        warn!(
            from = scheme.as_str(),
            to = next.as_str(),
            flips = *flips,
            delay_ms = crate::config::duration_ms(delay),
            "rcon: transport scheme mismatch, retrying"
        );
        Some(delay)
    }

    /// Adopt a freshly opened socket and start its I/O task.
    fn install(self: &Arc<Self>, socket: Socket, scheme: Scheme, url: String) -> Result<(), ClientError> {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (terminate_tx, terminate_rx) = oneshot::channel();
        let generation = {
            let mut state = self.lock();
            if state.destroyed {
                return Err(ClientError::Destroyed);
            }
            if state.manual_close {
                return Err(ClientError::ConnectionClosed);
            }
            state.generation += 1;
            let generation = state.generation;
            state.socket = Some(SocketHandle { generation, outbound: outbound_tx, terminate: terminate_tx });
            state.connected = true;
            state.scheme = scheme;
            state.backoff.reset();
            state.reconnect.cancel_scheduled();
            state.emit(ClientEvent::Open { url: url.clone(), scheme });
            generation
        };
        info!(%url, generation, "rcon: connected");
        tokio::spawn(Arc::clone(self).run_socket(socket, generation, outbound_rx, terminate_rx));
        Ok(())
    }

    // =========================================================================
    // SOCKET I/O
    // =========================================================================

    async fn run_socket(
        self: Arc<Self>,
        socket: Socket,
        generation: u64,
        mut outbound: mpsc::UnboundedReceiver<Message>,
        mut terminate: oneshot::Receiver<()>,
    ) {
        let Socket { mut sink, mut stream } = socket;
        let mut heartbeat = Heartbeat::new(self.config.heartbeat);

        let reason = loop {
            tokio::select! {
                _ = &mut terminate => break CloseReason::Manual,
                inbound = stream.next() => match inbound {
                    Some(Ok(Message::Text(text))) => self.handle_frame(text.as_str()),
                    Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                        Ok(text) => self.handle_frame(text),
                        Err(_) => {
                            let raw = String::from_utf8_lossy(&bytes).into_owned();
                            self.lock().emit(ClientEvent::Raw(raw));
                        }
                    },
                    Some(Ok(Message::Pong(_))) => {
                        heartbeat.acknowledge();
                        self.lock().last_ack = Some(Instant::now());
                    }
                    Some(Ok(Message::Close(frame))) => {
                        break match frame {
                            Some(frame) => CloseReason::Remote {
                                code: Some(u16::from(frame.code)),
                                reason: frame.reason.as_str().to_owned(),
                            },
                            None => CloseReason::Remote { code: None, reason: String::new() },
                        };
                    }
                    Some(Ok(_)) => {}
                    Some(Err(error)) => break CloseReason::Error(error.0),
                    None => break CloseReason::Eof,
                },
                Some(message) = outbound.recv() => {
                    if let Err(error) = sink.send(message).await {
                        break CloseReason::Error(error.0);
                    }
                }
                action = heartbeat.next_action() => match action {
                    HeartbeatAction::Probe => {
                        if let Err(error) = sink.send(Message::Ping(Vec::new().into())).await {
                            break CloseReason::Error(error.0);
                        }
                    }
                    HeartbeatAction::Expired => {
                        warn!(generation, "rcon: liveness probe unanswered, dropping socket");
                        break CloseReason::HeartbeatTimeout;
                    }
                },
            }
        };

        // Manual closes say goodbye; every other path is already dead or
        // must not wait on a peer that stopped answering.
        if reason == CloseReason::Manual {
            let _ = sink.close().await;
        }
        drop(sink);
        drop(stream);
        self.on_socket_closed(generation, reason);
    }

    fn on_socket_closed(self: &Arc<Self>, generation: u64, reason: CloseReason) {
        let manual = {
            let mut state = self.lock();
            if !state.socket.as_ref().is_some_and(|s| s.generation == generation) {
                return;
            }
            state.socket = None;
            state.connected = false;
            let error = ClientError::ConnectionLost { reason: reason.describe() };
            state.pending.reject_all(&error);
            if matches!(reason, CloseReason::Error(_)) {
                state.emit(ClientEvent::Error(error));
            }
            state.emit(ClientEvent::Close(reason.clone()));
            state.manual_close
        };
        info!(generation, reason = %reason.describe(), "rcon: disconnected");
        if !manual {
            self.schedule_reconnect();
        }
    }

    // =========================================================================
    // SHUTDOWN
    // =========================================================================

    /// Shared body of `close()` and `destroy()`.
    pub(super) fn shutdown(&self, destroy: bool) {
        let mut state = self.lock();
        if state.destroyed {
            return;
        }
        state.manual_close = true;
        state.reconnect.cancel();
        let had_socket = match state.socket.take() {
            Some(socket) => {
                socket.terminate();
                true
            }
            None => false,
        };
        state.connected = false;
        state.pending.reject_all(&ClientError::ConnectionClosed);
        state.scheme = self.config.transport.initial_scheme();
        state.auto_upgraded = false;
        if had_socket {
            state.emit(ClientEvent::Close(CloseReason::Manual));
        }
        if destroy {
            state.destroyed = true;
            state.events = None;
        }
        drop(state);
        if had_socket {
            info!(destroy, "rcon: closed");
        }
    }
}

fn describe_failure(failure: HandshakeFailure, url: String, error: TransportError) -> ClientError {
    match failure {
        HandshakeFailure::SchemeMismatch => ClientError::SchemeMismatch { url, message: error.0 },
        HandshakeFailure::TlsRejected | HandshakeFailure::TlsHint => ClientError::Tls { url, message: error.0 },
        HandshakeFailure::Unknown => ClientError::Transport(error.0),
    }
}
