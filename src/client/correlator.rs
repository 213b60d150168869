//! Command correlator: sequence ids, the pending-command table, and inbound
//! frame dispatch.
//!
//! Ids come from one counter that lives as long as the client, so they stay
//! unique across reconnects. A pending entry is settled exactly once: by its
//! reply, its timeout, or a connection-level rejection, whichever removes it
//! from the table first.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use frames::{Category, ChatMessage, Reply, Request};

use crate::config::duration_ms;
use crate::error::ClientError;
use crate::event::ClientEvent;
use crate::transport::Message;

use super::{CommandOptions, Inner};

type ReplySender = oneshot::Sender<Result<Reply, ClientError>>;

pub(super) struct PendingCommand {
    command: String,
    reply: ReplySender,
    timer: JoinHandle<()>,
}

impl PendingCommand {
    fn settle(self, result: Result<Reply, ClientError>) {
        self.timer.abort();
        // The caller may have given up on the future; nothing to do then.
        let _ = self.reply.send(result);
    }

    fn resolve(self, reply: Reply) {
        if reply.is_error() {
            let error = ClientError::Remote { command: self.command.clone(), message: reply.message };
            self.settle(Err(error));
        } else {
            self.settle(Ok(reply));
        }
    }
}

#[derive(Default)]
pub(super) struct PendingTable {
    last_id: i64,
    entries: HashMap<i64, PendingCommand>,
}

impl PendingTable {
    pub(super) fn len(&self) -> usize {
        self.entries.len()
    }

    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }

    fn take(&mut self, id: i64) -> Option<PendingCommand> {
        self.entries.remove(&id)
    }

    pub(super) fn reject_all(&mut self, error: &ClientError) {
        for (_, pending) in self.entries.drain() {
            pending.settle(Err(error.clone()));
        }
    }
}

impl Inner {
    // =========================================================================
    // OUTBOUND
    // =========================================================================

    pub(super) async fn command(self: &Arc<Self>, text: &str, options: CommandOptions) -> Result<Reply, ClientError> {
        self.ensure().await?;
        let timeout = options.timeout.unwrap_or(self.config.command_timeout);

        let receiver = {
            let mut state = self.lock();
            if state.destroyed {
                return Err(ClientError::Destroyed);
            }
            if state.pending.len() >= self.config.max_in_flight {
                return Err(ClientError::Capacity { limit: self.config.max_in_flight });
            }
            let Some(outbound) = state.socket.as_ref().map(|s| s.outbound.clone()) else {
                return Err(if state.manual_close {
                    ClientError::ConnectionClosed
                } else {
                    ClientError::ConnectionLost { reason: "socket closed before send".to_owned() }
                });
            };

            let id = state.pending.next_id();
            let frame = frames::encode_request(&Request::new(id, text))?;
            let (reply, receiver) = oneshot::channel();
            let timer = self.spawn_command_timer(id, timeout);
            state.pending.entries.insert(id, PendingCommand { command: text.to_owned(), reply, timer });

            if outbound.send(Message::Text(frame.into())).is_err() {
                if let Some(pending) = state.pending.take(id) {
                    pending.timer.abort();
                }
                return Err(ClientError::Send("socket writer stopped".to_owned()));
            }
            debug!(id, command = text, "rcon: command sent");
            receiver
        };

        receiver.await.unwrap_or(Err(ClientError::ConnectionClosed))
    }

    fn spawn_command_timer(self: &Arc<Self>, id: i64, timeout: Duration) -> JoinHandle<()> {
        let inner = Arc::downgrade(self);
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(inner) = inner.upgrade() {
                inner.expire_command(id, timeout);
            }
        })
    }

    fn expire_command(&self, id: i64, timeout: Duration) {
        let Some(pending) = self.lock().pending.take(id) else {
            return;
        };
        let elapsed_ms = duration_ms(timeout);
        warn!(id, command = %pending.command, elapsed_ms, "rcon: command timed out");
        let error = ClientError::Timeout { command: pending.command.clone(), elapsed_ms };
        // Running inside the timer task; don't abort it.
        let _ = pending.reply.send(Err(error));
    }

    // =========================================================================
    // INBOUND
    // =========================================================================

    /// Dispatch one inbound text frame.
    ///
    /// Every parsed frame is published as `Message`. A frame whose id matches a
    /// pending command settles that command; anything else is classified and
    /// published as chat, console, or a generic event.
    ///
    /// Replies to commands never reach `Chat`, `Console` or `Event`;
    /// subscribers see them only as `Message`.
    pub(super) fn handle_frame(&self, text: &str) {
        let reply = match frames::decode_reply(text) {
            Ok(reply) => reply,
            Err(error) => {
                debug!(error = %error, "rcon: unparsed inbound frame");
                self.lock().emit(ClientEvent::Raw(text.to_owned()));
                return;
            }
        };

        let mut state = self.lock();
        state.emit(ClientEvent::Message(reply.clone()));

        if let Some(pending) = reply.correlation_id().and_then(|id| state.pending.take(id)) {
            drop(state);
            pending.resolve(reply);
            return;
        }

        let event = match reply.category() {
            Category::Chat => ClientEvent::Chat(ChatMessage::from_reply(&reply)),
            Category::Console => ClientEvent::Console(reply),
            Category::Event => ClientEvent::Event(reply),
        };
        state.emit(event);
    }
}

#[cfg(test)]
#[path = "correlator_test.rs"]
mod tests;
