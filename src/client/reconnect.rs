//! Reconnection scheduler.
//!
//! After an unexpected close, or a failed caller-initiated connect, exactly one
//! reconnection attempt is scheduled after the current backoff delay. A failed
//! attempt grows the backoff and schedules the next one; a successful open
//! resets it. `close()` and `destroy()` cancel any scheduled attempt.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::duration_ms;
use crate::event::ClientEvent;

use super::Inner;
use super::connection::ConnectOrigin;

/// Where the scheduler is in its cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReconnectPhase {
    #[default]
    Idle,
    /// Waiting out the backoff delay.
    Scheduled,
    /// Handshake in progress.
    Attempting,
}

#[derive(Default)]
pub(super) struct ReconnectState {
    phase: ReconnectPhase,
    /// Attempts since the last successful open.
    attempts: u32,
    timer: Option<JoinHandle<()>>,
}

impl ReconnectState {
    pub(super) fn phase(&self) -> ReconnectPhase {
        self.phase
    }

    pub(super) fn cancel(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.phase = ReconnectPhase::Idle;
        self.attempts = 0;
    }

    /// Called on open. A pending timer is moot once a caller reconnected; an
    /// attempt already running finishes on its own.
    pub(super) fn cancel_scheduled(&mut self) {
        match self.phase {
            ReconnectPhase::Scheduled => self.cancel(),
            ReconnectPhase::Idle => self.attempts = 0,
            ReconnectPhase::Attempting => {}
        }
    }
}

impl Inner {
    pub(super) fn schedule_reconnect(self: &Arc<Self>) {
        let mut state = self.lock();
        if state.manual_close || state.destroyed || state.connected {
            return;
        }
        if state.reconnect.phase != ReconnectPhase::Idle {
            return;
        }

        let delay = state.backoff.next_delay();
        state.reconnect.attempts += 1;
        let attempt = state.reconnect.attempts;
        state.reconnect.phase = ReconnectPhase::Scheduled;
        state.emit(ClientEvent::Reconnecting { attempt, delay });

        let inner = Arc::clone(self);
        state.reconnect.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            inner.attempt_reconnect(attempt).await;
        }));
        drop(state);
        info!(attempt, delay_ms = duration_ms(delay), "rcon: reconnect scheduled");
    }

    async fn attempt_reconnect(self: Arc<Self>, attempt: u32) {
        {
            let mut state = self.lock();
            if state.manual_close || state.destroyed || state.reconnect.phase != ReconnectPhase::Scheduled {
                return;
            }
            state.reconnect.phase = ReconnectPhase::Attempting;
        }

        match self.connect(ConnectOrigin::Scheduler).await {
            Ok(()) => {
                let still_open = {
                    let mut state = self.lock();
                    state.reconnect.phase = ReconnectPhase::Idle;
                    state.reconnect.attempts = 0;
                    state.reconnect.timer = None;
                    state.emit(ClientEvent::Reconnect { attempts: attempt });
                    state.connected
                };
                info!(attempt, "rcon: reconnected");
                // The new socket may already have dropped while this attempt
                // was still marked in progress.
                if !still_open {
                    self.schedule_reconnect();
                }
            }
            Err(error) => {
                {
                    let mut state = self.lock();
                    if state.reconnect.phase != ReconnectPhase::Attempting {
                        return;
                    }
                    state.backoff.grow();
                    state.reconnect.phase = ReconnectPhase::Idle;
                    state.reconnect.timer = None;
                }
                warn!(attempt, error = %error, "rcon: reconnect attempt failed");
                self.schedule_reconnect();
            }
        }
    }
}

#[cfg(test)]
#[path = "reconnect_test.rs"]
mod tests;
