//! Liveness monitor for one open socket.
//!
//! Every `interval` a probe (WebSocket ping) goes out and a watchdog is armed.
//! A pong disarms it. If the watchdog fires first the socket is treated as
//! dead and dropped without a closing handshake, which hands control to the
//! reconnection scheduler. A zero interval disables the monitor.

use std::pin::Pin;

use tokio::time::{Instant, Interval, MissedTickBehavior, Sleep, interval_at, sleep};

use crate::config::HeartbeatConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum HeartbeatAction {
    /// Send a probe now.
    Probe,
    /// The last probe went unanswered.
    Expired,
}

pub(super) struct Heartbeat {
    config: HeartbeatConfig,
    ticker: Option<Interval>,
    watchdog: Option<Pin<Box<Sleep>>>,
}

impl Heartbeat {
    pub(super) fn new(config: HeartbeatConfig) -> Self {
        let ticker = config.is_enabled().then(|| {
            let mut ticker = interval_at(Instant::now() + config.interval, config.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });
        Self { config, ticker, watchdog: None }
    }

    pub(super) fn acknowledge(&mut self) {
        self.watchdog = None;
    }

    /// Wait for the next thing the I/O loop must do. Cancel-safe: the
    /// watchdog lives in `self`, and `Interval::tick` is cancel-safe.
    pub(super) async fn next_action(&mut self) -> HeartbeatAction {
        let Some(ticker) = self.ticker.as_mut() else {
            return std::future::pending().await;
        };

        let expired = match self.watchdog.as_mut() {
            Some(watchdog) => tokio::select! {
                () = watchdog.as_mut() => true,
                _ = ticker.tick() => false,
            },
            None => {
                ticker.tick().await;
                false
            }
        };

        if expired {
            self.watchdog = None;
            return HeartbeatAction::Expired;
        }
        // An armed watchdog keeps its earlier deadline.
        if self.watchdog.is_none() {
            self.watchdog = Some(Box::pin(sleep(self.config.timeout)));
        }
        HeartbeatAction::Probe
    }
}

#[cfg(test)]
#[path = "heartbeat_test.rs"]
mod tests;
