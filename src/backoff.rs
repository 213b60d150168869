//! Reconnection delay bookkeeping.
//!
//! The grown delay survives across attempts and resets to the floor on every
//! successful open. Scheme-flip retries never go through here; they wait the
//! fixed `scheme_flip_delay` inside the connect attempt that flipped.

use std::time::Duration;

use rand::Rng;

use crate::config::BackoffConfig;

/// Lower bound on any jittered delay, so jitter never yields a hot loop.
pub const MIN_RECONNECT_DELAY: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
pub(crate) struct Backoff {
    config: BackoffConfig,
    current: Duration,
}

impl Backoff {
    pub(crate) fn new(config: BackoffConfig) -> Self {
        Self { config, current: config.base }
    }

    pub(crate) fn current(&self) -> Duration {
        self.current
    }

    pub(crate) fn reset(&mut self) {
        self.current = self.config.base;
    }

    /// Grow after a failed reconnection attempt: `min(current * factor, max)`.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    pub(crate) fn grow(&mut self) {
        let grown_ms = (self.current.as_millis() as f64 * self.config.factor).round();
        let max_ms = self.config.max.as_millis() as f64;
        self.current = Duration::from_millis(grown_ms.min(max_ms) as u64);
    }

    /// Jittered delay for the next scheduled attempt.
    pub(crate) fn next_delay(&self) -> Duration {
        let sample = if self.config.jitter > 0.0 {
            rand::rng().random_range(-1.0..=1.0)
        } else {
            0.0
        };
        jittered(self.current, self.config.jitter, sample)
    }
}

/// `base ± base * ratio * sample`, floored at [`MIN_RECONNECT_DELAY`].
///
/// `sample` is expected in `-1.0..=1.0`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
pub(crate) fn jittered(base: Duration, ratio: f64, sample: f64) -> Duration {
    let base_ms = base.as_millis() as f64;
    let delay_ms = (base_ms + base_ms * ratio * sample.clamp(-1.0, 1.0)).round().max(0.0);
    Duration::from_millis(delay_ms as u64).max(MIN_RECONNECT_DELAY)
}

#[cfg(test)]
#[path = "backoff_test.rs"]
mod tests;
