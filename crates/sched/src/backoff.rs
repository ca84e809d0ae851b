// Copyright The HLS Swarm Authors
// SPDX-License-Identifier: Apache-2.0

//! Capped exponential backoff with deterministic jitter.

use crate::error::Error;
use crate::jitter::JitterSource;
use hls_swarm_config::{BackoffConfig, ClientId};
use std::time::Duration;

/// Per-client backoff state.
///
/// The attempt counter drives the exponential delay and resets after a
/// stable run; the restart counter is monotone and enforces the cap.
#[derive(Debug)]
pub struct BackoffState {
    config: BackoffConfig,
    jitter: JitterSource,
    client_id: ClientId,
    attempt: u32,
    restarts: u32,
}

impl BackoffState {
    /// Creates fresh backoff state for one client.
    #[must_use]
    pub fn new(config: BackoffConfig, jitter: JitterSource, client_id: ClientId) -> Self {
        Self {
            config,
            jitter,
            client_id,
            attempt: 0,
            restarts: 0,
        }
    }

    /// The unjittered delay for attempt `k`: `min(max, initial · multiplier^k)`.
    #[must_use]
    pub fn base_delay(&self, attempt: u32) -> Duration {
        if self.config.initial.is_zero() {
            return Duration::ZERO;
        }
        let max_secs = self.config.max.as_secs_f64();
        let raw = self.config.initial.as_secs_f64() * self.config.multiplier.powi(attempt as i32);
        Duration::from_secs_f64(raw.min(max_secs))
    }

    /// Returns the delay before the next restart and advances both counters,
    /// or fails once the restart cap is crossed (a cap of zero is unlimited).
    pub fn next_delay(&mut self) -> Result<Duration, Error> {
        if self.config.max_restarts > 0 && self.restarts >= self.config.max_restarts {
            return Err(Error::MaxRestartsExceeded {
                client_id: self.client_id,
                cap: self.config.max_restarts,
                restarts: self.restarts,
            });
        }

        let base = self.base_delay(self.attempt);
        let factor =
            self.jitter
                .backoff_factor(self.client_id, self.attempt, self.config.jitter_fraction);
        let delay = base.mul_f64(factor);

        self.attempt = self.attempt.saturating_add(1);
        self.restarts = self.restarts.saturating_add(1);
        Ok(delay)
    }

    /// Records a clean child exit. An uptime at or above the stability window
    /// (`initial × multiplier`) resets the attempt counter to zero; the
    /// restart counter is never reset.
    pub fn record_success(&mut self, uptime: Duration) {
        if uptime >= self.config.stability_window() {
            self.attempt = 0;
        }
    }

    /// The attempt the next delay will be computed from.
    #[must_use]
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Total restarts performed for this client slot.
    #[must_use]
    pub const fn restarts(&self) -> u32 {
        self.restarts
    }
}
