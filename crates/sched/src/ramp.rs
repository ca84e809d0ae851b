// Copyright The HLS Swarm Authors
// SPDX-License-Identifier: Apache-2.0

//! Paced client starts.

use crate::jitter::JitterSource;
use hls_swarm_config::{ClientId, RampConfig};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Paces client starts at a target rate with per-client jitter.
#[derive(Debug, Clone)]
pub struct RampScheduler {
    rate: f64,
    max_jitter: Duration,
    jitter: JitterSource,
}

impl RampScheduler {
    /// Creates a scheduler from the ramp configuration and the shared jitter
    /// source.
    #[must_use]
    pub fn new(config: &RampConfig, jitter: JitterSource) -> Self {
        Self {
            rate: config.rate,
            max_jitter: config.max_jitter,
            jitter,
        }
    }

    /// The delay applied before starting `client_id`. Zero or negative rates
    /// disable the base delay entirely.
    #[must_use]
    pub fn start_delay(&self, client_id: ClientId) -> Duration {
        let base = if self.rate > 0.0 {
            Duration::from_secs_f64(1.0 / self.rate)
        } else {
            Duration::ZERO
        };
        base + self.jitter.client_jitter(client_id, self.max_jitter)
    }

    /// Waits for the client's slot in the ramp. Returns `false` promptly if
    /// the token is cancelled first, `true` once the delay has elapsed.
    pub async fn schedule(&self, cancel: &CancellationToken, client_id: ClientId) -> bool {
        let delay = self.start_delay(client_id);
        if delay.is_zero() {
            return !cancel.is_cancelled();
        }
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    /// Expected wall time to bring `n` clients online:
    /// `n/rate + max_jitter/2` for a positive rate, zero otherwise.
    #[must_use]
    pub fn estimated_ramp_duration(&self, n: u64) -> Duration {
        if self.rate <= 0.0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(n as f64 / self.rate) + self.max_jitter / 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheduler(rate: f64, max_jitter: Duration) -> RampScheduler {
        RampScheduler::new(
            &RampConfig {
                rate,
                max_jitter,
                seed: 1,
            },
            JitterSource::new(1),
        )
    }

    #[test]
    fn test_zero_rate_has_no_base_delay() {
        let s = scheduler(0.0, Duration::ZERO);
        assert_eq!(s.start_delay(1), Duration::ZERO);
        assert_eq!(s.estimated_ramp_duration(100), Duration::ZERO);
    }

    #[test]
    fn test_negative_rate_is_treated_as_unpaced() {
        let s = scheduler(-3.0, Duration::ZERO);
        assert_eq!(s.start_delay(1), Duration::ZERO);
    }

    #[test]
    fn test_estimated_ramp_duration() {
        let s = scheduler(5.0, Duration::from_millis(100));
        assert_eq!(
            s.estimated_ramp_duration(10),
            Duration::from_secs(2) + Duration::from_millis(50)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_elapses_base_delay() {
        let s = scheduler(10.0, Duration::ZERO);
        let cancel = CancellationToken::new();
        let before = tokio::time::Instant::now();
        assert!(s.schedule(&cancel, 1).await);
        assert_eq!(before.elapsed(), Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_returns_promptly_on_cancel() {
        let s = scheduler(0.001, Duration::ZERO);
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(!s.schedule(&cancel, 1).await);
    }

    #[tokio::test]
    async fn test_schedule_zero_rate_returns_immediately() {
        let s = scheduler(0.0, Duration::ZERO);
        let cancel = CancellationToken::new();
        assert!(s.schedule(&cancel, 1).await);
    }
}
