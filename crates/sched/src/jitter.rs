// Copyright The HLS Swarm Authors
// SPDX-License-Identifier: Apache-2.0

//! Deterministic per-client jitter.
//!
//! The same `(seed, client_id, max)` triple always yields the same delay, so
//! a run can be replayed exactly by reusing its seed. Not cryptographically
//! strong; must not be used for anything security-relevant.

use hls_swarm_config::ClientId;
use rand::rngs::SmallRng;
use rand::{RngExt, SeedableRng};
use std::time::Duration;

/// Seedable source of per-client pseudo-random delays and factors.
#[derive(Debug, Clone, Copy)]
pub struct JitterSource {
    seed: u64,
}

/// SplitMix64 finalizer. Spreads low-entropy inputs (small client ids,
/// round duration values) over the full 64-bit space.
const fn mix(mut z: u64) -> u64 {
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

impl JitterSource {
    /// Creates a jitter source from a seed. A zero seed draws fresh entropy,
    /// making the run non-reproducible.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        let seed = if seed == 0 { rand::rng().random() } else { seed };
        Self { seed }
    }

    /// The effective seed, for logging reproducible-run instructions.
    #[must_use]
    pub const fn seed(&self) -> u64 {
        self.seed
    }

    /// A deterministic delay in `[0, max]` for the given client.
    #[must_use]
    pub fn client_jitter(&self, client_id: ClientId, max: Duration) -> Duration {
        if max.is_zero() {
            return Duration::ZERO;
        }
        let max_nanos = max.as_nanos().min(u128::from(u64::MAX)) as u64;
        let key = mix(self.seed ^ mix(client_id) ^ mix(max_nanos));
        let mut rng = SmallRng::seed_from_u64(key);
        Duration::from_nanos(rng.random_range(0..=max_nanos))
    }

    /// A deterministic multiplicative factor in `[1 - fraction, 1 + fraction]`
    /// for the given client and attempt, used by the backoff calculator.
    #[must_use]
    pub fn backoff_factor(&self, client_id: ClientId, attempt: u32, fraction: f64) -> f64 {
        if fraction <= 0.0 {
            return 1.0;
        }
        let key = mix(self.seed ^ mix(client_id) ^ mix(u64::from(attempt)).rotate_left(17));
        let mut rng = SmallRng::seed_from_u64(key);
        rng.random_range(1.0 - fraction..=1.0 + fraction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_triple_same_delay() {
        let source = JitterSource::new(42);
        let a = source.client_jitter(7, Duration::from_millis(500));
        let b = source.client_jitter(7, Duration::from_millis(500));
        assert_eq!(a, b);
    }

    #[test]
    fn test_different_clients_diverge() {
        let source = JitterSource::new(42);
        let delays: Vec<_> = (1..=32)
            .map(|id| source.client_jitter(id, Duration::from_secs(1)))
            .collect();
        let first = delays[0];
        assert!(delays.iter().any(|d| *d != first));
    }

    #[test]
    fn test_delay_within_bounds() {
        let source = JitterSource::new(1);
        let max = Duration::from_millis(250);
        for id in 1..=1000 {
            let d = source.client_jitter(id, max);
            assert!(d <= max, "client {id}: {d:?} above {max:?}");
        }
    }

    #[test]
    fn test_zero_max_is_zero() {
        let source = JitterSource::new(9);
        assert_eq!(source.client_jitter(3, Duration::ZERO), Duration::ZERO);
    }

    #[test]
    fn test_factor_within_bounds() {
        let source = JitterSource::new(5);
        for attempt in 0..64 {
            let f = source.backoff_factor(11, attempt, 0.2);
            assert!((0.8..=1.2).contains(&f), "attempt {attempt}: {f}");
        }
    }

    #[test]
    fn test_zero_fraction_is_unit() {
        let source = JitterSource::new(5);
        assert_eq!(source.backoff_factor(1, 0, 0.0), 1.0);
    }
}
