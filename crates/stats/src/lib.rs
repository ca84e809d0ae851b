// Copyright The HLS Swarm Authors
// SPDX-License-Identifier: Apache-2.0

//! Per-client statistics and fleet aggregation.
//!
//! [`client::ClientStats`] is a bundle of independent atomics written by one
//! supervisor's callbacks and read by any number of observers; readers may
//! see transiently mixed multi-field views (speed vs. stall timer, the drift
//! triple), which is acceptable for a dashboard and for derived health
//! signals. Consumers that need cross-field consistency call
//! [`aggregate::Aggregator::aggregate`], which produces an immutable
//! snapshot.

pub mod aggregate;
pub mod client;
pub mod latency;
pub mod ring;

pub use aggregate::{AggregatedStats, Aggregator};
pub use client::{ClientSnapshot, ClientStats, CounterSample};
pub use latency::LatencyReservoir;
pub use ring::SegmentSizeRing;

use std::sync::atomic::{AtomicU64, Ordering};

/// Raises `slot` (an `f64` bit pattern) to `value` if larger, via a CAS
/// loop; the stored value is monotone non-decreasing.
pub(crate) fn store_max_f64(slot: &AtomicU64, value: f64) {
    let mut current = slot.load(Ordering::Relaxed);
    loop {
        if f64::from_bits(current) >= value {
            return;
        }
        match slot.compare_exchange_weak(
            current,
            value.to_bits(),
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => return,
            Err(observed) => current = observed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_max_f64_is_monotone() {
        let slot = AtomicU64::new(0.0f64.to_bits());
        store_max_f64(&slot, 0.5);
        store_max_f64(&slot, 0.2);
        assert_eq!(f64::from_bits(slot.load(Ordering::Relaxed)), 0.5);
        store_max_f64(&slot, 0.9);
        assert_eq!(f64::from_bits(slot.load(Ordering::Relaxed)), 0.9);
    }
}
