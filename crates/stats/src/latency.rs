// Copyright The HLS Swarm Authors
// SPDX-License-Identifier: Apache-2.0

//! Segment wall-time reservoir.
//!
//! A constant-memory streaming quantile structure (HDR histogram at three
//! significant figures, microsecond resolution). Insertions take the
//! reservoir's own mutex and nothing else; the aggregator merges reservoirs
//! exactly with `Histogram::add` and reports the 50/75/90/99 percentiles.

use hdrhistogram::Histogram;
use parking_lot::Mutex;
use std::time::Duration;

/// Highest wall time the reservoir distinguishes; larger values saturate.
const MAX_WALL_TIME_US: u64 = 10 * 60 * 1_000_000;

/// Constructs the backing histogram. The bounds are compile-time constants,
/// so construction cannot fail at runtime.
#[allow(clippy::expect_used)]
fn backing_histogram() -> Histogram<u64> {
    Histogram::new_with_bounds(1, MAX_WALL_TIME_US, 3).expect("static histogram bounds")
}

/// Streaming quantile reservoir for segment wall times.
pub struct LatencyReservoir {
    hist: Mutex<Histogram<u64>>,
}

impl Default for LatencyReservoir {
    fn default() -> Self {
        Self::new()
    }
}

impl LatencyReservoir {
    /// Creates an empty reservoir.
    #[must_use]
    pub fn new() -> Self {
        Self {
            hist: Mutex::new(backing_histogram()),
        }
    }

    /// Records one wall time. Sub-microsecond values count as one
    /// microsecond; values beyond ten minutes saturate.
    pub fn record(&self, wall_time: Duration) {
        let micros = (wall_time.as_micros().min(u128::from(u64::MAX)) as u64).max(1);
        self.hist.lock().saturating_record(micros);
    }

    /// The value at quantile `q` in `[0, 1]`, or zero when empty.
    #[must_use]
    pub fn quantile(&self, q: f64) -> Duration {
        let hist = self.hist.lock();
        if hist.is_empty() {
            return Duration::ZERO;
        }
        Duration::from_micros(hist.value_at_quantile(q))
    }

    /// Number of recorded samples.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.hist.lock().len()
    }

    /// Adds this reservoir's samples into `target` (exact merge).
    pub fn merge_into(&self, target: &mut Histogram<u64>) {
        let hist = self.hist.lock();
        // Identical bounds on both sides, so add cannot fail; drop the
        // result rather than poisoning the aggregation over one reservoir.
        if target.add(&*hist).is_err() {
            tracing::debug!("latency reservoir merge failed");
        }
    }

    /// An empty histogram with this reservoir's bounds, for merging.
    #[must_use]
    pub fn merge_target() -> Histogram<u64> {
        backing_histogram()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_reservoir_reads_zero() {
        let r = LatencyReservoir::new();
        assert_eq!(r.quantile(0.5), Duration::ZERO);
        assert_eq!(r.count(), 0);
    }

    #[test]
    fn test_quantiles_are_ordered() {
        let r = LatencyReservoir::new();
        for ms in 1..=1000u64 {
            r.record(Duration::from_millis(ms));
        }
        let p50 = r.quantile(0.50);
        let p90 = r.quantile(0.90);
        let p99 = r.quantile(0.99);
        assert!(p50 <= p90 && p90 <= p99);
        assert!(p50 >= Duration::from_millis(490) && p50 <= Duration::from_millis(510));
    }

    #[test]
    fn test_merge_combines_counts() {
        let a = LatencyReservoir::new();
        let b = LatencyReservoir::new();
        a.record(Duration::from_millis(10));
        b.record(Duration::from_millis(20));

        let mut target = LatencyReservoir::merge_target();
        a.merge_into(&mut target);
        b.merge_into(&mut target);
        assert_eq!(target.len(), 2);
    }

    #[test]
    fn test_oversized_sample_saturates() {
        let r = LatencyReservoir::new();
        r.record(Duration::from_secs(3600));
        assert_eq!(r.count(), 1);
    }
}
