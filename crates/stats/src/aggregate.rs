// Copyright The HLS Swarm Authors
// SPDX-License-Identifier: Apache-2.0

//! Fleet-wide aggregation.
//!
//! The aggregator keeps weak references to per-client stats; clients are
//! registered at start and removed explicitly, and anything that died
//! in between is pruned during the next scan. `aggregate()` is called by
//! metrics consumers at any frequency: it is O(clients) per call and never
//! blocks a writer.

use crate::client::{ClientSnapshot, ClientStats, CounterSample, HTTP_ERROR_BUCKETS};
use crate::client::DRIFT_THRESHOLD;
use crate::latency::LatencyReservoir;
use crate::store_max_f64;
use arc_swap::ArcSwapOption;
use hls_swarm_config::ClientId;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

/// An immutable fleet-wide snapshot.
#[derive(Debug, Clone)]
pub struct AggregatedStats {
    /// Time since the aggregator was created, at snapshot time.
    pub taken_at: Duration,
    /// Registered clients, live or not.
    pub total_clients: usize,
    /// Clients whose stats were still alive during the scan.
    pub active_clients: usize,
    /// Fleet-wide counter sums.
    pub counters: CounterSample,
    /// Non-empty HTTP error buckets as `(status, count)`; the catch-all
    /// bucket is reported under status 0.
    pub http_errors_by_code: Vec<(u16, u64)>,
    /// Merged segment wall-time percentiles.
    pub segment_wall_p50: Duration,
    /// 75th percentile of segment wall time.
    pub segment_wall_p75: Duration,
    /// 90th percentile of segment wall time.
    pub segment_wall_p90: Duration,
    /// 99th percentile of segment wall time.
    pub segment_wall_p99: Duration,
    /// Clients currently stalled.
    pub stalled_clients: usize,
    /// Clients whose current drift exceeds the drift threshold.
    pub drifting_clients: usize,
    /// Clients running at or above realtime speed.
    pub above_realtime: usize,
    /// Clients running below realtime speed (but with progress data).
    pub below_realtime: usize,
    /// Bytes per second averaged over the whole run.
    pub bytes_per_second_run: f64,
    /// Bytes per second since the previous snapshot, when one exists.
    pub bytes_per_second_instant: f64,
    /// Segment requests per second since the previous snapshot.
    pub segments_per_second_instant: f64,
    /// Dropped events as a fraction of lines read, fleet-wide.
    pub drop_rate: f64,
    /// Largest drop rate any snapshot has observed.
    pub peak_drop_rate: f64,
    /// True when the drop rate exceeds the configured threshold; metrics
    /// are still reported but understate the fleet.
    pub metrics_degraded: bool,
}

/// Snapshot-on-demand merge of all per-client stats.
pub struct Aggregator {
    registry: RwLock<HashMap<ClientId, Weak<ClientStats>>>,
    previous: ArcSwapOption<AggregatedStats>,
    started_at: Instant,
    peak_drop_rate_bits: AtomicU64,
    degraded_threshold: f64,
}

impl Aggregator {
    /// Creates an empty aggregator. `degraded_threshold` is the fleet drop
    /// rate above which snapshots raise the degraded flag.
    #[must_use]
    pub fn new(degraded_threshold: f64) -> Self {
        Self {
            registry: RwLock::new(HashMap::new()),
            previous: ArcSwapOption::empty(),
            started_at: Instant::now(),
            peak_drop_rate_bits: AtomicU64::new(0.0f64.to_bits()),
            degraded_threshold,
        }
    }

    /// Registers a client's stats.
    pub fn add(&self, stats: &Arc<ClientStats>) {
        let _ = self
            .registry
            .write()
            .insert(stats.client_id(), Arc::downgrade(stats));
    }

    /// Removes a client's stats from the registry.
    pub fn remove(&self, client_id: ClientId) {
        let _ = self.registry.write().remove(&client_id);
    }

    /// Number of registered clients.
    #[must_use]
    pub fn len(&self) -> usize {
        self.registry.read().len()
    }

    /// True when no clients are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registry.read().is_empty()
    }

    /// A snapshot of one client, or `None` for unknown or dead ids.
    #[must_use]
    pub fn client_snapshot(&self, client_id: ClientId) -> Option<ClientSnapshot> {
        self.registry
            .read()
            .get(&client_id)
            .and_then(Weak::upgrade)
            .map(|stats| stats.snapshot())
    }

    /// The largest drop rate any snapshot has observed.
    #[must_use]
    pub fn peak_drop_rate(&self) -> f64 {
        f64::from_bits(self.peak_drop_rate_bits.load(Ordering::Relaxed))
    }

    /// Takes a consistent-enough snapshot of the fleet.
    ///
    /// Counter sums come from relaxed atomic loads under the registry read
    /// lock; percentiles come from an exact merge of the per-client
    /// reservoirs; instantaneous rates are computed against the previous
    /// snapshot, which is then replaced.
    pub fn aggregate(&self) -> Arc<AggregatedStats> {
        let taken_at = self.started_at.elapsed();

        let (live, dead, total_clients) = {
            let registry = self.registry.read();
            let mut live = Vec::with_capacity(registry.len());
            let mut dead = Vec::new();
            for (id, weak) in registry.iter() {
                match weak.upgrade() {
                    Some(stats) => live.push(stats),
                    None => dead.push(*id),
                }
            }
            (live, dead, registry.len())
        };
        if !dead.is_empty() {
            let mut registry = self.registry.write();
            for id in dead {
                if registry.get(&id).is_some_and(|w| w.upgrade().is_none()) {
                    let _ = registry.remove(&id);
                }
            }
        }

        let mut counters = CounterSample::default();
        let mut buckets = [0u64; HTTP_ERROR_BUCKETS];
        let mut merged = LatencyReservoir::merge_target();
        let mut stalled_clients = 0;
        let mut drifting_clients = 0;
        let mut above_realtime = 0;
        let mut below_realtime = 0;

        for stats in &live {
            counters.accumulate(&stats.counters());
            stats.merge_http_errors(&mut buckets);
            stats.latency().merge_into(&mut merged);

            if stats.is_stalled() {
                stalled_clients += 1;
            }
            if stats.current_drift() > DRIFT_THRESHOLD {
                drifting_clients += 1;
            }
            let speed = stats.speed();
            if speed >= 1.0 {
                above_realtime += 1;
            } else if speed > 0.0 {
                below_realtime += 1;
            }
        }

        let http_errors_by_code = buckets
            .iter()
            .enumerate()
            .filter(|(_, count)| **count > 0)
            .map(|(i, count)| {
                let code = if i < 200 { 400 + i as u16 } else { 0 };
                (code, *count)
            })
            .collect();

        let previous = self.previous.load_full();
        let (bytes_per_second_instant, segments_per_second_instant) = match previous.as_deref() {
            Some(prev) if taken_at > prev.taken_at => {
                let dt = (taken_at - prev.taken_at).as_secs_f64();
                (
                    counters.total_bytes.saturating_sub(prev.counters.total_bytes) as f64 / dt,
                    counters
                        .segment_requests
                        .saturating_sub(prev.counters.segment_requests) as f64
                        / dt,
                )
            }
            _ => (0.0, 0.0),
        };

        let run_secs = taken_at.as_secs_f64();
        let bytes_per_second_run = if run_secs > 0.0 {
            counters.total_bytes as f64 / run_secs
        } else {
            0.0
        };

        let lines_read = counters.progress_lines_read + counters.stderr_lines_read;
        let dropped = counters.progress_updates_dropped + counters.stderr_events_dropped;
        let drop_rate = if lines_read > 0 {
            dropped as f64 / lines_read as f64
        } else {
            0.0
        };
        store_max_f64(&self.peak_drop_rate_bits, drop_rate);

        let snapshot = Arc::new(AggregatedStats {
            taken_at,
            total_clients,
            active_clients: live.len(),
            counters,
            http_errors_by_code,
            segment_wall_p50: Duration::from_micros(quantile_or_zero(&merged, 0.50)),
            segment_wall_p75: Duration::from_micros(quantile_or_zero(&merged, 0.75)),
            segment_wall_p90: Duration::from_micros(quantile_or_zero(&merged, 0.90)),
            segment_wall_p99: Duration::from_micros(quantile_or_zero(&merged, 0.99)),
            stalled_clients,
            drifting_clients,
            above_realtime,
            below_realtime,
            bytes_per_second_run,
            bytes_per_second_instant,
            segments_per_second_instant,
            drop_rate,
            peak_drop_rate: self.peak_drop_rate(),
            metrics_degraded: drop_rate > self.degraded_threshold,
        });

        self.previous.store(Some(snapshot.clone()));
        snapshot
    }
}

fn quantile_or_zero(hist: &hdrhistogram::Histogram<u64>, q: f64) -> u64 {
    if hist.is_empty() {
        0
    } else {
        hist.value_at_quantile(q)
    }
}

impl CounterSample {
    /// Adds `other`'s counters into `self`.
    pub fn accumulate(&mut self, other: &Self) {
        self.manifest_requests += other.manifest_requests;
        self.segment_requests += other.segment_requests;
        self.init_requests += other.init_requests;
        self.unknown_requests += other.unknown_requests;
        self.reconnections += other.reconnections;
        self.timeouts += other.timeouts;
        self.sequence_skips += other.sequence_skips;
        self.segments_expired += other.segments_expired;
        self.parse_errors += other.parse_errors;
        self.progress_lines_read += other.progress_lines_read;
        self.progress_updates_dropped += other.progress_updates_dropped;
        self.stderr_lines_read += other.stderr_lines_read;
        self.stderr_events_dropped += other.stderr_events_dropped;
        self.http_errors += other.http_errors;
        self.total_bytes += other.total_bytes;
        self.process_starts += other.process_starts;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hls_swarm_config::StatsConfig;
    use hls_swarm_parser::{ProgressState, ProgressUpdate};

    fn client(id: ClientId) -> Arc<ClientStats> {
        Arc::new(ClientStats::new(id, &StatsConfig::default()))
    }

    fn progress(total_size: u64, speed: f64) -> ProgressUpdate {
        ProgressUpdate {
            frame: 0,
            fps: 0.0,
            bitrate_kbps: 0.0,
            total_size,
            out_time_us: 0,
            speed,
            state: ProgressState::Continue,
        }
    }

    #[test]
    fn test_sums_across_clients() {
        let aggregator = Aggregator::new(0.01);
        let a = client(1);
        let b = client(2);
        aggregator.add(&a);
        aggregator.add(&b);

        a.apply_progress(&progress(1000, 1.0));
        b.apply_progress(&progress(500, 1.2));
        a.record_http_error(404);
        b.record_http_error(404);

        let snap = aggregator.aggregate();
        assert_eq!(snap.total_clients, 2);
        assert_eq!(snap.active_clients, 2);
        assert_eq!(snap.counters.total_bytes, 1500);
        assert_eq!(snap.http_errors_by_code, vec![(404, 2)]);
        assert_eq!(snap.above_realtime, 2);
        assert!(!snap.metrics_degraded);
    }

    #[test]
    fn test_dead_clients_are_pruned() {
        let aggregator = Aggregator::new(0.01);
        let a = client(1);
        aggregator.add(&a);
        assert_eq!(aggregator.len(), 1);

        drop(a);
        let snap = aggregator.aggregate();
        assert_eq!(snap.active_clients, 0);
        assert_eq!(aggregator.len(), 0);
        assert!(aggregator.client_snapshot(1).is_none());
    }

    #[test]
    fn test_unknown_client_snapshot_is_none() {
        let aggregator = Aggregator::new(0.01);
        assert!(aggregator.client_snapshot(99).is_none());
    }

    #[test]
    fn test_explicit_remove() {
        let aggregator = Aggregator::new(0.01);
        let a = client(1);
        aggregator.add(&a);
        aggregator.remove(1);
        assert!(aggregator.is_empty());
        assert!(aggregator.client_snapshot(1).is_none());
        // The stats object itself is unaffected by deregistration.
        a.note_progress_line();
        assert_eq!(a.counters().progress_lines_read, 1);
    }

    #[test]
    fn test_degraded_flag_and_peak_rate() {
        let aggregator = Aggregator::new(0.01);
        let a = client(1);
        aggregator.add(&a);

        for _ in 0..90 {
            a.note_progress_line();
        }
        for _ in 0..10 {
            a.note_progress_dropped();
        }

        let snap = aggregator.aggregate();
        assert!(snap.drop_rate > 0.01);
        assert!(snap.metrics_degraded);
        assert!(snap.peak_drop_rate >= snap.drop_rate);

        // Recovery keeps the peak.
        for _ in 0..10_000 {
            a.note_progress_line();
        }
        let snap2 = aggregator.aggregate();
        assert!(snap2.drop_rate < 0.01);
        assert!(!snap2.metrics_degraded);
        assert!(snap2.peak_drop_rate >= snap.drop_rate);
    }

    #[test]
    fn test_instant_rates_use_previous_snapshot() {
        let aggregator = Aggregator::new(0.01);
        let a = client(1);
        aggregator.add(&a);

        a.apply_progress(&progress(1000, 1.0));
        let first = aggregator.aggregate();
        assert_eq!(first.bytes_per_second_instant, 0.0);

        std::thread::sleep(Duration::from_millis(20));
        a.apply_progress(&progress(3000, 1.0));
        let second = aggregator.aggregate();
        assert!(second.bytes_per_second_instant > 0.0);
    }

    #[test]
    fn test_latency_percentiles_merge() {
        let aggregator = Aggregator::new(0.01);
        let a = client(1);
        let b = client(2);
        aggregator.add(&a);
        aggregator.add(&b);

        a.latency().record(Duration::from_millis(100));
        b.latency().record(Duration::from_millis(300));

        let snap = aggregator.aggregate();
        assert!(snap.segment_wall_p50 >= Duration::from_millis(99));
        assert!(snap.segment_wall_p99 >= Duration::from_millis(299));
    }
}
