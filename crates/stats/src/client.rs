// Copyright The HLS Swarm Authors
// SPDX-License-Identifier: Apache-2.0

//! Per-client statistics.
//!
//! One instance per client slot, owned by the manager, written by that
//! client's supervisor callbacks and read concurrently by the aggregator
//! and fleet queries. Every scalar is an independent atomic; the latency
//! reservoir has its own mutex; the segment ring is lock-free.

use crate::latency::LatencyReservoir;
use crate::ring::SegmentSizeRing;
use crate::store_max_f64;
use hls_swarm_config::{ClientId, StatsConfig, UrlKind};
use hls_swarm_parser::{DebugEvent, ProgressUpdate};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Number of HTTP error buckets: one per status in `[400, 599]` plus a
/// final "other" slot.
pub const HTTP_ERROR_BUCKETS: usize = 201;

/// Index of the "other" bucket.
const HTTP_OTHER_BUCKET: usize = 200;

/// Drift beyond which a client counts as drifting in health summaries.
pub const DRIFT_THRESHOLD: Duration = Duration::from_secs(1);

/// Statistics for one client slot.
pub struct ClientStats {
    client_id: ClientId,
    started_at: Instant,
    stall_threshold: f64,
    stall_duration: Duration,

    manifest_requests: AtomicU64,
    segment_requests: AtomicU64,
    init_requests: AtomicU64,
    unknown_requests: AtomicU64,
    reconnections: AtomicU64,
    timeouts: AtomicU64,
    sequence_skips: AtomicU64,
    segments_expired: AtomicU64,
    parse_errors: AtomicU64,

    progress_lines_read: AtomicU64,
    progress_updates_dropped: AtomicU64,
    stderr_lines_read: AtomicU64,
    stderr_events_dropped: AtomicU64,

    http_errors: [AtomicU64; HTTP_ERROR_BUCKETS],

    /// Bytes accumulated by child processes that have since exited.
    bytes_previous_runs: AtomicU64,
    /// The live child's cumulative byte counter; resets on restart.
    bytes_current: AtomicU64,

    process_starts: AtomicU64,
    /// Elapsed nanoseconds (since `started_at`) at the current run's start.
    run_start_ns: AtomicU64,

    /// Playback speed as an `f64` bit pattern.
    speed_bits: AtomicU64,
    /// Elapsed nanoseconds when speed entered `(0, stall_threshold)`;
    /// zero while unarmed.
    below_threshold_since_ns: AtomicU64,

    last_playback_ns: AtomicI64,
    current_drift_ns: AtomicI64,
    max_drift_ns: AtomicI64,

    peak_drop_rate_bits: AtomicU64,

    segment_ring: SegmentSizeRing,
    latency: LatencyReservoir,
}

/// Raw counter values sampled at one point in time.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CounterSample {
    /// Manifest requests observed.
    pub manifest_requests: u64,
    /// Segment requests observed.
    pub segment_requests: u64,
    /// Init-segment requests observed.
    pub init_requests: u64,
    /// Requests of unknown kind.
    pub unknown_requests: u64,
    /// Reconnect notices.
    pub reconnections: u64,
    /// Timeout notices.
    pub timeouts: u64,
    /// Media-sequence gaps detected.
    pub sequence_skips: u64,
    /// Segment opens expired without a close.
    pub segments_expired: u64,
    /// Stderr lines that failed the line classifier.
    pub parse_errors: u64,
    /// Lines consumed from the progress pipe.
    pub progress_lines_read: u64,
    /// Progress updates dropped by backpressure.
    pub progress_updates_dropped: u64,
    /// Lines consumed from stderr.
    pub stderr_lines_read: u64,
    /// Debug events dropped by backpressure.
    pub stderr_events_dropped: u64,
    /// HTTP 4xx/5xx responses across all buckets.
    pub http_errors: u64,
    /// Bytes fetched across all runs of this slot.
    pub total_bytes: u64,
    /// Child processes started for this slot.
    pub process_starts: u64,
}

/// A point-in-time view of one client, for fleet queries.
#[derive(Debug, Clone, Copy)]
pub struct ClientSnapshot {
    /// The client this snapshot describes.
    pub client_id: ClientId,
    /// Raw counters.
    pub counters: CounterSample,
    /// Last reported playback speed.
    pub speed: f64,
    /// Whether the stall detector currently reports a stall.
    pub stalled: bool,
    /// Last playback position reported by the current run's child.
    pub last_playback: Duration,
    /// Wall time minus playback time for the current run.
    pub current_drift: Duration,
    /// Largest drift seen so far.
    pub max_drift: Duration,
    /// Mean of recent segment sizes, when any were seen.
    pub avg_segment_size: Option<f64>,
    /// Median segment wall time.
    pub segment_wall_p50: Duration,
    /// Tail segment wall time.
    pub segment_wall_p99: Duration,
}

impl ClientStats {
    /// Creates statistics for one client slot.
    #[must_use]
    pub fn new(client_id: ClientId, config: &StatsConfig) -> Self {
        Self {
            client_id,
            started_at: Instant::now(),
            stall_threshold: config.stall_threshold,
            stall_duration: config.stall_duration,
            manifest_requests: AtomicU64::new(0),
            segment_requests: AtomicU64::new(0),
            init_requests: AtomicU64::new(0),
            unknown_requests: AtomicU64::new(0),
            reconnections: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
            sequence_skips: AtomicU64::new(0),
            segments_expired: AtomicU64::new(0),
            parse_errors: AtomicU64::new(0),
            progress_lines_read: AtomicU64::new(0),
            progress_updates_dropped: AtomicU64::new(0),
            stderr_lines_read: AtomicU64::new(0),
            stderr_events_dropped: AtomicU64::new(0),
            http_errors: std::array::from_fn(|_| AtomicU64::new(0)),
            bytes_previous_runs: AtomicU64::new(0),
            bytes_current: AtomicU64::new(0),
            process_starts: AtomicU64::new(0),
            run_start_ns: AtomicU64::new(0),
            speed_bits: AtomicU64::new(0.0f64.to_bits()),
            below_threshold_since_ns: AtomicU64::new(0),
            last_playback_ns: AtomicI64::new(0),
            current_drift_ns: AtomicI64::new(0),
            max_drift_ns: AtomicI64::new(0),
            peak_drop_rate_bits: AtomicU64::new(0.0f64.to_bits()),
            segment_ring: SegmentSizeRing::new(config.segment_ring_capacity),
            latency: LatencyReservoir::new(),
        }
    }

    /// The client this object belongs to.
    #[must_use]
    pub const fn client_id(&self) -> ClientId {
        self.client_id
    }

    fn elapsed_ns(&self) -> u64 {
        self.started_at.elapsed().as_nanos().min(u128::from(u64::MAX)) as u64
    }

    /// Rolls byte accounting over to a fresh child process. The child's
    /// cumulative counter restarts at zero, so the previous run's total
    /// moves into the previous-runs accumulator; `total_bytes` stays
    /// monotone. Speed, the stall timer and the drift baseline reset with
    /// the new run; `max_drift` is kept.
    pub fn on_process_start(&self) {
        let _ = self.process_starts.fetch_add(1, Ordering::Relaxed);
        let finished_run = self.bytes_current.swap(0, Ordering::AcqRel);
        let _ = self
            .bytes_previous_runs
            .fetch_add(finished_run, Ordering::AcqRel);
        self.run_start_ns.store(self.elapsed_ns(), Ordering::Relaxed);
        self.speed_bits.store(0.0f64.to_bits(), Ordering::Relaxed);
        self.below_threshold_since_ns.store(0, Ordering::Relaxed);
        self.last_playback_ns.store(0, Ordering::Relaxed);
        self.current_drift_ns.store(0, Ordering::Relaxed);
    }

    /// Applies one parsed progress block.
    pub fn apply_progress(&self, update: &ProgressUpdate) {
        self.bytes_current.store(update.total_size, Ordering::Relaxed);
        self.update_speed(update.speed);
        if update.out_time_us > 0 {
            self.update_drift(update.out_time_us);
        }
    }

    fn update_speed(&self, speed: f64) {
        let old = f64::from_bits(self.speed_bits.swap(speed.to_bits(), Ordering::Relaxed));
        let in_band = |s: f64| s > 0.0 && s < self.stall_threshold;
        if in_band(speed) {
            // Arm on the crossing from at-or-above the threshold into the
            // band; re-entries while already armed keep the original time.
            if old >= self.stall_threshold
                && self.below_threshold_since_ns.load(Ordering::Relaxed) == 0
            {
                self.below_threshold_since_ns
                    .store(self.elapsed_ns().max(1), Ordering::Relaxed);
            }
        } else {
            self.below_threshold_since_ns.store(0, Ordering::Relaxed);
        }
    }

    fn update_drift(&self, out_time_us: i64) {
        let playback_ns = out_time_us.saturating_mul(1_000);
        let run_elapsed =
            self.elapsed_ns().saturating_sub(self.run_start_ns.load(Ordering::Relaxed));
        let drift = run_elapsed.min(i64::MAX as u64) as i64 - playback_ns;
        self.last_playback_ns.store(playback_ns, Ordering::Relaxed);
        self.current_drift_ns.store(drift, Ordering::Relaxed);
        let _ = self.max_drift_ns.fetch_max(drift, Ordering::Relaxed);
    }

    /// Applies one debug event.
    pub fn apply_debug_event(&self, event: &DebugEvent) {
        match event {
            DebugEvent::HlsRequest { kind, .. } => {
                let counter = match kind {
                    UrlKind::Manifest => &self.manifest_requests,
                    UrlKind::Segment => &self.segment_requests,
                    UrlKind::Init => &self.init_requests,
                    UrlKind::Unknown => &self.unknown_requests,
                };
                let _ = counter.fetch_add(1, Ordering::Relaxed);
            }
            DebugEvent::SegmentClose { wall_time, .. } => {
                self.latency.record(*wall_time);
            }
            DebugEvent::SegmentExpired { .. } => {
                let _ = self.segments_expired.fetch_add(1, Ordering::Relaxed);
            }
            DebugEvent::HttpError { code, .. } => self.record_http_error(*code),
            DebugEvent::Reconnect { .. } => {
                let _ = self.reconnections.fetch_add(1, Ordering::Relaxed);
            }
            DebugEvent::Timeout { .. } => {
                let _ = self.timeouts.fetch_add(1, Ordering::Relaxed);
            }
            DebugEvent::SequenceSkip { .. } => {
                let _ = self.sequence_skips.fetch_add(1, Ordering::Relaxed);
            }
            DebugEvent::PlaylistOpen { .. }
            | DebugEvent::SegmentOpen { .. }
            | DebugEvent::TcpConnectAttempt { .. }
            | DebugEvent::TcpConnected { .. }
            | DebugEvent::TcpFailed { .. } => {}
        }
    }

    /// Records one segment's size (resolved from the origin listing) into
    /// the averaging ring.
    pub fn record_segment_size(&self, size: u64) {
        self.segment_ring.push(size);
    }

    /// Counts one HTTP error into its status bucket.
    pub fn record_http_error(&self, code: u16) {
        let bucket = if (400..=599).contains(&code) {
            usize::from(code - 400)
        } else {
            HTTP_OTHER_BUCKET
        };
        let _ = self.http_errors[bucket].fetch_add(1, Ordering::Relaxed);
    }

    /// Adds this client's HTTP error buckets into `into`.
    pub fn merge_http_errors(&self, into: &mut [u64; HTTP_ERROR_BUCKETS]) {
        for (sum, bucket) in into.iter_mut().zip(self.http_errors.iter()) {
            *sum += bucket.load(Ordering::Relaxed);
        }
    }

    /// Counts one line consumed from the progress pipe.
    pub fn note_progress_line(&self) {
        let _ = self.progress_lines_read.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts one progress update dropped by backpressure.
    pub fn note_progress_dropped(&self) {
        let _ = self.progress_updates_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts one line consumed from stderr.
    pub fn note_stderr_line(&self) {
        let _ = self.stderr_lines_read.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts one debug event dropped by backpressure.
    pub fn note_stderr_dropped(&self) {
        let _ = self.stderr_events_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts one unparseable stderr line.
    pub fn note_parse_error(&self) {
        let _ = self.parse_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Raises the peak drop rate to `rate` if larger.
    pub fn record_peak_drop_rate(&self, rate: f64) {
        store_max_f64(&self.peak_drop_rate_bits, rate);
    }

    /// The largest drop rate this client has seen.
    #[must_use]
    pub fn peak_drop_rate(&self) -> f64 {
        f64::from_bits(self.peak_drop_rate_bits.load(Ordering::Relaxed))
    }

    /// Total bytes across all runs of this slot. Monotone even though the
    /// child's own counter resets on restart.
    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.bytes_previous_runs.load(Ordering::Acquire)
            + self.bytes_current.load(Ordering::Acquire)
    }

    /// Last reported playback speed.
    #[must_use]
    pub fn speed(&self) -> f64 {
        f64::from_bits(self.speed_bits.load(Ordering::Relaxed))
    }

    /// Whether speed has been in `(0, stall_threshold)` for longer than the
    /// stall duration.
    #[must_use]
    pub fn is_stalled(&self) -> bool {
        let armed = self.below_threshold_since_ns.load(Ordering::Relaxed);
        if armed == 0 {
            return false;
        }
        let age_ns = self.elapsed_ns().saturating_sub(armed);
        Duration::from_nanos(age_ns) >= self.stall_duration
    }

    /// Last playback position reported by the current run's child.
    #[must_use]
    pub fn last_playback(&self) -> Duration {
        Duration::from_nanos(self.last_playback_ns.load(Ordering::Relaxed).max(0) as u64)
    }

    /// Current drift (wall time minus playback), clamped at zero.
    #[must_use]
    pub fn current_drift(&self) -> Duration {
        Duration::from_nanos(self.current_drift_ns.load(Ordering::Relaxed).max(0) as u64)
    }

    /// Largest drift observed; monotone non-decreasing.
    #[must_use]
    pub fn max_drift(&self) -> Duration {
        Duration::from_nanos(self.max_drift_ns.load(Ordering::Relaxed).max(0) as u64)
    }

    /// The latency reservoir, for aggregation.
    #[must_use]
    pub fn latency(&self) -> &LatencyReservoir {
        &self.latency
    }

    /// Samples every counter at once. Individual loads are relaxed; fields
    /// are not guaranteed to come from a single instant.
    #[must_use]
    pub fn counters(&self) -> CounterSample {
        let http_errors = self
            .http_errors
            .iter()
            .map(|b| b.load(Ordering::Relaxed))
            .sum();
        CounterSample {
            manifest_requests: self.manifest_requests.load(Ordering::Relaxed),
            segment_requests: self.segment_requests.load(Ordering::Relaxed),
            init_requests: self.init_requests.load(Ordering::Relaxed),
            unknown_requests: self.unknown_requests.load(Ordering::Relaxed),
            reconnections: self.reconnections.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            sequence_skips: self.sequence_skips.load(Ordering::Relaxed),
            segments_expired: self.segments_expired.load(Ordering::Relaxed),
            parse_errors: self.parse_errors.load(Ordering::Relaxed),
            progress_lines_read: self.progress_lines_read.load(Ordering::Relaxed),
            progress_updates_dropped: self.progress_updates_dropped.load(Ordering::Relaxed),
            stderr_lines_read: self.stderr_lines_read.load(Ordering::Relaxed),
            stderr_events_dropped: self.stderr_events_dropped.load(Ordering::Relaxed),
            http_errors,
            total_bytes: self.total_bytes(),
            process_starts: self.process_starts.load(Ordering::Relaxed),
        }
    }

    /// A point-in-time view for fleet queries.
    #[must_use]
    pub fn snapshot(&self) -> ClientSnapshot {
        ClientSnapshot {
            client_id: self.client_id,
            counters: self.counters(),
            speed: self.speed(),
            stalled: self.is_stalled(),
            last_playback: self.last_playback(),
            current_drift: self.current_drift(),
            max_drift: self.max_drift(),
            avg_segment_size: self.segment_ring.average(),
            segment_wall_p50: self.latency.quantile(0.50),
            segment_wall_p99: self.latency.quantile(0.99),
        }
    }
}
