// Copyright The HLS Swarm Authors
// SPDX-License-Identifier: Apache-2.0

//! Stall/drift thresholds and pipeline sizing.

use crate::error::Error;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per-client health thresholds and event-pipeline capacities.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct StatsConfig {
    /// Playback speed below which a client counts as stalling (but above
    /// zero; a speed of zero means no progress data yet).
    #[serde(default = "default_stall_threshold")]
    pub stall_threshold: f64,
    /// How long speed must stay below the threshold before the client is
    /// reported stalled.
    #[serde(with = "humantime_serde", default = "default_stall_duration")]
    #[schemars(with = "String")]
    pub stall_duration: Duration,
    /// Capacity of the per-client segment-size ring.
    #[serde(default = "default_segment_ring_capacity")]
    pub segment_ring_capacity: usize,
    /// Capacity of each per-client event channel; a full channel drops
    /// events and counts the drop.
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
    /// Fleet-wide drop rate above which the aggregate snapshot raises the
    /// metrics-degraded flag.
    #[serde(default = "default_degraded_drop_threshold")]
    pub degraded_drop_threshold: f64,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            stall_threshold: default_stall_threshold(),
            stall_duration: default_stall_duration(),
            segment_ring_capacity: default_segment_ring_capacity(),
            event_channel_capacity: default_event_channel_capacity(),
            degraded_drop_threshold: default_degraded_drop_threshold(),
        }
    }
}

const fn default_stall_threshold() -> f64 {
    0.9
}

const fn default_stall_duration() -> Duration {
    Duration::from_secs(5)
}

const fn default_segment_ring_capacity() -> usize {
    32
}

const fn default_event_channel_capacity() -> usize {
    256
}

const fn default_degraded_drop_threshold() -> f64 {
    0.01
}

impl StatsConfig {
    pub(crate) fn validate(&self, errors: &mut Vec<Error>) {
        if self.stall_threshold.is_nan() || self.stall_threshold <= 0.0 {
            errors.push(Error::InvalidField {
                field: "stats.stall_threshold".to_owned(),
                details: "stall threshold must be positive".to_owned(),
            });
        }
        if self.segment_ring_capacity == 0 {
            errors.push(Error::InvalidField {
                field: "stats.segment_ring_capacity".to_owned(),
                details: "ring capacity must be at least 1".to_owned(),
            });
        }
        if self.event_channel_capacity == 0 {
            errors.push(Error::InvalidField {
                field: "stats.event_channel_capacity".to_owned(),
                details: "channel capacity must be at least 1".to_owned(),
            });
        }
        if self.degraded_drop_threshold.is_nan() || self.degraded_drop_threshold < 0.0 {
            errors.push(Error::InvalidField {
                field: "stats.degraded_drop_threshold".to_owned(),
                details: "degraded threshold must be non-negative".to_owned(),
            });
        }
    }
}
