// Copyright The HLS Swarm Authors
// SPDX-License-Identifier: Apache-2.0

//! Client start pacing.

use crate::error::Error;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Ramp scheduler parameters.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct RampConfig {
    /// Target start rate in clients per second. Zero or negative disables
    /// pacing: clients start immediately.
    #[serde(default = "default_rate")]
    pub rate: f64,
    /// Maximum per-client start jitter added on top of the base delay.
    #[serde(with = "humantime_serde", default = "default_max_jitter")]
    #[schemars(with = "String")]
    pub max_jitter: Duration,
    /// Seed for the deterministic jitter source. Zero draws a fresh seed at
    /// startup; any other value makes runs reproducible.
    #[serde(default)]
    pub seed: u64,
}

impl Default for RampConfig {
    fn default() -> Self {
        Self {
            rate: default_rate(),
            max_jitter: default_max_jitter(),
            seed: 0,
        }
    }
}

const fn default_rate() -> f64 {
    10.0
}

const fn default_max_jitter() -> Duration {
    Duration::from_millis(250)
}

impl RampConfig {
    pub(crate) fn validate(&self, errors: &mut Vec<Error>) {
        if !self.rate.is_finite() {
            errors.push(Error::InvalidField {
                field: "ramp.rate".to_owned(),
                details: "rate must be a finite number".to_owned(),
            });
        }
    }
}
