// Copyright The HLS Swarm Authors
// SPDX-License-Identifier: Apache-2.0

//! Restart policy for failed children.

use crate::error::Error;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Exponential backoff parameters applied per client.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct BackoffConfig {
    /// Delay before the first restart.
    #[serde(with = "humantime_serde", default = "default_initial")]
    #[schemars(with = "String")]
    pub initial: Duration,
    /// Upper bound on the restart delay.
    #[serde(with = "humantime_serde", default = "default_max")]
    #[schemars(with = "String")]
    pub max: Duration,
    /// Growth factor between successive restart delays.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// Multiplicative jitter fraction `f`; each delay is scaled by a factor
    /// drawn uniformly from `[1 - f, 1 + f]`.
    #[serde(default = "default_jitter_fraction")]
    pub jitter_fraction: f64,
    /// Restart cap per client; zero means unlimited.
    #[serde(default)]
    pub max_restarts: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: default_initial(),
            max: default_max(),
            multiplier: default_multiplier(),
            jitter_fraction: default_jitter_fraction(),
            max_restarts: 0,
        }
    }
}

const fn default_initial() -> Duration {
    Duration::from_millis(100)
}

const fn default_max() -> Duration {
    Duration::from_secs(30)
}

const fn default_multiplier() -> f64 {
    2.0
}

const fn default_jitter_fraction() -> f64 {
    0.2
}

impl BackoffConfig {
    /// A run longer than this resets the per-client attempt counter.
    #[must_use]
    pub fn stability_window(&self) -> Duration {
        self.initial.mul_f64(self.multiplier)
    }

    pub(crate) fn validate(&self, errors: &mut Vec<Error>) {
        if self.multiplier.is_nan() || self.multiplier < 1.0 {
            errors.push(Error::InvalidField {
                field: "backoff.multiplier".to_owned(),
                details: "multiplier must be at least 1.0".to_owned(),
            });
        }
        if !(0.0..1.0).contains(&self.jitter_fraction) {
            errors.push(Error::InvalidField {
                field: "backoff.jitter_fraction".to_owned(),
                details: "jitter fraction must lie in [0, 1)".to_owned(),
            });
        }
        if self.max < self.initial {
            errors.push(Error::InvalidField {
                field: "backoff.max".to_owned(),
                details: "max must not be below initial".to_owned(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stability_window() {
        let config = BackoffConfig::default();
        assert_eq!(config.stability_window(), Duration::from_millis(200));
    }

    #[test]
    fn test_nan_multiplier_rejected() {
        let mut config = BackoffConfig::default();
        config.multiplier = f64::NAN;
        let mut errors = Vec::new();
        config.validate(&mut errors);
        assert_eq!(errors.len(), 1);
    }
}
