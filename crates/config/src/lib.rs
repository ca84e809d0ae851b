// Copyright The HLS Swarm Authors
// SPDX-License-Identifier: Apache-2.0

//! Swarm configuration.
//!
//! Data model:
//! - swarm
//!   - fetcher (child process contract)
//!   - ramp (client start pacing)
//!   - backoff (restart policy)
//!   - scraper (segment-size listing)
//!   - stats (health thresholds)
//!
//! All durations accept humantime strings (`"250ms"`, `"5s"`). Every section
//! has complete defaults, so an empty document is a valid configuration once
//! a listing URL is provided.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub mod error;
pub mod media;

mod backoff;
mod fetcher;
mod ramp;
mod scraper;
mod stats;

pub use backoff::BackoffConfig;
pub use error::Error;
pub use fetcher::FetcherConfig;
pub use media::UrlKind;
pub use ramp::RampConfig;
pub use scraper::ScraperConfig;
pub use stats::StatsConfig;

/// The id of a swarm client. Positive, assigned at start, stable across
/// restarts of the same client slot.
pub type ClientId = u64;

/// Top-level configuration for one swarm run.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SwarmConfig {
    /// Number of clients to ramp up.
    #[serde(default = "default_clients")]
    pub clients: u64,
    /// Child fetcher process contract.
    #[serde(default)]
    pub fetcher: FetcherConfig,
    /// Client start pacing.
    #[serde(default)]
    pub ramp: RampConfig,
    /// Restart policy for failed children.
    #[serde(default)]
    pub backoff: BackoffConfig,
    /// Segment-size listing scraper.
    #[serde(default)]
    pub scraper: ScraperConfig,
    /// Stall/drift thresholds and pipeline sizing.
    #[serde(default)]
    pub stats: StatsConfig,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            clients: default_clients(),
            fetcher: FetcherConfig::default(),
            ramp: RampConfig::default(),
            backoff: BackoffConfig::default(),
            scraper: ScraperConfig::default(),
            stats: StatsConfig::default(),
        }
    }
}

const fn default_clients() -> u64 {
    1
}

impl SwarmConfig {
    /// Loads a configuration from a YAML or JSON file, selected by extension,
    /// and validates it.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| Error::FileReadError {
            path: path.display().to_string(),
            details: e.to_string(),
        })?;

        let config: SwarmConfig = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => {
                serde_yaml::from_str(&contents).map_err(|e| Error::DeserializationError {
                    format: "YAML".to_owned(),
                    details: e.to_string(),
                })?
            }
            Some("json") => {
                serde_json::from_str(&contents).map_err(|e| Error::DeserializationError {
                    format: "JSON".to_owned(),
                    details: e.to_string(),
                })?
            }
            _ => {
                return Err(Error::UnsupportedFormat {
                    path: path.display().to_string(),
                });
            }
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration, collecting every violation before failing.
    pub fn validate(&self) -> Result<(), Error> {
        let mut errors = Vec::new();

        if self.clients == 0 {
            errors.push(Error::InvalidField {
                field: "clients".to_owned(),
                details: "at least one client is required".to_owned(),
            });
        }

        self.fetcher.validate(&mut errors);
        self.ramp.validate(&mut errors);
        self.backoff.validate(&mut errors);
        self.scraper.validate(&mut errors);
        self.stats.validate(&mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::InvalidConfiguration { errors })
        }
    }
}
