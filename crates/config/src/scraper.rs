// Copyright The HLS Swarm Authors
// SPDX-License-Identifier: Apache-2.0

//! Segment-size listing scraper.

use crate::error::Error;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Scraper parameters.
///
/// The scraper expects the listing URL to return an nginx
/// `autoindex_format json` style array of `{name, type, size}` objects.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ScraperConfig {
    /// Directory listing URL on the origin.
    #[serde(default = "default_listing_url")]
    pub listing_url: String,
    /// Interval between scrape cycles.
    #[serde(with = "humantime_serde", default = "default_interval")]
    #[schemars(with = "String")]
    pub interval: Duration,
    /// Random jitter applied to each tick, in `[-jitter, +jitter]`.
    #[serde(with = "humantime_serde", default = "default_jitter")]
    #[schemars(with = "String")]
    pub jitter: Duration,
    /// Number of most recent numbered segments retained in the cache.
    #[serde(default = "default_window")]
    pub window: u64,
    /// Per-request timeout.
    #[serde(with = "humantime_serde", default = "default_request_timeout")]
    #[schemars(with = "String")]
    pub request_timeout: Duration,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            listing_url: default_listing_url(),
            interval: default_interval(),
            jitter: default_jitter(),
            window: default_window(),
            request_timeout: default_request_timeout(),
        }
    }
}

fn default_listing_url() -> String {
    "http://localhost/hls/".to_owned()
}

const fn default_interval() -> Duration {
    Duration::from_secs(1)
}

const fn default_jitter() -> Duration {
    Duration::from_millis(500)
}

const fn default_window() -> u64 {
    300
}

const fn default_request_timeout() -> Duration {
    Duration::from_secs(5)
}

impl ScraperConfig {
    pub(crate) fn validate(&self, errors: &mut Vec<Error>) {
        if self.window == 0 {
            errors.push(Error::InvalidField {
                field: "scraper.window".to_owned(),
                details: "retention window must be at least 1".to_owned(),
            });
        }
        if self.interval.is_zero() {
            errors.push(Error::InvalidField {
                field: "scraper.interval".to_owned(),
                details: "interval must be positive".to_owned(),
            });
        }
        if self.jitter >= self.interval {
            errors.push(Error::InvalidField {
                field: "scraper.jitter".to_owned(),
                details: "jitter must be below the interval".to_owned(),
            });
        }
        if let Err(e) = Url::parse(&self.listing_url) {
            errors.push(Error::InvalidUrl {
                field: "scraper.listing_url".to_owned(),
                details: e.to_string(),
            });
        }
    }
}
