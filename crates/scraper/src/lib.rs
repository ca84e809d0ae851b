// Copyright The HLS Swarm Authors
// SPDX-License-Identifier: Apache-2.0

//! Segment-size scraper.
//!
//! One instance per process, shared by every client's progress callbacks.
//! A periodic task fetches the origin's directory listing (nginx
//! `autoindex_format json`) and feeds it into the windowed
//! [`cache::SegmentSizeCache`]; readers resolve segment names to byte sizes
//! without blocking. Scrape failures of any kind leave the cache untouched
//! and are retried on the next tick.

use hls_swarm_config::ScraperConfig;
use rand::RngExt;
use serde::Deserialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub mod cache;
pub mod error;

pub use cache::SegmentSizeCache;
pub use error::Error;

/// One element of the origin's JSON directory listing. Fields beyond these
/// three (`mtime` and friends) are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct ListingEntry {
    /// File name relative to the listed directory.
    pub name: String,
    /// `"file"` or `"directory"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Size in bytes; absent for directories.
    #[serde(default)]
    pub size: u64,
}

impl ListingEntry {
    /// True for plain file entries.
    #[must_use]
    pub fn is_file(&self) -> bool {
        self.kind == "file"
    }
}

/// Periodic scraper of the origin's segment listing.
pub struct Scraper {
    config: ScraperConfig,
    client: reqwest::Client,
    cache: Arc<SegmentSizeCache>,
    scrape_cycles: AtomicU64,
    scrape_errors: AtomicU64,
}

impl Scraper {
    /// Creates a scraper and its cache.
    pub fn new(config: ScraperConfig) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        let cache = Arc::new(SegmentSizeCache::new(config.window));
        Ok(Self {
            config,
            client,
            cache,
            scrape_cycles: AtomicU64::new(0),
            scrape_errors: AtomicU64::new(0),
        })
    }

    /// The shared cache handle.
    #[must_use]
    pub fn cache(&self) -> Arc<SegmentSizeCache> {
        self.cache.clone()
    }

    /// Successful scrape cycles so far.
    #[must_use]
    pub fn scrape_cycles(&self) -> u64 {
        self.scrape_cycles.load(Ordering::Relaxed)
    }

    /// Failed scrape cycles so far.
    #[must_use]
    pub fn scrape_errors(&self) -> u64 {
        self.scrape_errors.load(Ordering::Relaxed)
    }

    /// Runs until cancelled, scraping once immediately and then on every
    /// jittered tick.
    pub async fn run(&self, cancel: CancellationToken) {
        loop {
            match self.scrape_once().await {
                Ok(count) => {
                    let _ = self.scrape_cycles.fetch_add(1, Ordering::Relaxed);
                    tracing::trace!(entries = count, "scrape cycle complete");
                }
                Err(error) => {
                    let _ = self.scrape_errors.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(%error, "scrape cycle failed");
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(self.next_tick()) => {}
            }
        }
    }

    /// The delay before the next tick: `interval ± jitter`.
    fn next_tick(&self) -> Duration {
        let jitter_ns = self.config.jitter.as_nanos().min(u128::from(u64::MAX)) as i64;
        if jitter_ns == 0 {
            return self.config.interval;
        }
        let offset = rand::rng().random_range(-jitter_ns..=jitter_ns);
        let base_ns = self.config.interval.as_nanos().min(u128::from(u64::MAX)) as i64;
        Duration::from_nanos(base_ns.saturating_add(offset).max(0) as u64)
    }

    /// Fetches and applies one listing. Any failure leaves the cache as it
    /// was.
    pub async fn scrape_once(&self) -> Result<usize, Error> {
        let response = self
            .client
            .get(&self.config.listing_url)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Status {
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await?;
        let listing: Vec<ListingEntry> =
            serde_json::from_slice(&body).map_err(|e| Error::Decode {
                details: e.to_string(),
            })?;

        self.cache.apply_listing(&listing);
        Ok(listing.len())
    }
}
