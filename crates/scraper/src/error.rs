// Copyright The HLS Swarm Authors
// SPDX-License-Identifier: Apache-2.0

//! Errors for the scraper crate.

/// Errors that can occur during one scrape cycle. Every variant leaves the
/// cache untouched; the next tick retries.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The HTTP request could not be built or sent.
    #[error("listing request failed: {source}")]
    Request {
        /// The underlying client error.
        #[from]
        source: reqwest::Error,
    },

    /// The origin answered with a non-2xx status.
    #[error("listing request returned status {status}")]
    Status {
        /// The HTTP status code.
        status: u16,
    },

    /// The response body was not the expected JSON array.
    #[error("listing body is not valid JSON: {details}")]
    Decode {
        /// The decode failure.
        details: String,
    },
}
