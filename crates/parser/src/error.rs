// Copyright The HLS Swarm Authors
// SPDX-License-Identifier: Apache-2.0

//! Errors for the parser crate.

/// Errors that can occur while draining fetcher output.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Reading from the child's pipe failed for a reason other than EOF.
    #[error("I/O error on fetcher pipe: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },
}
