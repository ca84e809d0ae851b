// Copyright The HLS Swarm Authors
// SPDX-License-Identifier: Apache-2.0

//! Errors for the supervisor crate.

use hls_swarm_config::ClientId;

/// Errors that can occur while supervising children or managing the fleet.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The progress pipe could not be allocated or configured.
    #[error("progress pipe setup failed for client {client_id}: {source}")]
    Pipe {
        /// The client whose pipe failed.
        client_id: ClientId,
        /// The underlying OS error.
        source: nix::Error,
    },

    /// The child process could not be spawned.
    #[error("spawn failed for client {client_id}: {source}")]
    Spawn {
        /// The client whose child failed to spawn.
        client_id: ClientId,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Wiring a spawned child's pipes into the runtime failed.
    #[error("pipe registration failed for client {client_id}: {source}")]
    PipeRegistration {
        /// The client whose pipe could not be registered.
        client_id: ClientId,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Shutdown did not complete within the deadline.
    #[error("shutdown timed out with {pending} supervisor(s) still running")]
    ShutdownTimeout {
        /// Supervisors that had not returned when the deadline passed.
        pending: usize,
    },

    /// The scraper could not be constructed.
    #[error(transparent)]
    Scraper(#[from] hls_swarm_scraper::Error),
}
