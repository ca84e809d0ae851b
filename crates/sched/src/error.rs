// Copyright The HLS Swarm Authors
// SPDX-License-Identifier: Apache-2.0

//! Errors for the sched crate.

use hls_swarm_config::ClientId;

/// Errors that can occur while scheduling restarts.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The per-client restart counter crossed the configured cap.
    #[error("client {client_id} exceeded the restart cap of {cap} (restarts: {restarts})")]
    MaxRestartsExceeded {
        /// The client whose cap was exhausted.
        client_id: ClientId,
        /// The configured cap.
        cap: u32,
        /// The number of restarts already performed.
        restarts: u32,
    },
}
