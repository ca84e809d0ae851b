// Copyright The HLS Swarm Authors
// SPDX-License-Identifier: Apache-2.0

//! Lifecycle and event callbacks exposed to external collaborators
//! (dashboard, metrics exposition).

use hls_swarm_config::ClientId;
use hls_swarm_parser::{DebugEvent, ProgressUpdate};
use std::time::Duration;

/// Lifecycle state of one supervised client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Created, not yet scheduled.
    Idle,
    /// Spawning a child.
    Starting,
    /// Child is alive.
    Running,
    /// Waiting out a restart delay.
    Backoff,
    /// Child completed cleanly; no further restarts this cycle.
    Exited,
    /// Restart cap reached or supervision cancelled; permanently stopped.
    Terminal,
}

impl ClientState {
    /// True for states in which the supervisor still holds or will hold a
    /// child.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Starting | Self::Running | Self::Backoff)
    }
}

impl std::fmt::Display for ClientState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Backoff => "backoff",
            Self::Exited => "exited",
            Self::Terminal => "terminal",
        };
        write!(f, "{label}")
    }
}

/// Callbacks from the core to external collaborators.
///
/// Every method is invoked from a supervisor task and must return promptly;
/// anything slow belongs behind the collaborator's own queue. Defaults are
/// no-ops, so implementations override only what they consume.
pub trait SwarmObserver: Send + Sync {
    /// One parsed progress block.
    fn on_progress(&self, client_id: ClientId, update: &ProgressUpdate) {
        let _ = (client_id, update);
    }

    /// One recognised debug event.
    fn on_debug_event(&self, client_id: ClientId, event: &DebugEvent) {
        let _ = (client_id, event);
    }

    /// A supervisor state transition.
    fn on_state_change(&self, client_id: ClientId, old: ClientState, new: ClientState) {
        let _ = (client_id, old, new);
    }

    /// A child process started.
    fn on_client_start(&self, client_id: ClientId, pid: u32) {
        let _ = (client_id, pid);
    }

    /// A child process exited. `exit_code` is `None` when the child was
    /// killed by a signal.
    fn on_client_exit(&self, client_id: ClientId, exit_code: Option<i32>, uptime: Duration) {
        let _ = (client_id, exit_code, uptime);
    }

    /// A restart was scheduled after `delay`.
    fn on_client_restart(&self, client_id: ClientId, attempt: u32, delay: Duration) {
        let _ = (client_id, attempt, delay);
    }
}

/// An observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl SwarmObserver for NullObserver {}
