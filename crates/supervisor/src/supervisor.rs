// Copyright The HLS Swarm Authors
// SPDX-License-Identifier: Apache-2.0

//! Per-client supervision.
//!
//! One supervisor task per client slot. Each cycle spawns a child, wires
//! its stderr into the debug parser and its progress descriptor into the
//! progress reader, applies parsed events to the client's stats, and on
//! exit consults the backoff calculator before trying again. Cancellation
//! kills the child and drains the parsers within a bounded window.

use crate::child::{CommandBuilder, SpawnedChild, spawn_child};
use crate::observer::{ClientState, SwarmObserver};
use hls_swarm_config::{ClientId, UrlKind};
use hls_swarm_parser::{
    DebugEvent, DebugParser, DebugSink, ProgressReader, ProgressSink, ProgressUpdate,
};
use hls_swarm_scraper::SegmentSizeCache;
use hls_swarm_sched::BackoffState;
use hls_swarm_stats::ClientStats;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// How long exit paths wait for parser tasks to hit EOF before abandoning
/// them.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Shared, lock-free view of a supervisor's state.
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn new(state: ClientState) -> Self {
        Self(AtomicU8::new(encode(state)))
    }

    pub(crate) fn get(&self) -> ClientState {
        decode(self.0.load(Ordering::Relaxed))
    }

    fn set(&self, state: ClientState) {
        self.0.store(encode(state), Ordering::Relaxed);
    }
}

const fn encode(state: ClientState) -> u8 {
    match state {
        ClientState::Idle => 0,
        ClientState::Starting => 1,
        ClientState::Running => 2,
        ClientState::Backoff => 3,
        ClientState::Exited => 4,
        ClientState::Terminal => 5,
    }
}

const fn decode(value: u8) -> ClientState {
    match value {
        1 => ClientState::Starting,
        2 => ClientState::Running,
        3 => ClientState::Backoff,
        4 => ClientState::Exited,
        5 => ClientState::Terminal,
        _ => ClientState::Idle,
    }
}

/// Either pipeline's output, multiplexed onto one bounded channel.
enum Parsed {
    Progress(ProgressUpdate),
    Debug(DebugEvent),
}

/// Progress-reader sink: accounts lines, forwards blocks, drops on a full
/// channel.
struct ForwardProgress {
    stats: Arc<ClientStats>,
    tx: mpsc::Sender<Parsed>,
}

impl ProgressSink for ForwardProgress {
    fn on_update(&mut self, update: ProgressUpdate) {
        match self.tx.try_send(Parsed::Progress(update)) {
            Ok(()) => {}
            Err(TrySendError::Full(_) | TrySendError::Closed(_)) => {
                self.stats.note_progress_dropped();
            }
        }
    }

    fn on_line(&mut self) {
        self.stats.note_progress_line();
    }
}

/// Debug-parser sink: accounts lines and parse failures, forwards events,
/// drops on a full channel.
struct ForwardDebug {
    stats: Arc<ClientStats>,
    tx: mpsc::Sender<Parsed>,
}

impl DebugSink for ForwardDebug {
    fn on_event(&mut self, event: DebugEvent) {
        match self.tx.try_send(Parsed::Debug(event)) {
            Ok(()) => {}
            Err(TrySendError::Full(_) | TrySendError::Closed(_)) => {
                self.stats.note_stderr_dropped();
            }
        }
    }

    fn on_line(&mut self) {
        self.stats.note_stderr_line();
    }

    fn on_parse_error(&mut self) {
        self.stats.note_parse_error();
    }
}

/// Supervises one client slot for its whole lifecycle.
pub struct Supervisor {
    client_id: ClientId,
    stats: Arc<ClientStats>,
    observer: Arc<dyn SwarmObserver>,
    command: Arc<dyn CommandBuilder>,
    cache: Arc<SegmentSizeCache>,
    backoff: BackoffState,
    state: Arc<StateCell>,
    progress_fd: i32,
    channel_capacity: usize,
    stability_window: Duration,
}

impl Supervisor {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        client_id: ClientId,
        stats: Arc<ClientStats>,
        observer: Arc<dyn SwarmObserver>,
        command: Arc<dyn CommandBuilder>,
        cache: Arc<SegmentSizeCache>,
        backoff: BackoffState,
        state: Arc<StateCell>,
        progress_fd: i32,
        channel_capacity: usize,
        stability_window: Duration,
    ) -> Self {
        Self {
            client_id,
            stats,
            observer,
            command,
            cache,
            backoff,
            state,
            progress_fd,
            channel_capacity,
            stability_window,
        }
    }

    fn transition(&self, new: ClientState) {
        let old = self.state.get();
        if old == new {
            return;
        }
        self.state.set(new);
        tracing::debug!(client_id = self.client_id, %old, %new, "state change");
        self.observer.on_state_change(self.client_id, old, new);
    }

    /// Runs the supervision loop until the slot reaches a terminal state or
    /// the token is cancelled.
    pub async fn run(mut self, cancel: CancellationToken) {
        loop {
            if cancel.is_cancelled() {
                self.transition(ClientState::Terminal);
                return;
            }

            self.transition(ClientState::Starting);
            let (program, args) = self.command.build(self.client_id);
            let spawned = spawn_child(self.client_id, &program, &args, self.progress_fd);

            let outcome = match spawned {
                Ok(spawned) => self.run_child(spawned, &cancel).await,
                Err(error) => {
                    tracing::warn!(client_id = self.client_id, %error, "spawn failed");
                    RunOutcome::Failed
                }
            };

            match outcome {
                RunOutcome::Completed => {
                    self.transition(ClientState::Exited);
                    return;
                }
                RunOutcome::Cancelled => {
                    self.transition(ClientState::Exited);
                    return;
                }
                RunOutcome::Failed => {
                    self.transition(ClientState::Backoff);
                    let delay = match self.backoff.next_delay() {
                        Ok(delay) => delay,
                        Err(error) => {
                            tracing::warn!(client_id = self.client_id, %error, "giving up");
                            self.transition(ClientState::Terminal);
                            return;
                        }
                    };
                    self.observer
                        .on_client_restart(self.client_id, self.backoff.attempt(), delay);
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            self.transition(ClientState::Terminal);
                            return;
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    /// Runs one child from spawn to drained exit.
    async fn run_child(&mut self, spawned: SpawnedChild, cancel: &CancellationToken) -> RunOutcome {
        let SpawnedChild { mut child, progress } = spawned;
        let started = Instant::now();

        self.stats.on_process_start();
        let pid = child.id().unwrap_or_default();
        self.observer.on_client_start(self.client_id, pid);
        self.transition(ClientState::Running);

        let (tx, mut rx) = mpsc::channel(self.channel_capacity);

        let progress_task: JoinHandle<()> = tokio::spawn({
            let sink = ForwardProgress {
                stats: self.stats.clone(),
                tx: tx.clone(),
            };
            async move {
                if let Err(error) = ProgressReader::new(sink).run(progress).await {
                    tracing::debug!(%error, "progress reader ended");
                }
            }
        });

        // stderr is always piped by spawn_child; a missing handle would mean
        // the child was constructed without it, which run_child never does.
        let stderr = child.stderr.take();
        let stderr_task: JoinHandle<()> = tokio::spawn({
            let sink = ForwardDebug {
                stats: self.stats.clone(),
                tx,
            };
            async move {
                match stderr {
                    Some(stderr) => {
                        if let Err(error) = DebugParser::new(sink).run(stderr).await {
                            tracing::debug!(%error, "stderr parser ended");
                        }
                    }
                    None => tracing::warn!("child spawned without piped stderr"),
                }
            }
        });

        let mut kill_sent = false;
        let mut rx_open = true;
        let status = loop {
            tokio::select! {
                status = child.wait() => break status,
                item = rx.recv(), if rx_open => {
                    match item {
                        Some(item) => self.apply(&item),
                        None => rx_open = false,
                    }
                }
                _ = cancel.cancelled(), if !kill_sent => {
                    kill_sent = true;
                    if let Err(error) = child.start_kill() {
                        tracing::debug!(client_id = self.client_id, %error, "kill failed");
                    }
                }
            }
        };

        // Child is gone; both pipes will hit EOF. Give the parsers a bounded
        // window to finish, then drain whatever made it onto the channel.
        let drain = async {
            let _ = progress_task.await;
            let _ = stderr_task.await;
        };
        if tokio::time::timeout(DRAIN_TIMEOUT, drain).await.is_err() {
            tracing::warn!(client_id = self.client_id, "parser drain timed out");
        }
        let _ = tokio::time::timeout(DRAIN_TIMEOUT, async {
            while let Some(item) = rx.recv().await {
                self.apply(&item);
            }
        })
        .await;

        let uptime = started.elapsed();
        let (exit_code, clean) = match status {
            Ok(status) => (status.code(), status.success()),
            Err(ref error) => {
                tracing::warn!(client_id = self.client_id, %error, "wait failed");
                (None, false)
            }
        };
        self.observer.on_client_exit(self.client_id, exit_code, uptime);
        tracing::debug!(
            client_id = self.client_id,
            ?exit_code,
            ?uptime,
            "child exited"
        );

        if cancel.is_cancelled() {
            return RunOutcome::Cancelled;
        }
        if clean && uptime >= self.stability_window {
            self.backoff.record_success(uptime);
            return RunOutcome::Completed;
        }
        RunOutcome::Failed
    }

    /// Applies one parsed item to the stats and forwards it to the
    /// observer.
    fn apply(&self, item: &Parsed) {
        match item {
            Parsed::Progress(update) => {
                self.stats.apply_progress(update);
                self.observer.on_progress(self.client_id, update);
            }
            Parsed::Debug(event) => {
                self.stats.apply_debug_event(event);
                if let DebugEvent::HlsRequest {
                    url,
                    kind: UrlKind::Segment,
                    ..
                } = event
                {
                    // Resolve the request into origin-side bytes while the
                    // listing still has the segment.
                    if let Some(size) = self.cache.get(file_name(url)) {
                        self.stats.record_segment_size(size);
                    }
                }
                self.observer.on_debug_event(self.client_id, event);
            }
        }
    }
}

/// How one child run ended.
enum RunOutcome {
    /// Clean exit after a stable run; the slot is done.
    Completed,
    /// Supervision was cancelled.
    Cancelled,
    /// Any other exit or a spawn failure; backoff and retry.
    Failed,
}

/// The file-name component of a segment URL, as it appears in the origin
/// listing.
fn file_name(url: &str) -> &str {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    let path = &url[..end];
    path.rsplit('/').next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name_extraction() {
        assert_eq!(file_name("http://o/hls/seg00042.ts"), "seg00042.ts");
        assert_eq!(file_name("http://o/hls/seg1.ts?sid=9"), "seg1.ts");
        assert_eq!(file_name("seg2.ts"), "seg2.ts");
    }

    #[test]
    fn test_state_cell_round_trip() {
        let cell = StateCell::new(ClientState::Idle);
        for state in [
            ClientState::Starting,
            ClientState::Running,
            ClientState::Backoff,
            ClientState::Exited,
            ClientState::Terminal,
        ] {
            cell.set(state);
            assert_eq!(cell.get(), state);
        }
    }
}
