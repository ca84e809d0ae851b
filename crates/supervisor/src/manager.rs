// Copyright The HLS Swarm Authors
// SPDX-License-Identifier: Apache-2.0

//! Fleet management.
//!
//! The manager owns every supervisor, the shared scraper, the aggregator
//! and the root cancellation token. Fleet queries read shared state (the
//! aggregator registry, per-supervisor state cells) and never block a
//! supervisor.

use crate::child::CommandBuilder;
use crate::error::Error;
use crate::observer::{ClientState, SwarmObserver};
use crate::supervisor::{StateCell, Supervisor};
use hls_swarm_config::{ClientId, SwarmConfig};
use hls_swarm_scraper::{Scraper, SegmentSizeCache};
use hls_swarm_sched::{BackoffState, JitterSource, RampScheduler};
use hls_swarm_stats::{Aggregator, ClientSnapshot, ClientStats};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

struct SupervisorHandle {
    state: Arc<StateCell>,
    stats: Arc<ClientStats>,
    task: JoinHandle<()>,
}

/// Owns the supervisor fleet for one run.
pub struct ClientManager {
    config: SwarmConfig,
    observer: Arc<dyn SwarmObserver>,
    command: Arc<dyn CommandBuilder>,
    jitter: JitterSource,
    ramp: RampScheduler,
    scraper: Arc<Scraper>,
    scraper_task: parking_lot::Mutex<Option<JoinHandle<()>>>,
    aggregator: Arc<Aggregator>,
    supervisors: RwLock<HashMap<ClientId, SupervisorHandle>>,
    cancel: CancellationToken,
}

impl ClientManager {
    /// Creates a manager for the given configuration. The command builder
    /// decides the exact child command line; the observer receives every
    /// lifecycle and event callback.
    pub fn new(
        config: SwarmConfig,
        command: Arc<dyn CommandBuilder>,
        observer: Arc<dyn SwarmObserver>,
    ) -> Result<Self, Error> {
        let jitter = JitterSource::new(config.ramp.seed);
        let ramp = RampScheduler::new(&config.ramp, jitter);
        let scraper = Arc::new(Scraper::new(config.scraper.clone())?);
        let aggregator = Arc::new(Aggregator::new(config.stats.degraded_drop_threshold));
        Ok(Self {
            config,
            observer,
            command,
            jitter,
            ramp,
            scraper,
            scraper_task: parking_lot::Mutex::new(None),
            aggregator,
            supervisors: RwLock::new(HashMap::new()),
            cancel: CancellationToken::new(),
        })
    }

    /// The fleet aggregator.
    #[must_use]
    pub fn aggregator(&self) -> Arc<Aggregator> {
        self.aggregator.clone()
    }

    /// The shared segment-size cache.
    #[must_use]
    pub fn cache(&self) -> Arc<SegmentSizeCache> {
        self.scraper.cache()
    }

    /// The shared scraper, for error/cycle counters.
    #[must_use]
    pub fn scraper(&self) -> Arc<Scraper> {
        self.scraper.clone()
    }

    /// The effective jitter seed; a run can be reproduced by configuring
    /// this value.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.jitter.seed()
    }

    /// The root cancellation token, cancelled by [`Self::shutdown`].
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Expected wall time to bring the configured fleet online.
    #[must_use]
    pub fn estimated_ramp_duration(&self) -> Duration {
        self.ramp.estimated_ramp_duration(self.config.clients)
    }

    /// Starts the scraper and ramps up the configured number of clients.
    /// Returns once every client has been started, or early on
    /// cancellation.
    pub async fn start(&self) {
        let scraper_task = tokio::spawn({
            let scraper = self.scraper.clone();
            let cancel = self.cancel.clone();
            async move { scraper.run(cancel).await }
        });
        *self.scraper_task.lock() = Some(scraper_task);

        for client_id in 1..=self.config.clients {
            if !self.ramp.schedule(&self.cancel, client_id).await {
                tracing::info!(client_id, "ramp cancelled");
                return;
            }
            self.start_client(client_id);
        }
        tracing::info!(clients = self.config.clients, "ramp complete");
    }

    /// Starts one client slot: constructs its stats, registers them with
    /// the aggregator and launches the supervisor task.
    pub fn start_client(&self, client_id: ClientId) {
        let stats = Arc::new(ClientStats::new(client_id, &self.config.stats));
        self.aggregator.add(&stats);

        let state = Arc::new(StateCell::new(ClientState::Idle));
        let backoff = BackoffState::new(self.config.backoff.clone(), self.jitter, client_id);
        let supervisor = Supervisor::new(
            client_id,
            stats.clone(),
            self.observer.clone(),
            self.command.clone(),
            self.cache(),
            backoff,
            state.clone(),
            self.config.fetcher.progress_fd,
            self.config.stats.event_channel_capacity,
            self.config.backoff.stability_window(),
        );

        let task = tokio::spawn({
            let cancel = self.cancel.clone();
            async move { supervisor.run(cancel).await }
        });

        let handle = SupervisorHandle { state, stats, task };
        if self.supervisors.write().insert(client_id, handle).is_some() {
            tracing::warn!(client_id, "replaced an existing supervisor slot");
        }
    }

    /// Number of clients whose supervisor is starting, running or backing
    /// off.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.supervisors
            .read()
            .values()
            .filter(|handle| handle.state.get().is_active())
            .count()
    }

    /// Current state of every client slot.
    #[must_use]
    pub fn states(&self) -> HashMap<ClientId, ClientState> {
        self.supervisors
            .read()
            .iter()
            .map(|(id, handle)| (*id, handle.state.get()))
            .collect()
    }

    /// A snapshot of one client, or `None` for unknown ids.
    #[must_use]
    pub fn client_snapshot(&self, client_id: ClientId) -> Option<ClientSnapshot> {
        self.supervisors
            .read()
            .get(&client_id)
            .map(|handle| handle.stats.snapshot())
    }

    /// True once every supervisor has reached `Exited` or `Terminal`.
    #[must_use]
    pub fn all_finished(&self) -> bool {
        let supervisors = self.supervisors.read();
        !supervisors.is_empty()
            && supervisors
                .values()
                .all(|handle| !handle.state.get().is_active())
    }

    /// Cancels the root token and waits for every supervisor (and the
    /// scraper) to return, bounded by `timeout`. Tasks that do not return
    /// in time are aborted and counted in the error.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), Error> {
        self.cancel.cancel();
        let deadline = Instant::now() + timeout;

        let handles: Vec<(ClientId, SupervisorHandle)> =
            self.supervisors.write().drain().collect();
        let mut pending = 0usize;
        for (client_id, handle) in handles {
            match tokio::time::timeout_at(deadline, handle.task).await {
                Ok(Ok(())) => {}
                Ok(Err(error)) => {
                    tracing::warn!(client_id, %error, "supervisor task panicked");
                }
                Err(_) => {
                    pending += 1;
                    tracing::warn!(client_id, "supervisor abandoned at shutdown");
                }
            }
        }

        let scraper_task = self.scraper_task.lock().take();
        if let Some(task) = scraper_task {
            match tokio::time::timeout_at(deadline, task).await {
                Ok(_) => {}
                Err(_) => tracing::warn!("scraper abandoned at shutdown"),
            }
        }

        if pending == 0 {
            Ok(())
        } else {
            Err(Error::ShutdownTimeout { pending })
        }
    }
}
