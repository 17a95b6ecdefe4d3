//! Backend host pool
//!
//! A single actor task owns the reachability table and is the only code that
//! reads or writes it. Relay tasks talk to it through a [`PoolHandle`]:
//!
//! - `select` returns a random reachable index. When nothing is reachable the
//!   actor re-probes every host before answering, retrying with a fixed backoff
//!   until some host responds. Requests that arrive meanwhile wait in the mailbox
//!   and are served from the same re-probe.
//! - `disable` marks an index unreachable after a failed dial.
//! - A timer re-probes the whole pool in the background every refresh interval;
//!   the new table replaces the old one when the round finishes.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use crate::error::{Result, RelayError};
use crate::proxy::probe::BackendProber;

/// Capacity of the pool mailbox
const MAILBOX_CAPACITY: usize = 1024;

/// Pool timing and randomness settings
#[derive(Clone, Debug)]
pub struct PoolConfig {
    /// Interval between background re-probes
    pub refresh_interval: Duration,
    /// Wait before retrying a re-probe that found no reachable host
    pub retry_backoff: Duration,
    /// Seed for host selection; `None` seeds from the OS
    pub seed: Option<u64>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(30 * 60),
            retry_backoff: Duration::from_secs(10),
            seed: None,
        }
    }
}

/// Last known dial outcome per backend index, plus the derived list of
/// reachable indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reachability {
    table: Vec<bool>,
    available: Vec<usize>,
}

impl Reachability {
    pub fn from_table(table: Vec<bool>) -> Self {
        let available = Self::derive(&table);
        Self { table, available }
    }

    fn derive(table: &[bool]) -> Vec<usize> {
        table
            .iter()
            .enumerate()
            .filter(|(_, reachable)| **reachable)
            .map(|(index, _)| index)
            .collect()
    }

    /// Mark `index` unreachable. Returns `false` when `index` is out of range.
    pub fn disable(&mut self, index: usize) -> bool {
        match self.table.get_mut(index) {
            Some(entry) => {
                *entry = false;
                self.available = Self::derive(&self.table);
                true
            }
            None => false,
        }
    }

    pub fn table(&self) -> &[bool] {
        &self.table
    }

    pub fn available(&self) -> &[usize] {
        &self.available
    }

    pub fn is_empty(&self) -> bool {
        self.available.is_empty()
    }

    /// Pick one reachable index uniformly at random
    pub fn choose<R: Rng>(&self, rng: &mut R) -> Option<usize> {
        if self.available.is_empty() {
            return None;
        }
        Some(self.available[rng.gen_range(0..self.available.len())])
    }
}

enum PoolCommand {
    Select(oneshot::Sender<usize>),
    Disable(usize),
    Snapshot(oneshot::Sender<Vec<usize>>),
}

/// Cloneable handle to the pool actor
#[derive(Clone)]
pub struct PoolHandle {
    commands: mpsc::Sender<PoolCommand>,
}

impl PoolHandle {
    /// Get a backend index to dial.
    ///
    /// Waits while the pool re-probes if no host is currently reachable.
    pub async fn select(&self) -> Result<usize> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(PoolCommand::Select(reply_tx))
            .await
            .map_err(|_| RelayError::PoolClosed)?;
        reply_rx.await.map_err(|_| RelayError::PoolClosed)
    }

    /// Report that dialing `index` failed
    pub async fn disable(&self, index: usize) -> Result<()> {
        self.commands
            .send(PoolCommand::Disable(index))
            .await
            .map_err(|_| RelayError::PoolClosed)
    }

    /// Indices currently believed reachable
    pub async fn available(&self) -> Result<Vec<usize>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(PoolCommand::Snapshot(reply_tx))
            .await
            .map_err(|_| RelayError::PoolClosed)?;
        reply_rx.await.map_err(|_| RelayError::PoolClosed)
    }
}

/// The pool actor
pub struct HostPool {
    prober: BackendProber,
    config: PoolConfig,
    state: Reachability,
    rng: StdRng,
    refreshing: bool,
}

impl HostPool {
    /// Start the pool actor on the current runtime.
    ///
    /// The actor probes every host before serving its first request and stops
    /// once every handle has been dropped.
    pub fn spawn(prober: BackendProber, config: PoolConfig) -> PoolHandle {
        let (commands_tx, commands_rx) = mpsc::channel(MAILBOX_CAPACITY);
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let count = prober.host_count();

        let pool = HostPool {
            prober,
            config,
            state: Reachability::from_table(vec![false; count]),
            rng,
            refreshing: false,
        };
        tokio::spawn(pool.run(commands_rx));

        PoolHandle {
            commands: commands_tx,
        }
    }

    #[instrument(skip_all)]
    async fn run(mut self, mut commands: mpsc::Receiver<PoolCommand>) {
        self.state = probe_until_available(&self.prober, self.config.retry_backoff).await;

        let period = self.config.refresh_interval;
        let mut refresh_timer = interval_at(Instant::now() + period, period);
        refresh_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let (refreshed_tx, mut refreshed_rx) = mpsc::channel::<Reachability>(1);

        loop {
            tokio::select! {
                command = commands.recv() => {
                    match command {
                        Some(command) => self.handle(command).await,
                        None => {
                            debug!("All pool handles dropped, stopping host pool");
                            break;
                        }
                    }
                }
                _ = refresh_timer.tick() => {
                    if self.refreshing {
                        debug!("Background refresh still running, skipping tick");
                        continue;
                    }
                    // Routine refresh runs beside the mailbox
                    self.refreshing = true;
                    let prober = self.prober.clone();
                    let backoff = self.config.retry_backoff;
                    let refreshed_tx = refreshed_tx.clone();
                    tokio::spawn(async move {
                        let state = probe_until_available(&prober, backoff).await;
                        let _ = refreshed_tx.send(state).await;
                    });
                }
                Some(state) = refreshed_rx.recv() => {
                    self.refreshing = false;
                    self.state = state;
                    debug!(available = ?self.state.available(), "Background refresh applied");
                }
            }
        }
    }

    async fn handle(&mut self, command: PoolCommand) {
        match command {
            PoolCommand::Select(reply) => {
                if self.state.is_empty() {
                    self.refresh_now().await;
                }
                if let Some(index) = self.state.choose(&mut self.rng) {
                    let _ = reply.send(index);
                }
            }
            PoolCommand::Disable(index) => {
                if self.state.is_empty() {
                    self.refresh_now().await;
                } else if self.state.disable(index) {
                    debug!(index, available = ?self.state.available(), "Host disabled");
                } else {
                    warn!(
                        "Ignoring disable for index {} (pool has {} hosts)",
                        index,
                        self.prober.host_count()
                    );
                }
            }
            PoolCommand::Snapshot(reply) => {
                let _ = reply.send(self.state.available().to_vec());
            }
        }
    }

    /// Blocking re-probe; the mailbox waits until a host is reachable again
    async fn refresh_now(&mut self) {
        warn!("No available proxy host, refreshing before serving requests");
        self.state = probe_until_available(&self.prober, self.config.retry_backoff).await;
    }
}

/// Probe every host, retrying after `backoff` until at least one is reachable
async fn probe_until_available(prober: &BackendProber, backoff: Duration) -> Reachability {
    loop {
        info!("Updating available proxy host list...");
        let state = Reachability::from_table(prober.probe_all().await);

        if !state.is_empty() {
            info!(
                "Available proxy host list is updated: {:?}",
                state.available()
            );
            return state;
        }

        warn!(
            "All hosts are unavailable. Try again after {:?}.",
            backoff
        );
        sleep(backoff).await;
    }
}
