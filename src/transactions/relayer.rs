use super::RelayMetrics;
use crate::{
    chain::{ChainClient, ChainError, EvmClient},
    config::RelayConfig,
    worker::{AsyncWorker, WorkError, Worker},
};
use alloy::primitives::Bytes;
use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::future::join_all;
use std::{
    collections::BTreeMap,
    convert::Infallible,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

/// Counters of a [`RelayServer`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Number of broadcasts.
    pub num_total: u64,
    /// Number of broadcasts rejected by the node.
    pub num_rpc_errors: u64,
    /// Number of broadcasts that failed to reach the node.
    pub num_io_errors: u64,
    /// Number of broadcasts that failed otherwise.
    pub num_unknown_errors: u64,
    /// Whether the server is currently skipped.
    pub skipped: bool,
}

/// A redundant endpoint signed transactions are broadcast to.
///
/// The endpoint is skipped for a while after too many consecutive errors that were not answered
/// by the node itself.
pub struct RelayServer {
    id: String,
    client: Arc<dyn ChainClient>,
    num_total: AtomicU64,
    num_rpc_errors: AtomicU64,
    num_io_errors: AtomicU64,
    num_unknown_errors: AtomicU64,
    consecutive_errors: AtomicU64,
    skipped_since: Mutex<Option<Instant>>,
    metrics: RelayMetrics,
}

impl std::fmt::Debug for RelayServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayServer").field("id", &self.id).field("stats", &self.stats()).finish()
    }
}

impl RelayServer {
    /// Creates a new [`RelayServer`].
    pub fn new(id: impl Into<String>, client: Arc<dyn ChainClient>) -> Self {
        let id = id.into();
        Self {
            metrics: RelayMetrics::new_with_labels(&[("endpoint", id.clone())]),
            id,
            client,
            num_total: AtomicU64::new(0),
            num_rpc_errors: AtomicU64::new(0),
            num_io_errors: AtomicU64::new(0),
            num_unknown_errors: AtomicU64::new(0),
            consecutive_errors: AtomicU64::new(0),
            skipped_since: Mutex::new(None),
        }
    }

    /// Endpoint id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> RelayStats {
        RelayStats {
            num_total: self.num_total.load(Ordering::Relaxed),
            num_rpc_errors: self.num_rpc_errors.load(Ordering::Relaxed),
            num_io_errors: self.num_io_errors.load(Ordering::Relaxed),
            num_unknown_errors: self.num_unknown_errors.load(Ordering::Relaxed),
            skipped: self.skipped_since().is_some(),
        }
    }

    fn skipped_since(&self) -> std::sync::MutexGuard<'_, Option<Instant>> {
        self.skipped_since.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Whether the server is skipped, clearing the skip window once it elapsed.
    fn check_skipped(&self, config: &RelayConfig) -> bool {
        let mut skipped_since = self.skipped_since();
        let Some(since) = *skipped_since else { return false };

        if since.elapsed() <= config.skip_timeout {
            return true;
        }

        info!(endpoint = %self.id, "Relay endpoint resumed");
        *skipped_since = None;
        false
    }

    /// Broadcasts a signed transaction unless the server is skipped.
    pub async fn send(&self, raw: &Bytes, config: &RelayConfig) {
        if self.check_skipped(config) {
            self.metrics.skipped.increment(1);
            return;
        }

        let result =
            tokio::time::timeout(config.request_timeout, self.client.send_raw_transaction(raw))
                .await
                .unwrap_or_else(|_| Err(ChainError::Transport("request timed out".to_string())));

        match result {
            Ok(tx_hash) => {
                debug!(endpoint = %self.id, %tx_hash, "Relayed transaction");
                self.consecutive_errors.store(0, Ordering::Relaxed);
            }
            Err(ChainError::Rejected { message, .. }) => {
                debug!(endpoint = %self.id, %message, "Relayed transaction rejected");
                self.num_rpc_errors.fetch_add(1, Ordering::Relaxed);
                self.metrics.rpc_errors.increment(1);
                self.consecutive_errors.store(0, Ordering::Relaxed);
            }
            Err(ChainError::Transport(err)) => {
                debug!(endpoint = %self.id, %err, "Failed to relay transaction");
                self.num_io_errors.fetch_add(1, Ordering::Relaxed);
                self.metrics.io_errors.increment(1);
                self.consecutive_errors.fetch_add(1, Ordering::Relaxed);
            }
            Err(ChainError::Unknown(err)) => {
                debug!(endpoint = %self.id, %err, "Failed to relay transaction");
                self.num_unknown_errors.fetch_add(1, Ordering::Relaxed);
                self.metrics.unknown_errors.increment(1);
                self.consecutive_errors.fetch_add(1, Ordering::Relaxed);
            }
        }

        self.num_total.fetch_add(1, Ordering::Relaxed);
        self.metrics.sent.increment(1);

        if self.consecutive_errors.load(Ordering::Relaxed) >= config.errors_to_skip {
            warn!(endpoint = %self.id, skip_timeout = ?config.skip_timeout, "Skipping relay endpoint");
            self.consecutive_errors.store(0, Ordering::Relaxed);
            *self.skipped_since() = Some(Instant::now());
        }
    }
}

/// [`Worker`] broadcasting each payload to every registered server.
#[derive(Debug)]
pub struct Relay {
    servers: DashMap<String, Arc<RelayServer>>,
    config: RelayConfig,
}

impl Relay {
    async fn broadcast(&self, raw: &Bytes) {
        // do not hold the map across the broadcasts
        let servers: Vec<_> = self.servers.iter().map(|server| server.value().clone()).collect();
        join_all(servers.iter().map(|server| server.send(raw, &self.config))).await;
    }
}

#[async_trait]
impl Worker for Relay {
    type Item = Bytes;
    type Error = Infallible;

    async fn work(&self, raw: &mut Bytes) -> Result<(), WorkError<Infallible>> {
        self.broadcast(raw).await;
        Ok(())
    }

    fn on_failure(&self, _raw: &Bytes, _err: &Infallible) {}
}

/// Broadcasts signed transactions to redundant endpoints, so that a single flaky node does not
/// delay their propagation.
#[derive(Debug, Clone)]
pub struct TransactionRelayer {
    worker: AsyncWorker<Relay>,
}

impl TransactionRelayer {
    /// Creates a relayer without endpoints.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    pub fn new(config: RelayConfig) -> Self {
        Self { worker: AsyncWorker::new(Relay { servers: DashMap::new(), config }) }
    }

    /// Creates a relayer broadcasting to the configured endpoints.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    pub fn from_config(config: RelayConfig) -> Self {
        let endpoints = config.endpoints.clone();
        let relayer = Self::new(config);
        for endpoint in endpoints {
            relayer.add_server(endpoint);
        }
        relayer
    }

    /// Adds a JSON-RPC endpoint.
    pub fn add_server(&self, endpoint: Url) {
        let id = endpoint.to_string();
        self.add_endpoint(&id, Arc::new(EvmClient::connect_http(endpoint, 0)));
    }

    /// Adds an endpoint backed by any [`ChainClient`]. Ids are case insensitive.
    pub fn add_endpoint(&self, id: &str, client: Arc<dyn ChainClient>) {
        let id = id.to_lowercase();
        self.worker
            .worker()
            .servers
            .entry(id.clone())
            .or_insert_with(|| Arc::new(RelayServer::new(id, client)));
    }

    /// Removes an endpoint, returning whether it was registered.
    pub fn remove_server(&self, id: &str) -> bool {
        self.worker.worker().servers.remove(&id.to_lowercase()).is_some()
    }

    /// Returns a registered endpoint.
    pub fn server(&self, id: &str) -> Option<Arc<RelayServer>> {
        self.worker.worker().servers.get(&id.to_lowercase()).map(|server| server.value().clone())
    }

    /// Queues a signed transaction for broadcasting.
    pub fn submit(&self, raw: Bytes) {
        self.worker.submit(raw);
    }

    /// Broadcasts a signed transaction right away, bypassing the queue.
    pub async fn broadcast(&self, raw: &Bytes) {
        self.worker.worker().broadcast(raw).await;
    }

    /// Number of queued transactions.
    pub fn pending_count(&self) -> usize {
        self.worker.pending_count()
    }

    /// Counters of every endpoint.
    pub fn stats(&self) -> BTreeMap<String, RelayStats> {
        self.worker
            .worker()
            .servers
            .iter()
            .map(|server| (server.key().clone(), server.stats()))
            .collect()
    }
}
