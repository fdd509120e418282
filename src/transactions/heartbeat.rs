use super::HeartBeatMetrics;
use crate::chain::{ChainClient, ChainError};
use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};
use tracing::{trace, warn};

/// Callbacks for a failing [`HeartBeat`].
pub trait HeartBeatHandler: Send + Sync {
    /// The node could not be reached. `errors` is the number of consecutive failed beats.
    fn on_io_error(&self, _err: &ChainError, _errors: u64) {}

    /// The node answered with an error. `errors` is the number of consecutive failed beats.
    fn on_unexpected_error(&self, _err: &ChainError, _errors: u64) {}
}

impl HeartBeatHandler for () {}

/// Periodically polls the latest block number to detect an unhealthy node.
pub struct HeartBeat {
    chain: Arc<dyn ChainClient>,
    handler: Arc<dyn HeartBeatHandler>,
    block_number: AtomicU64,
    errors: AtomicU64,
    metrics: HeartBeatMetrics,
}

impl std::fmt::Debug for HeartBeat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeartBeat")
            .field("chain", &self.chain)
            .field("block_number", &self.block_number())
            .field("errors", &self.error_count())
            .finish()
    }
}

impl HeartBeat {
    /// Creates a new [`HeartBeat`].
    pub fn new(chain: Arc<dyn ChainClient>, handler: Arc<dyn HeartBeatHandler>) -> Self {
        Self {
            chain,
            handler,
            block_number: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            metrics: HeartBeatMetrics::default(),
        }
    }

    /// Latest block number seen, `0` before the first successful beat.
    pub fn block_number(&self) -> u64 {
        self.block_number.load(Ordering::Relaxed)
    }

    /// Number of consecutive failed beats.
    pub fn error_count(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Polls the node once.
    pub async fn beat(&self) -> Result<u64, ChainError> {
        match self.chain.block_number().await {
            Ok(block_number) => {
                trace!(block_number, "Heartbeat");
                self.block_number.store(block_number, Ordering::Relaxed);
                self.errors.store(0, Ordering::Relaxed);
                self.metrics.block_number.set(block_number as f64);
                self.metrics.consecutive_errors.set(0.0);
                Ok(block_number)
            }
            Err(err) => {
                let errors = self.errors.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(%err, errors, "Heartbeat failed");
                self.metrics.errors.increment(1);
                self.metrics.consecutive_errors.set(errors as f64);
                if err.is_transport() {
                    self.handler.on_io_error(&err, errors);
                } else {
                    self.handler.on_unexpected_error(&err, errors);
                }
                Err(err)
            }
        }
    }

    /// Beats every `interval`, forever.
    pub async fn run(self: Arc<Self>, interval: Duration) {
        loop {
            let _ = self.beat().await;
            tokio::time::sleep(interval).await;
        }
    }
}
