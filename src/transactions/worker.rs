use super::{
    ResendFn, SettlementHandler, SettlementMetrics, TransactionConfirmationMonitor,
    TransactionRelayer, fees::replacement_gas_price,
};
use crate::{
    chain::{ChainClient, ChainError, RejectReason},
    config::SettlementConfig,
    error::SettlementError,
    nonce::{NonceSyncer, WorkingNonce},
    settle::{Record, Settleable, Settlement, SettlementStatus},
    signers::TransactionSigner,
    storage::{SettlementStorage, StorageApi},
    worker::{AsyncWorker, BatchWorker, Batchable, PauseHandle, WorkError, Worker},
};
use alloy::primitives::Address;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, error, info, warn};

/// Result of handling a single settlement.
type WorkResult<T = ()> = Result<T, WorkError<SettlementError>>;

/// [`Worker`] signing and sending settlement transactions.
pub struct Settler<S> {
    chain: Arc<dyn ChainClient>,
    signer: Arc<dyn TransactionSigner>,
    storage: SettlementStorage,
    config: Arc<SettlementConfig>,
    nonce: WorkingNonce,
    paused: PauseHandle,
    handler: Arc<dyn SettlementHandler<S>>,
    relayer: Option<TransactionRelayer>,
    /// Sent settlements handed over to the confirmation monitor.
    sent_tx: mpsc::UnboundedSender<Settlement<S>>,
    metrics: Arc<SettlementMetrics>,
}

impl<S> std::fmt::Debug for Settler<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settler")
            .field("chain", &self.chain)
            .field("signer", &self.signer)
            .field("nonce", &self.nonce.get())
            .field("paused", &self.paused.is_paused())
            .finish_non_exhaustive()
    }
}

impl<S: Settleable> Settler<S> {
    fn address(&self) -> Address {
        self.signer.address()
    }

    /// Maps chain errors outside of a send: transport errors are retried, everything else fails.
    fn chain_error(&self, err: ChainError) -> WorkError<SettlementError> {
        if err.is_transport() {
            return WorkError::pending(self.config.worker.io_retry_interval, err.to_string());
        }
        WorkError::Failed(err.into())
    }

    /// Holds back new transactions while too many are pending.
    ///
    /// The on-chain nonce is only fetched whenever the working nonce crosses a multiple of the
    /// check interval.
    async fn check_nonce_budget(&self) -> WorkResult {
        let working = self.nonce.get();
        let config = &self.config.nonce;
        if config.check_interval == 0 || working % config.check_interval != 0 {
            return Ok(());
        }

        let on_chain = self.chain.get_nonce(self.address()).await.map_err(|e| self.chain_error(e))?;
        if on_chain.saturating_add(config.too_future_threshold) >= working {
            return Ok(());
        }

        warn!(working, on_chain, "Working nonce too far ahead of the chain");
        self.handler.on_nonce_too_future(working, on_chain);
        Err(WorkError::pending(self.config.worker.pause_interval, "nonce too future"))
    }

    /// Whether a (new) transaction has to be sent for the settlement.
    async fn needs_send(&self, settlement: &Settlement<S>) -> WorkResult<bool> {
        let Some(recorder) = settlement.recorder() else { return Ok(true) };
        if recorder.last().long_unexecuted {
            return Ok(true);
        }

        let exists =
            recorder.is_tx_exists(self.chain.as_ref()).await.map_err(|e| self.chain_error(e))?;
        Ok(!exists)
    }

    /// Signs and sends a transaction for the settlement.
    async fn send(&self, settlement: &mut Settlement<S>) -> WorkResult {
        let last = settlement.recorder().map(|recorder| recorder.last().clone());
        let resend = last.is_some();

        // once sent, every attempt of a settlement shares the same nonce
        let working = self.nonce.get();
        let nonce = settlement.nonce().unwrap_or(working);

        let gas_price = match last {
            Some(Record { gas_price: Some(previous), long_unexecuted: true, .. }) => {
                let network = self.chain.gas_price().await.map_err(|e| self.chain_error(e))?;
                replacement_gas_price(previous, network)
            }
            Some(Record { gas_price: Some(previous), .. }) => previous,
            _ => self.chain.gas_price().await.map_err(|e| self.chain_error(e))?,
        };

        let context = settlement
            .item()
            .settlement_context(&self.config)
            .map_err(|err| WorkError::Failed(err.into()))?;
        let signed = self
            .signer
            .sign(&context, nonce, gas_price)
            .await
            .map_err(|err| WorkError::Failed(err.into()))?;

        // only transactions claiming the working nonce are persisted
        if nonce >= working {
            self.storage
                .write_last_transaction(signed.hash, nonce)
                .await
                .map_err(|err| WorkError::Failed(err.into()))?;
        }
        settlement.record_sent(signed.hash, nonce, gas_price);

        let relay = match self.chain.send_raw_transaction(&signed.raw).await {
            Ok(_) => true,
            Err(err) => {
                self.metrics.send_errors.increment(1);
                self.on_send_error(settlement, err, resend, nonce).await?
            }
        };

        debug!(tx_hash = %signed.hash, nonce, gas_price, resend, "Sent settlement transaction");
        if resend {
            self.metrics.resent.increment(1);
        } else {
            self.metrics.sent.increment(1);
        }

        self.nonce.advance_past(nonce);
        if let Some(relayer) = self.relayer.as_ref().filter(|_| relay) {
            relayer.submit(signed.raw);
        }

        Ok(())
    }

    /// Classifies a rejected send.
    ///
    /// Returns whether the transaction counts as sent and should be relayed. Anything else is
    /// returned as an error, retried by the [`AsyncWorker`].
    async fn on_send_error(
        &self,
        settlement: &mut Settlement<S>,
        err: ChainError,
        resend: bool,
        nonce: u64,
    ) -> WorkResult<bool> {
        let config = &self.config.worker;

        match err.reject_reason() {
            Some(RejectReason::AlreadyKnown) => Ok(true),
            Some(RejectReason::NonceTooLow) if resend => {
                // a previous transaction of this settlement may have been executed meanwhile
                let receipt = match settlement.recorder() {
                    Some(recorder) => recorder
                        .receipt(self.chain.as_ref())
                        .await
                        .map_err(|e| self.chain_error(e))?,
                    None => None,
                };
                if receipt.is_some() {
                    debug!(nonce, "Replaced transaction already executed");
                    return Ok(false);
                }

                error!(nonce, ?settlement, "Nonce used by a foreign transaction, pausing");
                self.paused.set_paused(true);
                Err(WorkError::Failed(SettlementError::NonceConflict { nonce }))
            }
            Some(RejectReason::NonceTooLow) => {
                // nothing of this attempt was accepted, retry it as a fresh settlement
                settlement.discard_recorder();
                let pending = self
                    .chain
                    .get_pending_nonce(self.address())
                    .await
                    .map_err(|e| self.chain_error(e))?;
                warn!(nonce, pending, "Nonce too low, synchronizing");
                self.nonce.sync_up(pending);
                Err(WorkError::pending(config.io_retry_interval, "nonce too low"))
            }
            Some(RejectReason::PoolFull) => {
                warn!(nonce, "Transaction pool is full");
                self.handler.on_transaction_pool_full(settlement);
                Err(WorkError::pending(config.pause_interval, "transaction pool is full"))
            }
            Some(RejectReason::Underpriced | RejectReason::ReplacementUnderpriced) => {
                if let Some(recorder) = settlement.recorder_mut() {
                    recorder.mark_last_long_unexecuted();
                }
                Err(WorkError::pending(config.underpriced_retry_interval, "transaction underpriced"))
            }
            _ if err.is_transport() => {
                Err(WorkError::pending(config.io_retry_interval, err.to_string()))
            }
            _ => {
                error!(%err, nonce, "Unexpected transaction error, pausing");
                self.paused.set_paused(true);
                self.handler.on_unexpected_transaction_error(settlement, &err);
                Err(WorkError::pending(config.pause_interval, err.to_string()))
            }
        }
    }
}

#[async_trait]
impl<S: Settleable> Worker for Settler<S> {
    type Item = Settlement<S>;
    type Error = SettlementError;

    async fn work(&self, settlement: &mut Settlement<S>) -> WorkResult {
        self.check_nonce_budget().await?;

        if self.needs_send(settlement).await? {
            self.send(settlement).await?;
        } else {
            debug!(nonce = ?settlement.nonce(), "Transaction already known, monitoring only");
        }

        settlement.update_status(SettlementStatus::OnChainSettled);
        Ok(())
    }

    fn complete(&self, settlement: Settlement<S>) {
        self.metrics.queued.decrement(settlement.size() as f64);
        if let Err(err) = self.sent_tx.send(settlement) {
            error!(settlement = ?err.0, "Confirmation monitor is gone");
        }
    }

    fn on_failure(&self, settlement: &Settlement<S>, err: &SettlementError) {
        error!(%err, ?settlement, "Failed to settle");
        self.handler.on_exception(settlement, err);
    }
}

/// Settles items on chain.
///
/// Items are batched, signed and sent in order by a pausable [`AsyncWorker`], then tracked by a
/// [`TransactionConfirmationMonitor`] until they are confirmed. Long unexecuted transactions are
/// handed back to the head of the queue and replaced with a higher gas price.
pub struct SettlementWorker<S: Settleable> {
    worker: AsyncWorker<BatchWorker<Settler<S>>>,
    monitor: Arc<TransactionConfirmationMonitor<S>>,
    monitor_task: JoinHandle<()>,
    nonce: WorkingNonce,
    metrics: Arc<SettlementMetrics>,
}

impl<S: Settleable> std::fmt::Debug for SettlementWorker<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettlementWorker")
            .field("worker", &self.worker)
            .field("monitor", &self.monitor)
            .field("nonce", &self.nonce.get())
            .finish_non_exhaustive()
    }
}

impl<S: Settleable> SettlementWorker<S> {
    /// Reconciles the nonce of the signer and spawns the settlement pipeline.
    ///
    /// Items restored after a restart should be submitted with
    /// [`Settlement::restore`]: they are only resent if their transaction is unknown to the chain.
    pub async fn spawn(
        config: Arc<SettlementConfig>,
        chain: Arc<dyn ChainClient>,
        signer: Arc<dyn TransactionSigner>,
        storage: SettlementStorage,
        handler: Arc<dyn SettlementHandler<S>>,
        relayer: Option<TransactionRelayer>,
    ) -> Result<Self, SettlementError> {
        let address = signer.address();
        let nonce = WorkingNonce::new(chain.get_pending_nonce(address).await?);
        let sync = NonceSyncer::new(chain.clone(), storage.clone(), address).sync(&nonce).await?;

        let paused = PauseHandle::default();
        let metrics = Arc::new(SettlementMetrics::default());
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();

        let settler = Settler {
            chain: chain.clone(),
            signer,
            storage,
            config: config.clone(),
            nonce: nonce.clone(),
            paused: paused.clone(),
            handler: handler.clone(),
            relayer,
            sent_tx,
            metrics: metrics.clone(),
        };
        let worker = AsyncWorker::with_pause(
            BatchWorker::new(
                settler,
                config.worker.batch_size,
                config.worker.wait_countdown,
                config.worker.wait_interval,
            ),
            paused.clone(),
            config.worker.pause_interval,
        );

        let resend: ResendFn<S> = {
            let worker = worker.clone();
            let metrics = metrics.clone();
            Box::new(move |settlement| {
                metrics.queued.increment(settlement.size() as f64);
                worker.submit_first(settlement)
            })
        };
        let monitor = Arc::new(
            TransactionConfirmationMonitor::new(
                chain,
                config.monitor.clone(),
                paused,
                sent_rx,
                resend,
            )
            .with_handler(handler)
            .with_metrics(metrics.clone()),
        );
        let monitor_task = tokio::spawn(monitor.clone().run());

        info!(%address, nonce = nonce.get(), ?sync, "Settlement worker started");

        Ok(Self { worker, monitor, monitor_task, nonce, metrics })
    }

    /// Queues a settlement.
    pub fn submit(&self, settlement: Settlement<S>) {
        self.metrics.queued.increment(settlement.size() as f64);
        self.worker.submit(settlement);
    }

    /// Queues a settlement ahead of all others.
    pub fn submit_first(&self, settlement: Settlement<S>) {
        self.metrics.queued.increment(settlement.size() as f64);
        self.worker.submit_first(settlement);
    }

    /// Number of settlements waiting to be sent.
    pub fn pending_count(&self) -> usize {
        self.worker.pending_count()
    }

    /// The nonce of the next fresh transaction.
    pub fn working_nonce(&self) -> u64 {
        self.nonce.get()
    }

    /// Whether the pipeline is paused.
    pub fn is_paused(&self) -> bool {
        self.worker.is_paused()
    }

    /// Pauses or resumes both the worker and the monitor.
    pub fn set_paused(&self, paused: bool) {
        if paused != self.is_paused() {
            info!(paused, "Settlement pipeline pause changed");
        }
        self.worker.set_paused(paused);
    }

    /// The confirmation monitor of this pipeline.
    pub fn monitor(&self) -> &Arc<TransactionConfirmationMonitor<S>> {
        &self.monitor
    }

    /// The relayer transactions are broadcast to, if any.
    pub fn relayer(&self) -> Option<&TransactionRelayer> {
        self.worker.worker().inner().relayer.as_ref()
    }
}

impl<S: Settleable> Drop for SettlementWorker<S> {
    fn drop(&mut self) {
        self.monitor_task.abort();
    }
}
