use super::{SettlementHandler, SettlementMetrics};
use crate::{
    chain::{ChainClient, ChainError},
    config::MonitorConfig,
    settle::{Settleable, Settlement, SettlementStatus},
    worker::PauseHandle,
};
use std::{collections::BTreeMap, sync::Arc};
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, error, info, warn};

/// Hands a long-unexecuted settlement back to the head of the settlement queue.
pub type ResendFn<S> = Box<dyn Fn(Settlement<S>) + Send + Sync>;

/// Confirmation state of a sent settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationResult {
    /// None of the sent transactions was executed.
    NotExecuted,
    /// A transaction was executed and reverted.
    ExecutionFailed,
    /// A transaction was executed but its receipt does not match the settlement.
    ReceiptValidationFailed,
    /// A transaction was executed but is not deep enough yet.
    NotConfirmed,
    /// A transaction was executed and is deep enough.
    Confirmed,
}

#[derive(Debug)]
struct State<S> {
    /// Settlements handed over by the settlement worker.
    intake: mpsc::UnboundedReceiver<Settlement<S>>,
    /// Settlements awaiting confirmation, by nonce.
    items: BTreeMap<u64, Settlement<S>>,
}

/// Tracks sent settlements until they are final.
///
/// Settlements are checked in nonce order and the check stops at the first one that is not
/// confirmed, since later nonces can not be executed before it.
pub struct TransactionConfirmationMonitor<S> {
    chain: Arc<dyn ChainClient>,
    config: MonitorConfig,
    paused: PauseHandle,
    state: Mutex<State<S>>,
    resend: ResendFn<S>,
    handler: Arc<dyn SettlementHandler<S>>,
    metrics: Arc<SettlementMetrics>,
}

impl<S> std::fmt::Debug for TransactionConfirmationMonitor<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionConfirmationMonitor")
            .field("chain", &self.chain)
            .field("config", &self.config)
            .field("paused", &self.paused.is_paused())
            .finish_non_exhaustive()
    }
}

impl<S: Settleable> TransactionConfirmationMonitor<S> {
    /// Creates a new [`TransactionConfirmationMonitor`] receiving sent settlements from `intake`.
    pub fn new(
        chain: Arc<dyn ChainClient>,
        config: MonitorConfig,
        paused: PauseHandle,
        intake: mpsc::UnboundedReceiver<Settlement<S>>,
        resend: ResendFn<S>,
    ) -> Self {
        Self {
            chain,
            config,
            paused,
            state: Mutex::new(State { intake, items: BTreeMap::new() }),
            resend,
            handler: Arc::new(()),
            metrics: Arc::new(SettlementMetrics::default()),
        }
    }

    /// Sets the handler notified about failures.
    pub fn with_handler(mut self, handler: Arc<dyn SettlementHandler<S>>) -> Self {
        self.handler = handler;
        self
    }

    /// Sets the metrics to report to.
    pub fn with_metrics(mut self, metrics: Arc<SettlementMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Whether the monitor is paused.
    pub fn is_paused(&self) -> bool {
        self.paused.is_paused()
    }

    /// Pauses or resumes the monitor.
    pub fn set_paused(&self, paused: bool) {
        self.paused.set_paused(paused);
    }

    /// Adds a settlement whose transaction was sent, e.g. reloaded after a restart.
    pub async fn add(&self, settlement: Settlement<S>) -> Result<(), ChainError> {
        let mut state = self.state.lock().await;
        self.drain(&mut state).await?;

        let block_number = self.chain.block_number().await?;
        Self::insert(&mut state, settlement, block_number);
        Ok(())
    }

    /// Number of settlements awaiting confirmation.
    pub async fn pending_count(&self) -> Result<usize, ChainError> {
        let mut state = self.state.lock().await;
        self.drain(&mut state).await?;
        Ok(state.items.len())
    }

    /// Nonces of the settlements awaiting confirmation, ascending.
    pub async fn nonces(&self) -> Result<Vec<u64>, ChainError> {
        let mut state = self.state.lock().await;
        self.drain(&mut state).await?;
        Ok(state.items.keys().copied().collect())
    }

    /// Stops tracking the settlement sent with `nonce`.
    pub async fn remove(&self, nonce: u64) -> Result<Option<Settlement<S>>, ChainError> {
        let mut state = self.state.lock().await;
        self.drain(&mut state).await?;
        Ok(state.items.remove(&nonce))
    }

    /// Checks the settlement sent with `nonce` without changing it.
    pub async fn check_confirmation(
        &self,
        nonce: u64,
    ) -> Result<Option<ConfirmationResult>, ChainError> {
        let mut state = self.state.lock().await;
        self.drain(&mut state).await?;

        let confirmed = self.confirmed_block_number().await?;
        match state.items.get_mut(&nonce) {
            Some(settlement) => Ok(Some(self.classify(settlement, confirmed).await?.0)),
            None => Ok(None),
        }
    }

    /// Runs one confirmation cycle, returning the number of confirmed settlements.
    pub async fn update(&self) -> Result<usize, ChainError> {
        if self.is_paused() {
            return Ok(0);
        }

        let mut state = self.state.lock().await;
        self.drain(&mut state).await?;

        let confirmed = self.confirmed_block_number().await?;
        let mut result = ConfirmationResult::Confirmed;
        let mut num_confirmed = 0;

        while result == ConfirmationResult::Confirmed && !self.is_paused() {
            let Some(mut entry) = state.items.first_entry() else { break };
            let nonce = *entry.key();

            let sent_block = entry
                .get()
                .recorder()
                .and_then(|recorder| recorder.last().sent_block)
                .unwrap_or_default();
            if sent_block > confirmed {
                break;
            }

            let (checked, executed_block) = self.classify(entry.get_mut(), confirmed).await?;
            result = checked;

            match result {
                ConfirmationResult::NotExecuted => {
                    if confirmed - sent_block < self.config.long_unexecuted_blocks {
                        break;
                    }

                    let mut settlement = entry.remove();
                    if let Some(recorder) = settlement.recorder_mut() {
                        recorder.mark_last_long_unexecuted();
                    }
                    warn!(nonce, sent_block, confirmed, "Transaction long unexecuted, resending");
                    self.metrics.long_unexecuted.increment(1);
                    self.handler.on_transaction_long_unexecuted(&settlement);
                    (self.resend)(settlement);
                }
                ConfirmationResult::ExecutionFailed => {
                    let mut settlement = entry.remove();
                    settlement.update_status(SettlementStatus::OnChainFailed);
                    self.metrics.failed.increment(1);

                    if settlement.item().suppress_on_chain_failure() {
                        info!(nonce, "Transaction failed on chain, suppressed");
                    } else {
                        error!(nonce, ?settlement, "Transaction failed on chain, pausing");
                        self.paused.set_paused(true);
                        self.handler.on_transaction_failure(&settlement);
                    }
                }
                ConfirmationResult::ReceiptValidationFailed => {
                    let mut settlement = entry.remove();
                    settlement.update_status(SettlementStatus::OnChainReceiptValidationFailed);
                    self.metrics.failed.increment(1);

                    error!(nonce, ?settlement, "Receipt validation failed, pausing");
                    self.paused.set_paused(true);
                    self.handler.on_transaction_failure(&settlement);
                }
                ConfirmationResult::NotConfirmed => {}
                ConfirmationResult::Confirmed => {
                    let mut settlement = entry.remove();
                    settlement.update_status(SettlementStatus::OnChainConfirmed);
                    num_confirmed += 1;

                    self.metrics.confirmed.increment(1);
                    if let Some(executed_block) = executed_block {
                        self.metrics
                            .confirmation_blocks
                            .record(executed_block.saturating_sub(sent_block) as f64);
                    }
                    debug!(nonce, "Settlement confirmed");
                }
            }
        }

        self.metrics.pending.set(state.items.len() as f64);
        Ok(num_confirmed)
    }

    /// Runs confirmation cycles forever.
    pub async fn run(self: Arc<Self>) {
        loop {
            tokio::time::sleep(self.config.interval).await;
            if let Err(err) = self.update().await {
                warn!(%err, "Failed to update transaction confirmations");
            }
        }
    }

    async fn confirmed_block_number(&self) -> Result<u64, ChainError> {
        let confirmed = self.chain.confirmed_block_number().await?;
        Ok(confirmed.saturating_sub(self.config.extra_confirmations))
    }

    /// Moves settlements handed over by the worker into the tracked set.
    async fn drain(&self, state: &mut State<S>) -> Result<(), ChainError> {
        if state.intake.is_empty() {
            return Ok(());
        }

        let block_number = self.chain.block_number().await?;
        while let Ok(settlement) = state.intake.try_recv() {
            Self::insert(state, settlement, block_number);
        }
        self.metrics.pending.set(state.items.len() as f64);
        Ok(())
    }

    fn insert(state: &mut State<S>, mut settlement: Settlement<S>, block_number: u64) {
        let Some(recorder) = settlement.recorder_mut() else {
            warn!(?settlement, "Ignoring settlement without transaction");
            return;
        };
        recorder.set_sent_block_if_missing(block_number);

        let nonce = recorder.nonce();
        if let Some(replaced) = state.items.insert(nonce, settlement) {
            warn!(nonce, ?replaced, "Replaced tracked settlement with the same nonce");
        }
    }

    /// Classifies a settlement, returning the block its transaction was executed in.
    async fn classify(
        &self,
        settlement: &mut Settlement<S>,
        confirmed: u64,
    ) -> Result<(ConfirmationResult, Option<u64>), ChainError> {
        let Some(recorder) = settlement.recorder() else {
            return Ok((ConfirmationResult::NotExecuted, None));
        };

        let Some(receipt) = recorder.receipt(self.chain.as_ref()).await? else {
            return Ok((ConfirmationResult::NotExecuted, None));
        };

        // an earlier variant was executed instead of the last one
        if recorder.last().tx_hash != receipt.transaction_hash {
            settlement.update_executed_tx(receipt.transaction_hash);
        }

        let result = if !receipt.status {
            ConfirmationResult::ExecutionFailed
        } else if !settlement.item().matches(&receipt) {
            ConfirmationResult::ReceiptValidationFailed
        } else if receipt.block_number <= confirmed {
            ConfirmationResult::Confirmed
        } else {
            ConfirmationResult::NotConfirmed
        };

        Ok((result, Some(receipt.block_number)))
    }
}
