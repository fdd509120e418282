//! Settlement end-to-end test environment

use alloy::{
    primitives::{Address, B256, Bytes, address},
    signers::local::PrivateKeySigner,
};
use settler::{
    chain::{ChainError, InMemoryChain, Receipt},
    config::{MonitorConfig, SettlementConfig, WorkerConfig},
    error::SettlementError,
    settle::{Settleable, Settlement, SettlementContext, SettlementStatus},
    signers::WalletSigner,
    storage::SettlementStorage,
    transactions::{SettlementHandler, SettlementWorker, TransactionRelayer},
    worker::Batchable,
};
use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

/// Settlement contract used by every test.
pub const CONTRACT: Address = address!("5e5e5e5e5e5e5e5e5e5e5e5e5e5e5e5e5e5e5e5e");

/// A change of a [`Payout`] observed through its hooks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Update {
    Status(SettlementStatus),
    Transaction(SettlementStatus, B256, u64),
}

/// Off-chain payouts settled on chain, merged into batches.
#[derive(Debug, Clone)]
pub struct Payout {
    pub ids: Vec<u64>,
    pub updates: Arc<Mutex<Vec<Update>>>,
    /// Whether receipts match the payout.
    pub valid: bool,
    pub suppress_failure: bool,
}

impl Payout {
    pub fn new(id: u64) -> Self {
        Self { ids: vec![id], updates: Default::default(), valid: true, suppress_failure: false }
    }

    pub fn updates(&self) -> Vec<Update> {
        self.updates.lock().unwrap().clone()
    }

    pub fn statuses(&self) -> Vec<SettlementStatus> {
        self.updates()
            .into_iter()
            .map(|update| match update {
                Update::Status(status) | Update::Transaction(status, ..) => status,
            })
            .collect()
    }
}

impl Batchable for Payout {
    fn batch_with(&mut self, other: Self) -> Result<(), Self> {
        self.ids.extend(other.ids);
        Ok(())
    }

    fn size(&self) -> usize {
        self.ids.len()
    }
}

impl Settleable for Payout {
    fn settlement_context(&self, config: &SettlementConfig) -> eyre::Result<SettlementContext> {
        let data: Vec<u8> = self.ids.iter().flat_map(|id| id.to_be_bytes()).collect();
        Ok(SettlementContext::new(config.contract.default, Bytes::from(data), 100_000))
    }

    fn update_status(&mut self, status: SettlementStatus) {
        self.updates.lock().unwrap().push(Update::Status(status));
    }

    fn update_transaction(&mut self, status: SettlementStatus, tx_hash: B256, nonce: u64) {
        self.updates.lock().unwrap().push(Update::Transaction(status, tx_hash, nonce));
    }

    fn matches(&self, _receipt: &Receipt) -> bool {
        self.valid
    }

    fn suppress_on_chain_failure(&self) -> bool {
        self.suppress_failure
    }
}

/// Events reported to the [`SettlementHandler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    LongUnexecuted(Vec<u64>),
    Failure(Vec<u64>),
    NonceTooFuture(u64, u64),
    PoolFull(Vec<u64>),
    UnexpectedError(Vec<u64>),
    Exception(Vec<u64>),
}

#[derive(Debug, Default)]
pub struct RecordingHandler {
    pub events: Mutex<Vec<Event>>,
}

impl RecordingHandler {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    fn push(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

impl SettlementHandler<Payout> for RecordingHandler {
    fn on_transaction_long_unexecuted(&self, settlement: &Settlement<Payout>) {
        self.push(Event::LongUnexecuted(settlement.item().ids.clone()));
    }

    fn on_transaction_failure(&self, settlement: &Settlement<Payout>) {
        self.push(Event::Failure(settlement.item().ids.clone()));
    }

    fn on_nonce_too_future(&self, working_nonce: u64, on_chain_nonce: u64) {
        self.push(Event::NonceTooFuture(working_nonce, on_chain_nonce));
    }

    fn on_transaction_pool_full(&self, settlement: &Settlement<Payout>) {
        self.push(Event::PoolFull(settlement.item().ids.clone()));
    }

    fn on_unexpected_transaction_error(&self, settlement: &Settlement<Payout>, _err: &ChainError) {
        self.push(Event::UnexpectedError(settlement.item().ids.clone()));
    }

    fn on_exception(&self, settlement: &Settlement<Payout>, _err: &SettlementError) {
        self.push(Event::Exception(settlement.item().ids.clone()));
    }
}

/// All settings for configuring the [`Environment`].
#[derive(Debug, Clone)]
pub struct EnvironmentConfig {
    pub confirmations: u64,
    pub settlement: SettlementConfig,
    pub relayer: Option<TransactionRelayer>,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            confirmations: 2,
            settlement: SettlementConfig::default()
                .with_contract(CONTRACT)
                .with_worker_config(WorkerConfig { wait_countdown: 0, ..Default::default() })
                .with_monitor_config(MonitorConfig {
                    long_unexecuted_blocks: 10,
                    extra_confirmations: 0,
                    // cycles are driven by the tests
                    interval: Duration::from_secs(24 * 3600),
                }),
            relayer: None,
        }
    }
}

/// A settlement pipeline on top of an [`InMemoryChain`].
#[derive(Debug)]
pub struct Environment {
    pub chain: Arc<InMemoryChain>,
    pub storage: SettlementStorage,
    pub signer: PrivateKeySigner,
    pub handler: Arc<RecordingHandler>,
    pub worker: SettlementWorker<Payout>,
    pub config: EnvironmentConfig,
}

impl Environment {
    pub async fn setup() -> eyre::Result<Self> {
        Self::setup_with_config(EnvironmentConfig::default()).await
    }

    pub async fn setup_with_config(config: EnvironmentConfig) -> eyre::Result<Self> {
        let chain = Arc::new(InMemoryChain::new(config.confirmations));
        Self::spawn(chain, SettlementStorage::in_memory(), PrivateKeySigner::random(), config)
            .await
    }

    /// Spawns a pipeline on existing state, as after a restart.
    pub async fn spawn(
        chain: Arc<InMemoryChain>,
        storage: SettlementStorage,
        signer: PrivateKeySigner,
        config: EnvironmentConfig,
    ) -> eyre::Result<Self> {
        let handler = Arc::new(RecordingHandler::default());
        let worker = SettlementWorker::spawn(
            Arc::new(config.settlement.clone()),
            chain.clone(),
            Arc::new(WalletSigner::new(signer.clone(), config.settlement.chain.chain_id)),
            storage.clone(),
            handler.clone(),
            config.relayer.clone(),
        )
        .await?;

        Ok(Self { chain, storage, signer, handler, worker, config })
    }

    /// Drops the pipeline and spawns a new one on the same chain and storage.
    pub async fn restart(self) -> eyre::Result<Self> {
        let Self { chain, storage, signer, config, worker, .. } = self;
        drop(worker);
        Self::spawn(chain, storage, signer, config).await
    }

    /// Lets the pipeline work through its queue.
    pub async fn settle(&self) {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    /// Mines the last sent transaction and enough blocks on top of it to confirm it.
    pub fn mine_last_and_confirm(&self, success: bool) {
        let sent = self.chain.last_sent().expect("a sent transaction");
        assert!(self.chain.mine(sent.hash, success));
        self.chain.advance_blocks(self.config.confirmations);
    }
}
