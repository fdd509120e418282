//! Settlement items and their life-cycle.

mod context;
pub use context::SettlementContext;

mod recorder;
pub use recorder::{Record, TransactionRecorder};

use crate::{chain::Receipt, config::SettlementConfig, worker::Batchable};
use alloy::primitives::B256;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Status of a settlement.
///
/// A settlement moves from [`SettlementStatus::OffChainSettled`] to
/// [`SettlementStatus::OnChainConfirmed`], going back to
/// [`SettlementStatus::OffChainSettled`] every time it is resent.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SettlementStatus {
    /// Settled off chain, transaction signed but not yet accepted by a node.
    #[default]
    OffChainSettled,
    /// Transaction accepted by a node.
    OnChainSettled,
    /// Transaction executed and buried deep enough.
    OnChainConfirmed,
    /// Transaction executed but reverted.
    OnChainFailed,
    /// Transaction executed but the receipt does not match the item.
    OnChainReceiptValidationFailed,
}

impl SettlementStatus {
    /// Whether no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::OnChainConfirmed | Self::OnChainFailed | Self::OnChainReceiptValidationFailed
        )
    }
}

/// An application item that can be settled on chain.
///
/// The `update_*` hooks are invoked on every state change and are expected to persist it.
pub trait Settleable: Batchable + Debug + Send + Sync + 'static {
    /// Builds the transaction settling this item.
    fn settlement_context(&self, config: &SettlementConfig) -> eyre::Result<SettlementContext>;

    /// Invoked when the status changed.
    fn update_status(&mut self, status: SettlementStatus);

    /// Invoked when a transaction was sent for this item, or when a different transaction than
    /// the last sent one got executed.
    fn update_transaction(&mut self, status: SettlementStatus, tx_hash: B256, nonce: u64);

    /// Whether the receipt matches the off-chain values.
    fn matches(&self, _receipt: &Receipt) -> bool {
        true
    }

    /// Whether an execution failure is expected and should not pause the pipeline.
    fn suppress_on_chain_failure(&self) -> bool {
        false
    }
}

/// A [`Settleable`] item together with its settlement state.
#[derive(Debug)]
pub struct Settlement<S> {
    item: S,
    status: SettlementStatus,
    recorder: Option<TransactionRecorder>,
    executed_tx_hash: Option<B256>,
}

impl<S: Settleable> Settlement<S> {
    /// Wraps a freshly settled item.
    pub fn new(item: S) -> Self {
        Self { item, status: SettlementStatus::OffChainSettled, recorder: None, executed_tx_hash: None }
    }

    /// Restores an item whose transaction was already sent before a restart.
    pub fn restore(item: S, status: SettlementStatus, tx_hash: B256, nonce: u64) -> Self {
        Self {
            item,
            status,
            recorder: Some(TransactionRecorder::new(tx_hash, nonce, None)),
            executed_tx_hash: None,
        }
    }

    /// Returns the wrapped item.
    pub fn item(&self) -> &S {
        &self.item
    }

    /// Consumes the settlement, returning the wrapped item.
    pub fn into_item(self) -> S {
        self.item
    }

    /// Current status.
    pub fn status(&self) -> SettlementStatus {
        self.status
    }

    /// Transactions sent so far.
    pub fn recorder(&self) -> Option<&TransactionRecorder> {
        self.recorder.as_ref()
    }

    pub(crate) fn recorder_mut(&mut self) -> Option<&mut TransactionRecorder> {
        self.recorder.as_mut()
    }

    /// Forgets a transaction the node refused, so the next attempt gets a fresh nonce.
    pub(crate) fn discard_recorder(&mut self) {
        self.recorder = None;
    }

    /// Hash of the executed transaction when it differs from the last sent one.
    pub fn executed_tx_hash(&self) -> Option<B256> {
        self.executed_tx_hash
    }

    /// Nonce of the sent transactions.
    pub fn nonce(&self) -> Option<u64> {
        self.recorder.as_ref().map(TransactionRecorder::nonce)
    }

    /// Moves to `status`, notifying the item if it changed.
    pub fn update_status(&mut self, status: SettlementStatus) {
        if self.status == status {
            return;
        }
        self.item.update_status(status);
        self.status = status;
    }

    /// Registers the hash of the transaction that was actually executed.
    pub fn update_executed_tx(&mut self, tx_hash: B256) {
        if self.executed_tx_hash == Some(tx_hash) {
            return;
        }
        let Some(nonce) = self.nonce() else { return };
        self.item.update_transaction(self.status, tx_hash, nonce);
        self.executed_tx_hash = Some(tx_hash);
    }

    /// Records a newly signed transaction.
    pub fn record_sent(&mut self, tx_hash: B256, nonce: u64, gas_price: u128) {
        let status = SettlementStatus::OffChainSettled;
        self.item.update_transaction(status, tx_hash, nonce);
        self.status = status;

        match &mut self.recorder {
            Some(recorder) => recorder.record(tx_hash, nonce, Some(gas_price)),
            None => self.recorder = Some(TransactionRecorder::new(tx_hash, nonce, Some(gas_price))),
        }
    }
}

impl<S: Settleable> Batchable for Settlement<S> {
    fn batch_with(&mut self, other: Self) -> Result<(), Self> {
        // items that were already sent keep their own transaction
        if self.recorder.is_some() || other.recorder.is_some() {
            return Err(other);
        }

        let Self { item, status, recorder, executed_tx_hash } = other;
        self.item.batch_with(item).map_err(|item| Self { item, status, recorder, executed_tx_hash })
    }

    fn size(&self) -> usize {
        self.item.size()
    }

    fn is_batchable(&self) -> bool {
        self.recorder.is_none() && self.item.is_batchable()
    }
}
