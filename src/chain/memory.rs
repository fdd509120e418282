//! Scripted [`ChainClient`] kept in memory. For testing only.

use super::{ChainClient, ChainError, ChainTransaction, Receipt};
use alloy::{
    consensus::{Transaction, TxEnvelope},
    eips::Decodable2718,
    primitives::{Address, B256, Bytes, keccak256},
};
use async_trait::async_trait;
use std::{
    collections::{HashMap, VecDeque},
    sync::{Mutex, MutexGuard},
};

/// A transaction received by [`InMemoryChain::send_raw_transaction`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentTransaction {
    /// Transaction hash.
    pub hash: B256,
    /// Sender nonce.
    pub nonce: u64,
    /// Legacy gas price.
    pub gas_price: Option<u128>,
    /// Encoded transaction.
    pub raw: Bytes,
}

#[derive(Debug)]
struct State {
    block_number: u64,
    confirmations: u64,
    gas_price: u128,
    nonce: u64,
    pending_nonce: u64,
    transactions: HashMap<B256, ChainTransaction>,
    receipts: HashMap<B256, Receipt>,
    sent: Vec<SentTransaction>,
    send_errors: VecDeque<ChainError>,
    call_errors: VecDeque<ChainError>,
}

/// [`ChainClient`] implementation in-memory for a single sender. Used for testing.
///
/// Transactions are accepted into a pool and only executed when the test mines them.
#[derive(Debug)]
pub struct InMemoryChain {
    state: Mutex<State>,
}

impl Default for InMemoryChain {
    fn default() -> Self {
        Self::new(0)
    }
}

impl InMemoryChain {
    /// Creates an empty chain where blocks are final after `confirmations` blocks.
    pub fn new(confirmations: u64) -> Self {
        Self {
            state: Mutex::new(State {
                block_number: 1,
                confirmations,
                gas_price: 1_000_000_000,
                nonce: 0,
                pending_nonce: 0,
                transactions: HashMap::new(),
                receipts: HashMap::new(),
                sent: Vec::new(),
                send_errors: VecDeque::new(),
                call_errors: VecDeque::new(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Sets the mined and pending nonce of the sender.
    pub fn set_nonce(&self, nonce: u64) {
        let mut state = self.state();
        state.nonce = nonce;
        state.pending_nonce = state.pending_nonce.max(nonce);
    }

    /// Sets the pending nonce of the sender.
    pub fn set_pending_nonce(&self, nonce: u64) {
        self.state().pending_nonce = nonce;
    }

    /// Sets the network gas price.
    pub fn set_gas_price(&self, gas_price: u128) {
        self.state().gas_price = gas_price;
    }

    /// Makes the next broadcast fail with `err`.
    pub fn push_send_error(&self, err: ChainError) {
        self.state().send_errors.push_back(err);
    }

    /// Makes the next block number query fail with `err`.
    pub fn push_call_error(&self, err: ChainError) {
        self.state().call_errors.push_back(err);
    }

    /// Adds `count` empty blocks.
    pub fn advance_blocks(&self, count: u64) {
        self.state().block_number += count;
    }

    /// Registers a transaction as known to the chain without broadcasting it.
    pub fn insert_transaction(&self, tx: ChainTransaction) {
        self.state().transactions.insert(tx.hash, tx);
    }

    /// Mines a pooled transaction in a new block.
    ///
    /// Returns `false` if the transaction is unknown.
    pub fn mine(&self, tx_hash: B256, success: bool) -> bool {
        let mut state = self.state();
        let Some(mut tx) = state.transactions.get(&tx_hash).copied() else {
            return false;
        };

        state.block_number += 1;
        tx.block_number = Some(state.block_number);
        state.nonce = state.nonce.max(tx.nonce + 1);
        state.pending_nonce = state.pending_nonce.max(state.nonce);

        let receipt = Receipt {
            transaction_hash: tx_hash,
            block_number: state.block_number,
            status: success,
            logs: Vec::new(),
        };
        state.transactions.insert(tx_hash, tx);
        state.receipts.insert(tx_hash, receipt);
        true
    }

    /// Transactions received so far, in order.
    pub fn sent(&self) -> Vec<SentTransaction> {
        self.state().sent.clone()
    }

    /// Most recently received transaction.
    pub fn last_sent(&self) -> Option<SentTransaction> {
        self.state().sent.last().cloned()
    }

    fn take_call_error(&self) -> Result<(), ChainError> {
        match self.state().call_errors.pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ChainClient for InMemoryChain {
    async fn get_nonce(&self, _address: Address) -> Result<u64, ChainError> {
        Ok(self.state().nonce)
    }

    async fn get_pending_nonce(&self, _address: Address) -> Result<u64, ChainError> {
        Ok(self.state().pending_nonce)
    }

    async fn block_number(&self) -> Result<u64, ChainError> {
        self.take_call_error()?;
        Ok(self.state().block_number)
    }

    async fn confirmed_block_number(&self) -> Result<u64, ChainError> {
        let state = self.state();
        Ok(state.block_number.saturating_sub(state.confirmations))
    }

    async fn gas_price(&self) -> Result<u128, ChainError> {
        Ok(self.state().gas_price)
    }

    async fn send_raw_transaction(&self, raw: &Bytes) -> Result<B256, ChainError> {
        let mut state = self.state();
        if let Some(err) = state.send_errors.pop_front() {
            return Err(err);
        }

        let envelope = TxEnvelope::decode_2718(&mut raw.as_ref())
            .map_err(|err| ChainError::rejected(-32602, err.to_string()))?;
        let hash = keccak256(raw);
        let nonce = envelope.nonce();

        if state.transactions.contains_key(&hash) {
            return Err(ChainError::rejected(-32000, "already known"));
        }
        if nonce < state.nonce {
            return Err(ChainError::rejected(-32000, "nonce too low"));
        }

        state.transactions.insert(hash, ChainTransaction { hash, nonce, block_number: None });
        state.pending_nonce = state.pending_nonce.max(nonce + 1);
        state.sent.push(SentTransaction {
            hash,
            nonce,
            gas_price: envelope.gas_price(),
            raw: raw.clone(),
        });
        Ok(hash)
    }

    async fn get_receipt(&self, tx_hash: B256) -> Result<Option<Receipt>, ChainError> {
        Ok(self.state().receipts.get(&tx_hash).cloned())
    }

    async fn get_transaction(&self, tx_hash: B256) -> Result<Option<ChainTransaction>, ChainError> {
        Ok(self.state().transactions.get(&tx_hash).copied())
    }
}
