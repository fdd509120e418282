//! Nonce management module.
//!
//! The settlement signer keeps a local working nonce that runs ahead of the chain while
//! transactions are pending. On startup it is reconciled with the last persisted transaction.

use crate::{
    chain::ChainClient,
    error::SettlementError,
    storage::{SettlementStorage, StorageApi},
};
use alloy::primitives::Address;
use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};
use tracing::{info, warn};

/// The nonce the next fresh settlement transaction is sent with.
#[derive(Debug, Clone, Default)]
pub struct WorkingNonce(Arc<AtomicU64>);

impl WorkingNonce {
    /// Creates a new [`WorkingNonce`].
    pub fn new(nonce: u64) -> Self {
        Self(Arc::new(AtomicU64::new(nonce)))
    }

    /// Current value.
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    /// Overwrites the value.
    pub fn set(&self, nonce: u64) {
        self.0.store(nonce, Ordering::SeqCst);
    }

    /// Moves past `nonce` unless already there.
    pub fn advance_past(&self, nonce: u64) {
        self.0.fetch_max(nonce.saturating_add(1), Ordering::SeqCst);
    }

    /// Moves up to `nonce` unless already there.
    pub fn sync_up(&self, nonce: u64) {
        self.0.fetch_max(nonce, Ordering::SeqCst);
    }
}

/// Outcome of a [`NonceSyncer::sync`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NonceSync {
    /// Nothing was persisted yet.
    NoRecord,
    /// The account sent transactions that were not sent by us.
    AdvancedExternally {
        /// Nonce as of the latest block.
        on_chain: u64,
        /// Persisted nonce.
        persisted: u64,
    },
    /// The persisted transaction was mined.
    AlreadyAccepted,
    /// The persisted transaction is known to the chain, the working nonce moved past it.
    Resumed(u64),
    /// The persisted transaction never reached the chain, its nonce is reused.
    Reset(u64),
}

/// Reconciles the working nonce with the last persisted transaction.
#[derive(Debug, Clone)]
pub struct NonceSyncer {
    chain: Arc<dyn ChainClient>,
    storage: SettlementStorage,
    address: Address,
}

impl NonceSyncer {
    /// Creates a new [`NonceSyncer`] for `address`.
    pub fn new(chain: Arc<dyn ChainClient>, storage: SettlementStorage, address: Address) -> Self {
        Self { chain, storage, address }
    }

    /// Reconciles `nonce` with the chain.
    ///
    /// Running it again without new transactions yields the same outcome.
    pub async fn sync(&self, nonce: &WorkingNonce) -> Result<NonceSync, SettlementError> {
        let Some(last) = self.storage.read_last_transaction().await? else {
            return Ok(NonceSync::NoRecord);
        };

        let on_chain = self.chain.get_nonce(self.address).await?;
        let persisted = last.nonce;

        let outcome = if on_chain > persisted.saturating_add(1) {
            warn!(on_chain, persisted, "Signer nonce advanced externally");
            NonceSync::AdvancedExternally { on_chain, persisted }
        } else if on_chain == persisted.saturating_add(1) {
            NonceSync::AlreadyAccepted
        } else if self.chain.get_transaction(last.tx_hash).await?.is_some() {
            nonce.set(persisted + 1);
            NonceSync::Resumed(persisted + 1)
        } else {
            nonce.set(persisted);
            NonceSync::Reset(persisted)
        };

        info!(tx_hash = %last.tx_hash, ?outcome, working = nonce.get(), "Synchronized nonce");
        Ok(outcome)
    }
}
