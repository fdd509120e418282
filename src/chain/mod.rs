//! Access to the ledger settlements are committed to.

mod error;
pub use error::{ChainError, RejectReason};

mod evm;
pub use evm::EvmClient;

mod memory;
pub use memory::{InMemoryChain, SentTransaction};

use alloy::primitives::{Address, B256, Bytes, Log};
use async_trait::async_trait;
use std::fmt::Debug;

/// Receipt of an executed transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    /// Hash of the executed transaction.
    pub transaction_hash: B256,
    /// Block the transaction was included in.
    pub block_number: u64,
    /// Whether execution succeeded.
    pub status: bool,
    /// Emitted logs.
    pub logs: Vec<Log>,
}

/// A transaction known to the chain, mined or not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainTransaction {
    /// Transaction hash.
    pub hash: B256,
    /// Sender nonce.
    pub nonce: u64,
    /// Including block, `None` while the transaction is in the pool.
    pub block_number: Option<u64>,
}

/// Capabilities of a chain node used by the settlement pipeline.
#[async_trait]
pub trait ChainClient: Debug + Send + Sync {
    /// Nonce of `address` as of the latest mined block.
    async fn get_nonce(&self, address: Address) -> Result<u64, ChainError>;

    /// Nonce of `address` including pool transactions.
    async fn get_pending_nonce(&self, address: Address) -> Result<u64, ChainError>;

    /// Latest block number.
    async fn block_number(&self) -> Result<u64, ChainError>;

    /// Latest block deep enough to be considered final.
    async fn confirmed_block_number(&self) -> Result<u64, ChainError>;

    /// Current network gas price.
    async fn gas_price(&self) -> Result<u128, ChainError>;

    /// Broadcasts a signed transaction, returning its hash.
    async fn send_raw_transaction(&self, raw: &Bytes) -> Result<B256, ChainError>;

    /// Receipt of a transaction, `None` while not executed.
    async fn get_receipt(&self, tx_hash: B256) -> Result<Option<Receipt>, ChainError>;

    /// Looks up a transaction by hash.
    async fn get_transaction(&self, tx_hash: B256) -> Result<Option<ChainTransaction>, ChainError>;
}
