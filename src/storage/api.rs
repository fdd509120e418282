//! Settlement storage api.

use super::StorageError;
use alloy::primitives::B256;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Type alias for `Result<T, StorageError>`
pub type Result<T> = core::result::Result<T, StorageError>;

/// The last transaction sent with a fresh nonce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastTransaction {
    /// Transaction hash.
    pub tx_hash: B256,
    /// Transaction nonce.
    pub nonce: u64,
}

/// Storage API.
#[async_trait]
pub trait StorageApi: Debug + Send + Sync {
    /// Durably writes the last transaction sent with a fresh nonce.
    ///
    /// Must complete before the transaction is broadcast.
    async fn write_last_transaction(&self, tx_hash: B256, nonce: u64) -> Result<()>;

    /// Reads the last transaction sent with a fresh nonce.
    async fn read_last_transaction(&self) -> Result<Option<LastTransaction>>;
}
