//! Settlement storage implementation in-memory. For testing only.

use super::{
    StorageApi,
    api::{LastTransaction, Result},
};
use alloy::primitives::B256;
use async_trait::async_trait;
use tokio::sync::RwLock;

/// [`StorageApi`] implementation in-memory. Used for testing
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    last_transaction: RwLock<Option<LastTransaction>>,
}

#[async_trait]
impl StorageApi for InMemoryStorage {
    async fn write_last_transaction(&self, tx_hash: B256, nonce: u64) -> Result<()> {
        *self.last_transaction.write().await = Some(LastTransaction { tx_hash, nonce });
        Ok(())
    }

    async fn read_last_transaction(&self) -> Result<Option<LastTransaction>> {
        Ok(*self.last_transaction.read().await)
    }
}
