//! Settlement storage

mod api;
pub use api::{LastTransaction, StorageApi};
mod error;
pub use error::StorageError;
mod memory;
pub use memory::InMemoryStorage;

use alloy::primitives::B256;
use async_trait::async_trait;
use std::sync::Arc;

/// Settlement storage interface.
#[derive(Debug, Clone)]
pub struct SettlementStorage {
    inner: Arc<dyn StorageApi>,
}

impl SettlementStorage {
    /// Create [`SettlementStorage`] with a custom backend.
    pub fn new(inner: Arc<dyn StorageApi>) -> Self {
        Self { inner }
    }

    /// Create [`SettlementStorage`] with a in-memory backend. Used for testing only.
    pub fn in_memory() -> Self {
        Self { inner: Arc::new(InMemoryStorage::default()) }
    }
}

#[async_trait]
impl StorageApi for SettlementStorage {
    async fn write_last_transaction(&self, tx_hash: B256, nonce: u64) -> api::Result<()> {
        self.inner.write_last_transaction(tx_hash, nonce).await
    }

    async fn read_last_transaction(&self) -> api::Result<Option<LastTransaction>> {
        self.inner.read_last_transaction().await
    }
}
