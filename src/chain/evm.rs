use super::{ChainClient, ChainError, ChainTransaction, Receipt};
use alloy::{
    consensus::Transaction,
    network::TransactionResponse,
    primitives::{Address, B256, Bytes},
    providers::{DynProvider, Provider, ProviderBuilder},
    rpc::client::ClientBuilder,
    transports::layers::RetryBackoffLayer,
};
use async_trait::async_trait;
use url::Url;

/// [`RetryBackoffLayer`] used for chain providers.
///
/// We are allowing max 10 retries with a backoff of 800ms. The CU/s is set to max value to avoid
/// any throttling.
pub const RETRY_LAYER: RetryBackoffLayer = RetryBackoffLayer::new(10, 800, u64::MAX);

/// [`ChainClient`] talking to an EVM node over JSON-RPC.
#[derive(Debug, Clone)]
pub struct EvmClient {
    provider: DynProvider,
    /// Depth at which a block is considered final.
    confirmations: u64,
}

impl EvmClient {
    /// Connects to an HTTP endpoint, retrying rate limited requests.
    pub fn connect_http(endpoint: Url, confirmations: u64) -> Self {
        let client = ClientBuilder::default().layer(RETRY_LAYER).http(endpoint);
        Self::new(ProviderBuilder::new().connect_client(client).erased(), confirmations)
    }

    /// Creates a new [`EvmClient`] from an existing provider.
    pub fn new(provider: DynProvider, confirmations: u64) -> Self {
        Self { provider, confirmations }
    }

    /// Returns the underlying provider.
    pub fn provider(&self) -> &DynProvider {
        &self.provider
    }
}

#[async_trait]
impl ChainClient for EvmClient {
    async fn get_nonce(&self, address: Address) -> Result<u64, ChainError> {
        Ok(self.provider.get_transaction_count(address).latest().await?)
    }

    async fn get_pending_nonce(&self, address: Address) -> Result<u64, ChainError> {
        Ok(self.provider.get_transaction_count(address).pending().await?)
    }

    async fn block_number(&self) -> Result<u64, ChainError> {
        Ok(self.provider.get_block_number().await?)
    }

    async fn confirmed_block_number(&self) -> Result<u64, ChainError> {
        Ok(self.block_number().await?.saturating_sub(self.confirmations))
    }

    async fn gas_price(&self) -> Result<u128, ChainError> {
        Ok(self.provider.get_gas_price().await?)
    }

    async fn send_raw_transaction(&self, raw: &Bytes) -> Result<B256, ChainError> {
        let pending = self.provider.send_raw_transaction(raw).await?;
        Ok(*pending.tx_hash())
    }

    async fn get_receipt(&self, tx_hash: B256) -> Result<Option<Receipt>, ChainError> {
        let Some(receipt) = self.provider.get_transaction_receipt(tx_hash).await? else {
            return Ok(None);
        };

        // pending receipts have no block yet
        let Some(block_number) = receipt.block_number else {
            return Ok(None);
        };

        Ok(Some(Receipt {
            transaction_hash: receipt.transaction_hash,
            block_number,
            status: receipt.status(),
            logs: receipt.inner.logs().iter().map(|log| log.inner.clone()).collect(),
        }))
    }

    async fn get_transaction(&self, tx_hash: B256) -> Result<Option<ChainTransaction>, ChainError> {
        Ok(self.provider.get_transaction_by_hash(tx_hash).await?.map(|tx| ChainTransaction {
            hash: tx.tx_hash(),
            nonce: tx.nonce(),
            block_number: tx.block_number,
        }))
    }
}
