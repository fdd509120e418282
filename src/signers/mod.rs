//! Settlement transaction signers.

mod wallet;
pub use wallet::WalletSigner;

use crate::settle::SettlementContext;
use alloy::primitives::{Address, B256, Bytes};
use async_trait::async_trait;
use std::fmt::Debug;

/// A signed settlement transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    /// EIP-2718 encoded transaction.
    pub raw: Bytes,
    /// Transaction hash.
    pub hash: B256,
}

/// Signs settlement transactions.
#[async_trait]
pub trait TransactionSigner: Debug + Send + Sync {
    /// Address transactions are sent from.
    fn address(&self) -> Address;

    /// Signs the transaction described by `context`.
    async fn sign(
        &self,
        context: &SettlementContext,
        nonce: u64,
        gas_price: u128,
    ) -> Result<SignedTransaction, alloy::signers::Error>;
}
