use super::{SignedTransaction, TransactionSigner};
use crate::settle::SettlementContext;
use alloy::{
    consensus::{TxLegacy, TypedTransaction},
    eips::Encodable2718,
    network::{Ethereum, EthereumWallet, NetworkWallet},
    primitives::{Address, TxKind, U256},
    signers::local::PrivateKeySigner,
};
use async_trait::async_trait;
use std::{fmt, str::FromStr};

/// [`TransactionSigner`] signing legacy transactions with a local key.
#[derive(Clone)]
pub struct WalletSigner {
    wallet: EthereumWallet,
    chain_id: u64,
}

impl fmt::Debug for WalletSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletSigner")
            .field("address", &self.address())
            .field("chain_id", &self.chain_id)
            .finish()
    }
}

impl WalletSigner {
    /// Creates a new [`WalletSigner`].
    pub fn new(signer: PrivateKeySigner, chain_id: u64) -> Self {
        Self { wallet: EthereumWallet::new(signer), chain_id }
    }

    /// Load a private key.
    pub fn from_signing_key(key: &str, chain_id: u64) -> eyre::Result<Self> {
        Ok(Self::new(PrivateKeySigner::from_str(key)?, chain_id))
    }

    /// Chain id transactions are signed for.
    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }
}

#[async_trait]
impl TransactionSigner for WalletSigner {
    fn address(&self) -> Address {
        NetworkWallet::<Ethereum>::default_signer_address(&self.wallet)
    }

    async fn sign(
        &self,
        context: &SettlementContext,
        nonce: u64,
        gas_price: u128,
    ) -> Result<SignedTransaction, alloy::signers::Error> {
        let tx = TypedTransaction::Legacy(TxLegacy {
            chain_id: Some(self.chain_id),
            nonce,
            gas_price,
            gas_limit: context.gas_limit,
            to: TxKind::Call(context.contract),
            value: U256::ZERO,
            input: context.data.clone(),
        });

        let signed =
            NetworkWallet::<Ethereum>::sign_transaction_from(&self.wallet, self.address(), tx)
                .await?;

        Ok(SignedTransaction { raw: signed.encoded_2718().into(), hash: *signed.tx_hash() })
    }
}
