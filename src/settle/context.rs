use alloy::primitives::{Address, Bytes};

/// Everything needed to build the transaction settling an item.
///
/// Derived fresh from the item on every send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementContext {
    /// Contract receiving the call.
    pub contract: Address,
    /// Encoded call.
    pub data: Bytes,
    /// Gas limit of the transaction.
    pub gas_limit: u64,
    /// Storage collateral limit, for ledgers charging one. Ignored by EVM signers.
    pub storage_limit: Option<u64>,
}

impl SettlementContext {
    /// Creates a new [`SettlementContext`].
    pub fn new(contract: Address, data: impl Into<Bytes>, gas_limit: u64) -> Self {
        Self { contract, data: data.into(), gas_limit, storage_limit: None }
    }

    /// Sets the storage collateral limit.
    pub fn with_storage_limit(mut self, storage_limit: u64) -> Self {
        self.storage_limit = Some(storage_limit);
        self
    }
}
