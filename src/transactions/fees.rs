/// Minimum gas price bump that we assume to be accepted by the network.
///
/// Ref <https://github.com/ethereum-optimism/op-geth/blob/e666543dc5500428ee7c940e54263fe4968c5efd/core/txpool/legacypool/legacypool.go#L168>
/// Ref <https://github.com/paradigmxyz/reth/blob/b312799e081259a2fbdfa91fb6b43f384625bbe2/crates/transaction-pool/src/config.rs#L23-L24>
pub const MIN_GAS_PRICE_BUMP: u128 = 10;

/// Returns the lowest gas price a replacement of a transaction priced at `gas_price` is accepted
/// with. Always strictly higher than `gas_price`.
pub fn bump_gas_price(gas_price: u128) -> u128 {
    let bumped = gas_price.saturating_mul(100 + MIN_GAS_PRICE_BUMP) / 100;
    bumped.max(gas_price.saturating_add(1))
}

/// Gas price of a replacement transaction.
///
/// Follows the network price if it went up by more than the minimum bump.
pub fn replacement_gas_price(previous: u128, network: u128) -> u128 {
    network.max(bump_gas_price(previous))
}
