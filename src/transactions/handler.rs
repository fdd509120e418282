use crate::{chain::ChainError, error::SettlementError, settle::Settlement};

/// Callbacks for events requiring operator attention.
///
/// All callbacks default to doing nothing, `()` ignores every event.
pub trait SettlementHandler<S>: Send + Sync + 'static {
    /// A transaction stayed unexecuted for too long and is being resent.
    fn on_transaction_long_unexecuted(&self, _settlement: &Settlement<S>) {}

    /// A transaction failed on chain or its receipt did not match. The pipeline is paused until
    /// an operator resumes it.
    fn on_transaction_failure(&self, _settlement: &Settlement<S>) {}

    /// Too many transactions are pending, submission waits for the chain to catch up.
    fn on_nonce_too_future(&self, _working_nonce: u64, _on_chain_nonce: u64) {}

    /// The node pool is full, the settlement is retried later.
    fn on_transaction_pool_full(&self, _settlement: &Settlement<S>) {}

    /// The node rejected a transaction for an unexpected reason. The pipeline is paused until an
    /// operator resumes it.
    fn on_unexpected_transaction_error(&self, _settlement: &Settlement<S>, _err: &ChainError) {}

    /// Settling failed and is retried after the pause interval.
    fn on_exception(&self, _settlement: &Settlement<S>, _err: &SettlementError) {}
}

impl<S> SettlementHandler<S> for () {}
