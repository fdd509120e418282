//! Settlement error types.
use crate::{chain::ChainError, storage::StorageError};
use thiserror::Error;

/// The overarching error type of the settlement pipeline.
#[derive(Debug, Error)]
pub enum SettlementError {
    /// Errors talking to the chain.
    #[error(transparent)]
    Chain(#[from] ChainError),
    /// Errors related to storage.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// Failed to sign a transaction.
    #[error(transparent)]
    Sign(#[from] alloy::signers::Error),
    /// A resent transaction was rejected for a nonce that no recorded transaction used.
    #[error("nonce {nonce} was used by a transaction of another settlement")]
    NonceConflict {
        /// The nonce of the rejected transaction.
        nonce: u64,
    },
    /// An internal error occurred.
    #[error(transparent)]
    InternalError(#[from] eyre::Error),
}
