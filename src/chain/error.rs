use alloy::transports::{RpcError, TransportErrorKind};

/// Reason a node gave for rejecting a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The transaction is already in the pool.
    AlreadyKnown,
    /// The nonce was already used.
    NonceTooLow,
    /// The nonce is ahead of what the pool accepts.
    NonceTooHigh,
    /// The pool has no room left.
    PoolFull,
    /// Gas price below the pool minimum.
    Underpriced,
    /// Gas price too low to replace the pooled transaction with the same nonce.
    ReplacementUnderpriced,
    /// The sender can not pay for the transaction.
    InsufficientFunds,
    /// Anything else.
    Other,
}

impl RejectReason {
    /// Classifies a node error message.
    ///
    /// Messages follow geth and reth wording.
    pub fn from_message(message: &str) -> Self {
        let message = message.to_lowercase();
        if message.contains("already known") || message.contains("already imported") {
            Self::AlreadyKnown
        } else if message.contains("nonce too low") {
            Self::NonceTooLow
        } else if message.contains("nonce too high") {
            Self::NonceTooHigh
        } else if message.contains("txpool is full") || message.contains("pool is full") {
            Self::PoolFull
        } else if message.contains("replacement transaction underpriced") {
            Self::ReplacementUnderpriced
        } else if message.contains("underpriced") {
            Self::Underpriced
        } else if message.contains("insufficient funds") {
            Self::InsufficientFunds
        } else {
            Self::Other
        }
    }
}

/// Errors returned by a [`ChainClient`](super::ChainClient).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainError {
    /// The node could not be reached.
    #[error("transport error: {0}")]
    Transport(String),
    /// The node answered with an error.
    #[error("rpc error {code}: {message}")]
    Rejected {
        /// JSON-RPC error code.
        code: i64,
        /// Error message.
        message: String,
        /// Classified message.
        reason: RejectReason,
    },
    /// Any other failure.
    #[error("{0}")]
    Unknown(String),
}

impl ChainError {
    /// Creates a [`ChainError::Rejected`] from a node error message.
    pub fn rejected(code: i64, message: impl Into<String>) -> Self {
        let message = message.into();
        Self::Rejected { code, reason: RejectReason::from_message(&message), message }
    }

    /// Returns the rejection reason, if the node rejected the request.
    pub fn reject_reason(&self) -> Option<RejectReason> {
        match self {
            Self::Rejected { reason, .. } => Some(*reason),
            _ => None,
        }
    }

    /// Whether the node could not be reached.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

impl From<RpcError<TransportErrorKind>> for ChainError {
    fn from(err: RpcError<TransportErrorKind>) -> Self {
        match err {
            RpcError::ErrorResp(payload) => Self::rejected(payload.code, payload.message),
            RpcError::Transport(kind) => Self::Transport(kind.to_string()),
            err => Self::Unknown(err.to_string()),
        }
    }
}
